//! Tests requiring an attached modem with a data-enabled SIM.
//!
//! # Running Hardware Tests
//!
//! ```bash
//! export TEST_PORT=/dev/ttyUSB0          # modem device
//! export TEST_BAUD=9600                  # optional, default: 9600
//! export TEST_APN=internet               # optional
//! export TEST_ECHO_HOST=echo.example.org # TCP/UDP echo service
//! export TEST_ECHO_PORT=7                # optional, default: 7
//!
//! cargo test --features hardware-tests -- --ignored
//! ```

use super::utils::{print_usb_ports, skip_without_hardware};
use simcom_mux::mux::{SocketStream, TcpStatus, Transport};
use std::time::{Duration, Instant};

fn wait_for_bytes<S: SocketStream>(stream: &mut S, want: usize, timeout: Duration) -> Vec<u8> {
    let start = Instant::now();
    let mut received = Vec::new();
    while received.len() < want && start.elapsed() < timeout {
        if stream.available() > 0 {
            stream.read_to_vec(&mut received);
        }
    }
    received
}

#[test]
#[ignore] // Run with --ignored flag
fn test_bring_up_and_shutdown() {
    let Some(setup) = skip_without_hardware() else {
        print_usb_ports();
        return;
    };
    let mut modem = setup.open();

    let address = modem.bring_up(&setup.apn, "", "").expect("bring-up failed");
    println!("Local address: {}", address);
    assert!(modem.context_up());

    modem.shutdown_context().expect("shutdown failed");
    assert!(!modem.context_up());
}

#[test]
#[ignore] // Run with --ignored flag
fn test_tcp_echo() {
    let Some(setup) = skip_without_hardware() else {
        return;
    };
    let mut modem = setup.open();
    modem.bring_up(&setup.apn, "", "").expect("bring-up failed");

    {
        let mut port = modem.acquire(None, Transport::Tcp).unwrap();
        port.set_default_wait_for_available(true);
        port.connect(&setup.echo_host, setup.echo_port)
            .expect("connect failed");
        assert_eq!(port.status(), TcpStatus::Connected);

        let message = b"simcom-mux echo\r\n";
        port.send_all(message).expect("send failed");
        let echoed = wait_for_bytes(&mut port, message.len(), Duration::from_secs(10));
        assert_eq!(echoed, message);
        assert!(port.outstanding_unacked_bytes() >= 0);

        port.close();
    }

    modem.shutdown_context().expect("shutdown failed");
}

#[test]
#[ignore] // Run with --ignored flag
fn test_two_ports_at_once() {
    let Some(setup) = skip_without_hardware() else {
        return;
    };
    let mut modem = setup.open();
    modem.bring_up(&setup.apn, "", "").expect("bring-up failed");

    for index in [0, 1] {
        let mut port = modem.acquire(Some(index), Transport::Tcp).unwrap();
        port.connect(&setup.echo_host, setup.echo_port)
            .expect("connect failed");
    }
    for index in [0, 1] {
        let mut port = modem.port(index).unwrap();
        port.set_default_wait_for_available(true);
        let message = format!("port {index}\r\n");
        port.send_all(message.as_bytes()).expect("send failed");
        let echoed = wait_for_bytes(&mut port, message.len(), Duration::from_secs(10));
        assert_eq!(echoed, message.as_bytes());
    }
    for index in [0, 1] {
        modem.port(index).unwrap().close();
    }

    modem.shutdown_context().expect("shutdown failed");
}
