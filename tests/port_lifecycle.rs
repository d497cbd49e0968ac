//! Port lifecycle tests against a scripted modem.
//!
//! Covers acquiring, connecting, buffered writes with and without waiting
//! for confirmation, status polling and caching, and closing.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use simcom_mux::mux::{
    ConnectError, PortOptions, StatusCachePolicy, TcpStatus, TransmissionState, Transport,
    WriteError, UNACKED_UNKNOWN,
};
use simcom_mux::{MuxError, SocketStream};
use std::time::Duration;

#[test]
fn test_acquire_is_idempotent_across_transports() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 2);

    {
        let mut port = modem.acquire(Some(2), Transport::Tcp).unwrap();
        port.connect("example.com", 80).unwrap();
    }

    let port = modem.acquire(Some(2), Transport::Udp).unwrap();
    assert_eq!(port.index().get(), 2);
    assert_eq!(port.transport(), Some(Transport::Tcp));
    assert!(modem.registry().sessions().all(|s| s.is_connected()));
}

#[test]
fn test_acquire_first_free_and_exhaustion() {
    let (mut modem, _link) = test_modem();
    modem.acquire(Some(0), Transport::Tcp).unwrap();
    assert_eq!(
        modem.acquire(None, Transport::Tcp).unwrap().index().get(),
        1
    );
    for _ in 2..6 {
        modem.acquire(None, Transport::Udp).unwrap();
    }
    assert!(matches!(
        modem.acquire(None, Transport::Tcp),
        Err(MuxError::NoFreePort)
    ));
    assert!(matches!(
        modem.acquire(Some(6), Transport::Tcp),
        Err(MuxError::PortOutOfRange(6))
    ));
}

#[test]
fn test_connect_success() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 0);

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    port.connect("example.com", 8080).unwrap();
    assert_eq!(port.pending_confirmations(), 0);
    assert!(link
        .written_text()
        .contains("AT+CIPSTART=0,\"TCP\",\"example.com\",\"8080\"\r\n"));

    // Connect seeds the status cache, so this does not touch the link.
    link.clear_write_log();
    assert!(port.connected());
    assert!(link.get_write_log().is_empty());
}

#[test]
fn test_connect_udp_and_already_connected() {
    let (mut modem, mut link) = test_modem();
    link.reply_to(b"AT+CIPSTART=3,\"UDP\"", b"\r\n3, ALREADY CONNECT\r\n");

    let mut port = modem.acquire(Some(3), Transport::Udp).unwrap();
    port.connect("10.0.0.1", 5000).unwrap();

    // A second connect on a connected port returns without a command.
    link.clear_write_log();
    port.connect("10.0.0.1", 5000).unwrap();
    assert!(link.get_write_log().is_empty());
}

#[test]
fn test_connect_failures() {
    let (mut modem, mut link) = test_modem();
    link.reply_to(b"AT+CIPSTART=0,", b"\r\nOK\r\n\r\n0, CONNECT FAIL\r\n");
    link.reply_to(b"AT+CIPSTART=1,", b"\r\nERROR\r\n");

    let err = modem
        .acquire(Some(0), Transport::Tcp)
        .unwrap()
        .connect("nowhere", 1)
        .unwrap_err();
    assert!(matches!(err, ConnectError::Failed { index: 0 }));

    let err = modem
        .acquire(Some(1), Transport::Tcp)
        .unwrap()
        .connect("nowhere", 1)
        .unwrap_err();
    assert!(matches!(err, ConnectError::Rejected { index: 1 }));

    // No reply at all.
    let err = modem
        .acquire(Some(2), Transport::Tcp)
        .unwrap()
        .connect("nowhere", 1)
        .unwrap_err();
    assert!(matches!(err, ConnectError::Timeout { index: 2, .. }));

    for session in modem.registry().sessions() {
        assert!(!session.is_connected());
        assert_eq!(session.pending_confirmations(), 0);
    }
}

#[test]
fn test_write_flushes_at_buffer_size() {
    let defaults = PortOptions {
        transmit_buffer_size: 4,
        ..PortOptions::default()
    };
    let (mut modem, mut link) = test_modem_with(fast_config(), defaults);
    script_connect(&mut link, 0);
    script_send(&mut link, 0, b"abcd");
    script_send(&mut link, 0, b"efgh");
    script_send(&mut link, 0, b"ij");

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    port.connect("example.com", 80).unwrap();
    link.clear_write_log();

    assert_eq!(port.write(b"abcdefghij").unwrap(), 10);
    // Two full chunks went out; two bytes are still queued.
    assert_eq!(port.report().unwrap().queued, 2);
    port.flush().unwrap();

    assert_eq!(
        link.written_text(),
        "AT+CIPSEND=0,4\r\nabcdAT+CIPSEND=0,4\r\nefghAT+CIPSEND=0,2\r\nij"
    );
    assert_eq!(port.transmission_state(), TransmissionState::Success);
    assert_eq!(port.pending_confirmations(), 0);
    assert_eq!(link.pending_replies(), 0);
}

#[test]
fn test_flush_with_empty_queue_sends_nothing() {
    let (mut modem, link) = test_modem();
    let mut port = modem.acquire(None, Transport::Tcp).unwrap();
    port.flush().unwrap();
    assert!(link.get_write_log().is_empty());
}

#[test]
fn test_outstanding_confirmations_are_counted() {
    let (mut modem, mut link) = test_modem();
    script_prompt(&mut link, 0, 3);
    script_prompt(&mut link, 0, 3);

    {
        let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
        port.set_wait_for_transmission(false);
        port.send_all(b"one").unwrap();
        port.send_all(b"two").unwrap();
        assert_eq!(port.pending_confirmations(), 2);
        assert_eq!(port.transmission_state(), TransmissionState::InProgress);
    }

    link.enqueue_read(b"\r\n0, SEND OK\r\n");
    modem.poll(Duration::from_millis(10)).unwrap();
    {
        let port = modem.port(0).unwrap();
        assert_eq!(port.pending_confirmations(), 1);
        assert_eq!(port.transmission_state(), TransmissionState::InProgress);
    }

    link.enqueue_read(b"\r\n0, SEND OK\r\n\r\n0, SEND OK\r\n");
    modem.poll(Duration::from_millis(10)).unwrap();
    let mut port = modem.port(0).unwrap();
    assert_eq!(port.pending_confirmations(), 0);
    assert_eq!(port.transmission_state(), TransmissionState::Success);

    port.reset_transmission_state();
    assert_eq!(port.transmission_state(), TransmissionState::None);
}

#[test]
fn test_prompt_timeout_disconnects() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 1);

    let mut port = modem.acquire(Some(1), Transport::Tcp).unwrap();
    port.connect("example.com", 80).unwrap();
    port.write(b"hello").unwrap();

    let err = port.flush().unwrap_err();
    assert!(matches!(err, WriteError::PromptTimeout { index: 1, .. }));
    assert!(!modem.registry().sessions().any(|s| s.is_connected()));
}

#[test]
fn test_send_rejected() {
    let (mut modem, mut link) = test_modem();
    link.reply_to(b"AT+CIPSEND=0,5", b"\r\nERROR\r\n");

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    let err = port.send_all(b"hello").unwrap_err();
    assert!(matches!(err, WriteError::Rejected { index: 0 }));
    assert_eq!(err.index(), Some(0));
}

#[test]
fn test_send_failure_reported_by_modem() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 0);
    script_prompt(&mut link, 0, 5);
    link.reply_to(b"hello", b"\r\n0, SEND FAIL\r\n");

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    port.connect("example.com", 80).unwrap();
    let err = port.send_all(b"hello").unwrap_err();
    assert!(matches!(err, WriteError::ConfirmationFailed { index: 0 }));
    assert_eq!(port.pending_confirmations(), 0);
    assert_eq!(port.transmission_state(), TransmissionState::None);
}

#[test]
fn test_send_confirmation_timeout() {
    let (mut modem, mut link) = test_modem();
    script_prompt(&mut link, 0, 5);

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    let err = port.send_all(b"hello").unwrap_err();
    assert!(matches!(err, WriteError::ConfirmationTimeout { index: 0, .. }));
}

#[test]
fn test_remote_close_during_send_wait() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 0);
    script_prompt(&mut link, 0, 5);
    link.reply_to(b"hello", b"\r\n0, CLOSED\r\n");

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    port.connect("example.com", 80).unwrap();
    let err = port.send_all(b"hello").unwrap_err();
    assert!(matches!(err, WriteError::ConfirmationFailed { index: 0 }));
}

#[test]
fn test_status_parsing() {
    let (mut modem, mut link) = test_modem();
    link.reply_to(b"AT+CIPSTATUS=4", &status_reply(4, "REMOTE CLOSING"));
    link.reply_to(b"AT+CIPSTATUS=4", b"\r\n+CIPSTATUS: 4\r\n\r\nOK\r\n");
    link.reply_to(b"AT+CIPSTATUS=4", b"\r\nERROR\r\n");

    let mut port = modem.acquire(Some(4), Transport::Tcp).unwrap();
    assert_eq!(port.status(), TcpStatus::RemoteClosing);
    // Too few fields.
    assert_eq!(port.status(), TcpStatus::Unknown);
    // Rejected.
    assert_eq!(port.status(), TcpStatus::Unknown);
    // No reply at all.
    assert_eq!(port.status(), TcpStatus::Unknown);
}

#[test]
fn test_unanswered_status_drops_connection() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 0);

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    port.connect("example.com", 80).unwrap();
    assert!(port.report().unwrap().connected);

    assert_eq!(port.status(), TcpStatus::Unknown);
    assert!(!port.report().unwrap().connected);

    // The stale cache no longer answers for the port.
    link.clear_write_log();
    link.reply_to(b"AT+CIPSTATUS=0", &status_reply(0, "CLOSED"));
    assert!(!port.connected());
    assert!(link.written_text().contains("AT+CIPSTATUS=0\r\n"));
}

#[test]
fn test_unanswered_ack_query_drops_connection() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 3);

    let mut port = modem.acquire(Some(3), Transport::Tcp).unwrap();
    port.connect("example.com", 80).unwrap();

    assert_eq!(port.outstanding_unacked_bytes(), UNACKED_UNKNOWN);
    let report = port.report().unwrap();
    assert!(!report.connected);
    assert_eq!(report.pending_confirmations, 0);
}

#[test]
fn test_close_notification_invalidates_cache() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 0);
    {
        let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
        port.connect("example.com", 80).unwrap();
        assert!(port.connected());
    }

    link.enqueue_read(b"\r\n0, CLOSED\r\n");
    modem.poll(Duration::from_millis(10)).unwrap();

    link.reply_to(b"AT+CIPSTATUS=0", &status_reply(0, "CLOSED"));
    let mut port = modem.port(0).unwrap();
    assert!(!port.connected());
    assert!(link.written_text().contains("AT+CIPSTATUS=0\r\n"));
    assert_eq!(link.pending_replies(), 0);
}

#[test]
fn test_negative_status_repolled_by_default() {
    let (mut modem, mut link) = test_modem();
    link.reply_to(b"AT+CIPSTATUS=0", &status_reply(0, "CLOSED"));
    link.reply_to(b"AT+CIPSTATUS=0", &status_reply(0, "CONNECTED"));

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    assert!(!port.connected());
    assert!(port.connected());
    assert_eq!(link.pending_replies(), 0);

    // A positive answer is cached.
    link.clear_write_log();
    assert!(port.connected());
    assert!(link.get_write_log().is_empty());
}

#[test]
fn test_cache_everything_policy() {
    let config = simcom_mux::config::ModemConfig {
        status_cache_policy: StatusCachePolicy::All,
        ..fast_config()
    };
    let (mut modem, mut link) = test_modem_with(config, PortOptions::default());
    link.reply_to(b"AT+CIPSTATUS=0", &status_reply(0, "CLOSED"));

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    assert!(!port.connected());
    link.clear_write_log();
    assert!(!port.connected());
    assert!(link.get_write_log().is_empty());
}

#[test]
fn test_expired_cache_repolls() {
    let config = simcom_mux::config::ModemConfig {
        status_cache_ms: 0,
        ..fast_config()
    };
    let (mut modem, mut link) = test_modem_with(config, PortOptions::default());
    script_connect(&mut link, 0);
    link.reply_to(b"AT+CIPSTATUS=0", &status_reply(0, "CONNECTED"));

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    port.connect("example.com", 80).unwrap();
    assert!(port.connected());
    assert!(link.written_text().contains("AT+CIPSTATUS=0\r\n"));
}

#[test]
fn test_close_resets_port() {
    let (mut modem, mut link) = test_modem();
    script_connect(&mut link, 5);
    link.enqueue_read(&receive_frame(5, b"unread"));
    link.reply_to(b"AT+CIPCLOSE=5,0", b"\r\n5, CLOSE OK\r\n");

    let mut port = modem.acquire(Some(5), Transport::Tcp).unwrap();
    port.connect("example.com", 80).unwrap();
    port.set_wait_for_transmission(false);
    port.write(b"queued").unwrap();
    assert_eq!(port.available(false), 6);

    port.close();
    assert_eq!(port.available(false), 0);
    let report = port.report().unwrap();
    assert!(!report.connected);
    assert_eq!(report.queued, 0);
    assert_eq!(report.pending_confirmations, 0);
    assert!(link.written_text().contains("AT+CIPCLOSE=5,0\r\n"));
}

#[test]
fn test_close_is_best_effort() {
    let (mut modem, link) = test_modem();
    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    // Nothing answers; local state is reset anyway.
    port.close();
    assert!(!port.report().unwrap().connected);
    assert!(link.written_text().contains("AT+CIPCLOSE=0,0\r\n"));
}

#[test]
fn test_outstanding_unacked_bytes() {
    let (mut modem, mut link) = test_modem();
    link.reply_to(b"AT+CIPACK=1", b"\r\n+CIPACK: 120,100,20\r\n\r\nOK\r\n");
    link.reply_to(b"AT+CIPACK=1", b"\r\nERROR\r\n");

    let mut port = modem.acquire(Some(1), Transport::Tcp).unwrap();
    assert_eq!(port.outstanding_unacked_bytes(), 20);
    assert_eq!(port.outstanding_unacked_bytes(), UNACKED_UNKNOWN);
}

#[test]
fn test_buffer_size_setter_floors_at_one() {
    let (mut modem, _link) = test_modem();
    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    port.set_transmit_buffer_size(0);
    port.set_default_wait_for_available(true);
    let options = modem.registry().sessions().next().unwrap().options();
    assert_eq!(options.transmit_buffer_size, 1);
    assert!(options.wait_for_available);
}

#[test]
fn test_stream_trait_drives_a_port() {
    fn exchange<S: SocketStream>(stream: &mut S, request: &[u8]) -> Vec<u8> {
        stream.send_all(request).unwrap();
        let mut reply = Vec::new();
        while stream.available() > 0 {
            stream.read_to_vec(&mut reply);
        }
        reply
    }

    let defaults = PortOptions {
        wait_for_available: true,
        ..PortOptions::default()
    };
    let (mut modem, mut link) = test_modem_with(fast_config(), defaults);
    script_connect(&mut link, 0);
    script_prompt(&mut link, 0, 4);
    let mut answer = b"\r\n0, SEND OK\r\n".to_vec();
    answer.extend(receive_frame(0, b"pong"));
    link.reply_to(b"ping", &answer);

    let mut port = modem.acquire(Some(0), Transport::Tcp).unwrap();
    port.connect("example.com", 7).unwrap();
    assert_eq!(exchange(&mut port, b"ping"), b"pong");
    assert!(SocketStream::connected(&mut port));
}
