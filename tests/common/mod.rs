//! Shared test utilities for the multiplexer tests.
//!
//! This module provides common test infrastructure including:
//! - A modem wired to a scripted mock link with short timeouts
//! - Helpers that script the usual modem exchanges

#![allow(dead_code)]

use simcom_mux::config::ModemConfig;
use simcom_mux::mux::{PortOptions, StatusCachePolicy};
use simcom_mux::serial::MockSerialPort;
use simcom_mux::Modem;

/// Modem timings short enough that failing waits end quickly.
pub fn fast_config() -> ModemConfig {
    ModemConfig {
        command_timeout_ms: 50,
        context_timeout_ms: 50,
        connect_timeout_ms: 80,
        prompt_timeout_ms: 50,
        send_timeout_ms: 80,
        status_cache_ms: 10_000,
        status_cache_policy: StatusCachePolicy::ConnectedOnly,
        available_wait_ms: 20,
        poll_interval_ms: 1,
        ..ModemConfig::default()
    }
}

/// A modem on a mock link, plus a clone of the link for scripting and
/// inspection.
pub fn test_modem() -> (Modem<MockSerialPort>, MockSerialPort) {
    test_modem_with(fast_config(), PortOptions::default())
}

pub fn test_modem_with(
    config: ModemConfig,
    defaults: PortOptions,
) -> (Modem<MockSerialPort>, MockSerialPort) {
    let link = MockSerialPort::new("MOCK0");
    let modem = Modem::new(link.clone(), config, defaults);
    (modem, link)
}

/// Script a successful `+CIPSTART` on `index`.
pub fn script_connect(link: &mut MockSerialPort, index: usize) {
    link.reply_to(
        format!("AT+CIPSTART={index},").as_bytes(),
        format!("\r\nOK\r\n\r\n{index}, CONNECT OK\r\n").as_bytes(),
    );
}

/// Script a `+CIPSEND` of `length` bytes up to the prompt.
pub fn script_prompt(link: &mut MockSerialPort, index: usize, length: usize) {
    link.reply_to(
        format!("AT+CIPSEND={index},{length}\r\n").as_bytes(),
        b"\r\n> ",
    );
}

/// Script a full send on `index` that the modem confirms.
pub fn script_send(link: &mut MockSerialPort, index: usize, payload: &[u8]) {
    script_prompt(link, index, payload.len());
    link.reply_to(payload, format!("\r\n{index}, SEND OK\r\n").as_bytes());
}

/// Bytes the modem pushes for `index`: header then raw payload.
pub fn receive_frame(index: usize, payload: &[u8]) -> Vec<u8> {
    let mut frame = format!("\r\n+RECEIVE,{index},{}:\r\n", payload.len()).into_bytes();
    frame.extend_from_slice(payload);
    frame
}

/// A `+CIPSTATUS` reply for `index` in `state`.
pub fn status_reply(index: usize, state: &str) -> Vec<u8> {
    format!("\r\n+CIPSTATUS: {index},0,\"TCP\",\"93.184.216.34\",\"80\",\"{state}\"\r\n\r\nOK\r\n")
        .into_bytes()
}
