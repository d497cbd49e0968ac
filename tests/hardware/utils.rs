//! Utility functions for hardware testing.
//!
//! Provides the environment-driven test setup and port discovery helpers.

use serialport::{available_ports, SerialPortType};
use simcom_mux::config::{Config, ConfigLoader};
use simcom_mux::serial::SyncSerialPort;
use simcom_mux::Modem;
use std::env;

/// Test setup from environment.
pub struct TestModemConfig {
    pub device: String,
    pub baud_rate: u32,
    pub apn: String,
    pub echo_host: String,
    pub echo_port: u16,
}

impl TestModemConfig {
    /// Get test configuration from environment variables.
    pub fn from_env() -> Option<Self> {
        let device = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(9600);
        let apn = env::var("TEST_APN").unwrap_or_else(|_| "internet".to_string());
        let echo_host = env::var("TEST_ECHO_HOST").ok()?;
        let echo_port = env::var("TEST_ECHO_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);

        Some(TestModemConfig {
            device,
            baud_rate,
            apn,
            echo_host,
            echo_port,
        })
    }

    /// Full configuration for the modem under test.
    pub fn to_config(&self) -> Config {
        let mut config = ConfigLoader::with_defaults().into_config();
        config.serial.device = self.device.clone();
        config.serial.baud_rate = self.baud_rate;
        config.modem.apn = self.apn.clone();
        config
    }

    /// Open the device and wrap it in a modem.
    pub fn open(&self) -> Modem<SyncSerialPort> {
        let config = self.to_config();
        let link = SyncSerialPort::open(&config.serial.device, config.serial.line_settings())
            .expect("Failed to open modem device");
        Modem::from_config(link, &config)
    }
}

/// Skip test if hardware is not configured.
pub fn skip_without_hardware() -> Option<TestModemConfig> {
    let config = TestModemConfig::from_env();
    if config.is_none() {
        println!("Skipping hardware test: TEST_PORT and TEST_ECHO_HOST not set");
    }
    config
}

/// Print USB serial ports, to help find the modem.
pub fn print_usb_ports() {
    for port in available_ports().unwrap_or_default() {
        if let SerialPortType::UsbPort(info) = &port.port_type {
            println!(
                "  {} VID:PID = {:04x}:{:04x}",
                port.port_name, info.vid, info.pid
            );
        }
    }
}
