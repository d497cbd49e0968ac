//! Hardware-specific tests requiring a real SIMCom modem.
//!
//! These tests are ignored by default and require actual hardware to run.
//! They should be run manually with the `--ignored` flag and appropriate
//! environment variables set.

pub mod modem_tests;
pub mod utils;
