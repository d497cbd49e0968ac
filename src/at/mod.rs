//! AT command plumbing.
//!
//! Only what the multiplexer consumes lives here: command framing, the line
//! tokenizer, prompt detection and raw byte reads.

pub mod channel;

pub use channel::AtChannel;
