//! Fixed table of port slots.
//!
//! The registry is the only owner of port sessions. Everything else refers to
//! a session through its [`PortIndex`], which is also the number exchanged
//! with the modem.

use super::error::{MuxError, MuxResult};
use super::session::{PortOptions, PortSession, Transport};
use serde::Serialize;
use tracing::debug;

/// Number of simultaneous connections the modem supports with `+CIPMUX=1`.
pub const PORTS: usize = 6;

/// Validated port index, always below [`PORTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PortIndex(u8);

impl PortIndex {
    pub fn new(index: usize) -> MuxResult<Self> {
        if index < PORTS {
            Ok(Self(index as u8))
        } else {
            Err(MuxError::PortOutOfRange(index))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PortIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arena of port sessions.
#[derive(Debug, Default)]
pub struct PortRegistry {
    slots: [Option<PortSession>; PORTS],
    defaults: PortOptions,
}

impl PortRegistry {
    /// Empty registry; new sessions start with `defaults`.
    pub fn new(defaults: PortOptions) -> Self {
        Self {
            slots: Default::default(),
            defaults,
        }
    }

    /// Claim a port.
    ///
    /// With an explicit index the session there is returned, created with
    /// `transport` if the slot was empty. An existing session is returned
    /// unchanged, whatever transport it was created with. Without an index
    /// the first empty slot is used.
    pub fn acquire(&mut self, index: Option<usize>, transport: Transport) -> MuxResult<PortIndex> {
        let index = match index {
            Some(raw) => PortIndex::new(raw)?,
            None => self
                .slots
                .iter()
                .position(Option::is_none)
                .map(PortIndex::new)
                .transpose()?
                .ok_or(MuxError::NoFreePort)?,
        };

        let defaults = self.defaults;
        let slot = &mut self.slots[index.slot()];
        if slot.is_none() {
            debug!("Port {} acquired for {}", index, transport.keyword());
            *slot = Some(PortSession::new(index, transport, defaults));
        }
        Ok(index)
    }

    /// Session at a raw index, `None` if out of range or never acquired.
    pub fn lookup(&mut self, index: usize) -> Option<&mut PortSession> {
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn get(&self, index: PortIndex) -> Option<&PortSession> {
        self.slots[index.slot()].as_ref()
    }

    pub fn get_mut(&mut self, index: PortIndex) -> Option<&mut PortSession> {
        self.slots[index.slot()].as_mut()
    }

    /// All acquired sessions.
    pub fn sessions(&self) -> impl Iterator<Item = &PortSession> {
        self.slots.iter().flatten()
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut PortSession> {
        self.slots.iter_mut().flatten()
    }

    /// Options newly created sessions start with.
    pub fn defaults(&self) -> PortOptions {
        self.defaults
    }
}
