use std::fmt;
use std::net::IpAddr;

use tracing::{debug, warn};

use crate::config::TransferConfig;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    // send
    BuildingArchive,
    Discovering,
    Connecting,
    Streaming,
    // receive
    AwaitingDiscovery,
    ListeningForConnection,
    Receiving,
    Importing,
    // terminal
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

/// Whether `role` may move from `from` to `to`.
pub fn allowed(role: Role, from: Phase, to: Phase) -> bool {
    use Phase::*;
    if from.is_terminal() {
        return false;
    }
    if to == Failed {
        return true;
    }
    match role {
        Role::Sender => matches!(
            (from, to),
            (Idle, BuildingArchive)
                | (BuildingArchive, Discovering)
                | (Discovering, Connecting)
                | (Connecting, Streaming)
                | (Streaming, Done)
        ),
        Role::Receiver => matches!(
            (from, to),
            (Idle, AwaitingDiscovery)
                | (AwaitingDiscovery, ListeningForConnection)
                | (ListeningForConnection, Receiving)
                | (Receiving, Importing)
                | (Importing, Done)
        ),
    }
}

/// Per-operation state. Lives on the worker task and is dropped with it.
#[derive(Debug)]
pub struct TransferSession {
    pub role: Role,
    pub transfer_port: u16,
    pub discovery_port: u16,
    pub discovery_attempts: u32,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub peer: Option<IpAddr>,
    phase: Phase,
}

impl TransferSession {
    pub fn new(role: Role, cfg: &TransferConfig) -> Self {
        Self {
            role,
            transfer_port: cfg.transfer_port,
            discovery_port: cfg.discovery_port,
            discovery_attempts: 0,
            bytes_done: 0,
            bytes_total: 0,
            peer: None,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn enter(&mut self, to: Phase) {
        if !allowed(self.role, self.phase, to) {
            warn!(role = %self.role, from = %self.phase, %to, "unexpected phase transition");
        }
        debug!(role = %self.role, from = %self.phase, %to, "phase");
        self.phase = to;
    }
}
