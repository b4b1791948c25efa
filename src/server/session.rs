//! Single-session slot and its connection state machine.
//!
//! ```text
//! Listening → Accepting → HandshakeInProgress → Streaming → Closed | Error
//!      ↑                                                         │
//!      └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Accepting and HandshakeInProgress may also fail straight to Error. The
//! slot admits one session at a time; the [`SessionGuard`] handed to the
//! active session returns the slot to Listening when dropped, whichever way
//! the session ended.

use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::error::SessionError;
use crate::lock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Listening,
    Accepting,
    HandshakeInProgress,
    Streaming,
    Closed,
    Error,
}

impl SessionPhase {
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Listening, Accepting)
                | (Accepting, HandshakeInProgress)
                | (Accepting, Error)
                | (HandshakeInProgress, Streaming)
                | (HandshakeInProgress, Error)
                | (Streaming, Closed)
                | (Streaming, Error)
                | (Closed, Listening)
                | (Error, Listening)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Closed | SessionPhase::Error)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Listening => "listening",
            SessionPhase::Accepting => "accepting",
            SessionPhase::HandshakeInProgress => "handshake",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Closed => "closed",
            SessionPhase::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub session_id: Option<u64>,
    pub peer: Option<SocketAddr>,
    pub sessions_started: u64,
}

struct SlotState {
    phase: SessionPhase,
    current: Option<(u64, SocketAddr)>,
    next_id: u64,
}

pub struct SessionSlot {
    inner: Mutex<SlotState>,
}

impl Default for SessionSlot {
    fn default() -> Self {
        SessionSlot {
            inner: Mutex::new(SlotState {
                phase: SessionPhase::Listening,
                current: None,
                next_id: 1,
            }),
        }
    }
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.inner).phase
    }

    pub fn status(&self) -> SessionStatus {
        let slot = lock(&self.inner);
        SessionStatus {
            phase: slot.phase,
            session_id: slot.current.map(|(id, _)| id),
            peer: slot.current.map(|(_, peer)| peer),
            sessions_started: slot.next_id - 1,
        }
    }

    /// Claim the slot for a new connection, moving it to Accepting. Fails
    /// while another session holds the slot; that session is not touched.
    pub fn try_claim(self: &Arc<Self>, peer: SocketAddr) -> Result<SessionGuard, SessionError> {
        let mut slot = lock(&self.inner);
        if slot.phase != SessionPhase::Listening {
            return Err(SessionError::ConnectionRejected);
        }

        let id = slot.next_id;
        slot.next_id += 1;
        slot.phase = SessionPhase::Accepting;
        slot.current = Some((id, peer));
        drop(slot);

        log::info!("[session {}] {}: listening -> accepting", id, peer);
        Ok(SessionGuard {
            slot: Arc::clone(self),
            id,
            peer,
        })
    }
}

/// Ownership of the slot for one session.
pub struct SessionGuard {
    slot: Arc<SessionSlot>,
    id: u64,
    peer: SocketAddr,
}

impl SessionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn phase(&self) -> SessionPhase {
        self.slot.phase()
    }

    /// Apply a transition, refusing (and logging) anything the state machine
    /// does not allow.
    pub fn transition(&self, next: SessionPhase) -> bool {
        let mut slot = lock(&self.slot.inner);
        let current = slot.phase;
        if !current.can_transition_to(next) {
            drop(slot);
            log::warn!("[session {}] illegal transition {} -> {}", self.id, current, next);
            return false;
        }
        slot.phase = next;
        drop(slot);
        log::info!("[session {}] {} -> {}", self.id, current, next);
        true
    }

    /// Record how the session ended. The slot reopens when the guard drops.
    pub fn finish(self, outcome: Result<(), SessionError>) {
        match outcome {
            Ok(()) => {
                self.transition(SessionPhase::Closed);
            }
            Err(err) => {
                log::warn!("[session {}] {}: {}", self.id, self.peer, err);
                self.transition(SessionPhase::Error);
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot.inner);
        let mut ended = slot.phase;
        if !ended.is_terminal() {
            log::warn!(
                "[session {}] {}: abandoned during {}",
                self.id, self.peer, ended
            );
            ended = SessionPhase::Error;
        }
        slot.phase = SessionPhase::Listening;
        slot.current = None;
        drop(slot);
        log::info!("[session {}] {} -> listening", self.id, ended);
    }
}
