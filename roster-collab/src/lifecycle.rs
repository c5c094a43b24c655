//! Connection lifecycle state machine.
//!
//! ```text
//!            connect()              open
//!  Idle ─────────────► Connecting ───────► Open
//!                        │    ▲              │
//!          close / error │    │ retry timer  │ close / error
//!                        ▼    │              │
//!                       Closed ◄─────────────┘
//! ```
//!
//! No IO and no timers live here. The client actor feeds events in and
//! carries out the returned decisions. Every transport attempt runs under a
//! fresh [`Generation`]; events and timers tagged with any other generation
//! are stale and must be ignored.

use std::time::Duration;

use crate::config::ReconnectPolicy;

/// Monotonic attempt counter used to invalidate stale events and timers.
pub type Generation = u64;

/// Observable state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Never connected
    Idle,
    Connecting,
    Open,
    /// `disconnect()` requested, not yet processed
    Closing,
    Closed,
}

impl LinkState {
    pub fn is_connected(self) -> bool {
        self == LinkState::Open
    }

    /// Short status text for a connection indicator.
    pub fn label(self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Connecting => "connecting",
            LinkState::Open => "connected",
            LinkState::Closing => "closing",
            LinkState::Closed => "offline",
        }
    }
}

/// What to do after the current transport closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    /// Event belongs to an older generation.
    Ignored,
    /// Closed for good (manual disconnect, or retries already exhausted).
    Stop,
    /// Arm a retry timer; it is only valid while `generation` is current.
    Retry {
        attempt: u32,
        delay: Duration,
        generation: Generation,
    },
    /// Retries just ran out. Reported once per exhaustion.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct Lifecycle {
    policy: ReconnectPolicy,
    state: LinkState,
    /// Consecutive failed opens since the last successful one
    attempts: u32,
    generation: Generation,
    reconnect: bool,
    exhausted: bool,
}

impl Lifecycle {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: LinkState::Idle,
            attempts: 0,
            generation: 0,
            reconnect: true,
            exhausted: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.generation
    }

    /// Manual connect.
    ///
    /// Returns the generation for the new transport, or `None` when a
    /// transport is already connecting or open. Resets the retry budget and
    /// invalidates any pending retry timer.
    pub fn connect(&mut self) -> Option<Generation> {
        if matches!(self.state, LinkState::Connecting | LinkState::Open) {
            return None;
        }
        self.attempts = 0;
        self.exhausted = false;
        self.reconnect = true;
        Some(self.begin_attempt())
    }

    /// A retry timer armed under `generation` fired.
    pub fn retry(&mut self, generation: Generation) -> Option<Generation> {
        if !self.is_current(generation)
            || !self.reconnect
            || self.exhausted
            || self.state != LinkState::Closed
        {
            return None;
        }
        Some(self.begin_attempt())
    }

    /// The transport of `generation` reported open.
    pub fn on_open(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) || self.state != LinkState::Connecting {
            return false;
        }
        self.state = LinkState::Open;
        self.attempts = 0;
        true
    }

    /// The transport of `generation` closed, failed, or could not be built.
    pub fn on_close(&mut self, generation: Generation) -> CloseDecision {
        if !self.is_current(generation)
            || !matches!(self.state, LinkState::Connecting | LinkState::Open)
        {
            return CloseDecision::Ignored;
        }
        self.state = LinkState::Closed;

        if !self.reconnect {
            return CloseDecision::Stop;
        }
        if self.attempts >= self.policy.max_attempts {
            if self.exhausted {
                return CloseDecision::Stop;
            }
            self.exhausted = true;
            return CloseDecision::Exhausted;
        }

        let attempt = self.attempts;
        self.attempts += 1;
        CloseDecision::Retry {
            attempt,
            delay: self.policy.delay_for(attempt),
            generation: self.generation,
        }
    }

    /// Manual disconnect: no further retries, current transport and timers
    /// become stale. Returns whether a transport was connecting or open.
    pub fn disconnect(&mut self) -> bool {
        let was_active = matches!(self.state, LinkState::Connecting | LinkState::Open);
        self.reconnect = false;
        self.generation += 1;
        if self.state != LinkState::Idle {
            self.state = LinkState::Closed;
        }
        was_active
    }

    fn begin_attempt(&mut self) -> Generation {
        self.generation += 1;
        self.state = LinkState::Connecting;
        self.generation
    }
}
