//! Reconnect state machine for a relay connection.
//!
//! Pure and synchronous: the manager feeds it [`Event`]s and carries out the
//! [`Action`] it returns. Timers and sockets live in the manager.

use std::time::Duration;

use common::ReconnectConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    ClosedClean,
    ClosedAbnormal,
    /// Retries exhausted; only a manual connect leaves this state
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ConnectRequested,
    Opened,
    /// Peer closed with the normal close code
    ClosedClean,
    /// Connect failure, error, or close with any other code
    ClosedAbnormal,
    RetryElapsed,
    DisconnectRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Noop,
    OpenSocket,
    ScheduleRetry(Duration),
    CloseSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_interval: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before the given (1-based) reconnect attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_interval.checked_mul(attempt).unwrap_or(Duration::MAX)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            base_interval: config.base_interval(),
            max_attempts: config.max_attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectMachine {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl ReconnectMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive abnormal closes since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn handle(&mut self, event: Event) -> Action {
        use ConnectionState::*;

        match (self.state, event) {
            (Connecting | Open, Event::ConnectRequested) => Action::Noop,
            (_, Event::ConnectRequested) => {
                self.attempts = 0;
                self.state = Connecting;
                Action::OpenSocket
            },

            (Connecting, Event::Opened) => {
                self.attempts = 0;
                self.state = Open;
                Action::Noop
            },

            (Connecting | Open, Event::ClosedClean) => {
                self.state = ClosedClean;
                Action::Noop
            },

            (Connecting | Open, Event::ClosedAbnormal) => {
                self.attempts += 1;
                if self.attempts >= self.policy.max_attempts {
                    self.state = GaveUp;
                    Action::Noop
                } else {
                    self.state = ClosedAbnormal;
                    Action::ScheduleRetry(self.policy.delay_for(self.attempts))
                }
            },

            (ClosedAbnormal, Event::RetryElapsed) => {
                self.state = Connecting;
                Action::OpenSocket
            },

            (_, Event::DisconnectRequested) => {
                self.state = ClosedClean;
                Action::CloseSocket
            },

            // Stale socket or timer events after a state change
            _ => Action::Noop,
        }
    }
}
