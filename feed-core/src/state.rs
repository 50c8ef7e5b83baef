//! Stream connection state machine for tideline.
//!
//! This module provides a pure, side-effect-free state machine for the push
//! stream's connection lifecycle. The state machine takes events as input and
//! produces a new state plus a list of actions to execute.
//!
//! The actual I/O (subscribing, waiting out the backoff) is performed by
//! feed-client, not by this module.

use std::fmt;
use std::time::Duration;

/// Stream connection state - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Not subscribed.
    #[default]
    Disconnected,
    /// Subscription in progress.
    Connecting,
    /// Receiving frames.
    Connected,
    /// Lost the connection, waiting to re-subscribe.
    Reconnecting {
        /// Number of reconnection attempts so far.
        attempt: u32,
    },
}

impl StreamState {
    /// Create a new state machine in the Disconnected state.
    pub fn new() -> Self {
        Self::Disconnected
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function apart from backoff jitter. The caller
    /// (feed-client) is responsible for executing the returned actions.
    pub fn on_event(self, event: Event, policy: &ReconnectPolicy) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Disconnected
            (Self::Disconnected, Event::ConnectRequested) => {
                (Self::Connecting, vec![Action::Subscribe])
            }

            // From Connecting
            (Self::Connecting, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::Emit(StreamNotice::Connected)],
            ),
            (Self::Connecting, Event::ConnectFailed { error }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    Action::Emit(StreamNotice::ConnectFailed { error }),
                    Action::StartReconnectTimer {
                        delay: policy.backoff(1),
                    },
                ],
            ),

            // From Connected
            (Self::Connected, Event::StreamEnded { reason }) => (
                Self::Reconnecting { attempt: 1 },
                vec![
                    Action::Emit(StreamNotice::Lost { reason }),
                    Action::StartReconnectTimer {
                        delay: policy.backoff(1),
                    },
                ],
            ),

            // From Reconnecting
            (Self::Reconnecting { attempt }, Event::ReconnectTimer) => (
                Self::Reconnecting { attempt },
                vec![Action::Subscribe],
            ),
            (Self::Reconnecting { .. }, Event::ConnectSucceeded) => (
                Self::Connected,
                vec![Action::Emit(StreamNotice::Connected)],
            ),
            (Self::Reconnecting { attempt }, Event::ConnectFailed { error }) => {
                let next_attempt = attempt.saturating_add(1);
                (
                    Self::Reconnecting {
                        attempt: next_attempt,
                    },
                    vec![
                        Action::Emit(StreamNotice::ReconnectFailed {
                            attempt: next_attempt,
                            error,
                        }),
                        Action::StartReconnectTimer {
                            delay: policy.backoff(next_attempt),
                        },
                    ],
                )
            }

            // Disconnect from anywhere
            (Self::Reconnecting { .. }, Event::DisconnectRequested) => {
                (Self::Disconnected, vec![Action::CancelReconnect])
            }
            (Self::Connecting | Self::Connected, Event::DisconnectRequested) => (
                Self::Disconnected,
                vec![Action::Emit(StreamNotice::Closed)],
            ),

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Check if frames are flowing.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if currently trying to connect.
    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
        }
    }
}

/// Events that can occur in the stream lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The engine wants a live stream.
    ConnectRequested,
    /// Subscription succeeded.
    ConnectSucceeded,
    /// Subscription failed.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The frame sequence ended or errored.
    StreamEnded {
        /// Reason the stream ended.
        reason: String,
    },
    /// Reconnect timer fired.
    ReconnectTimer,
    /// The engine no longer wants the stream.
    DisconnectRequested,
}

/// Actions to be executed by feed-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Call `subscribe` on the stream collaborator.
    Subscribe,
    /// Wait before re-subscribing.
    StartReconnectTimer {
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Report a lifecycle change.
    Emit(StreamNotice),
}

/// Lifecycle changes reported to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamNotice {
    /// Frames are flowing.
    Connected,
    /// The first subscription attempt failed.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// An established stream ended.
    Lost {
        /// Reason the stream ended.
        reason: String,
    },
    /// A reconnection attempt failed.
    ReconnectFailed {
        /// Which reconnection attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
    /// The stream was closed on request.
    Closed,
}

/// Reconnection backoff parameters.
///
/// Formula: `min(max, base * 2^attempt) + random(0..=jitter)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay unit doubled on every attempt.
    pub base: Duration,
    /// Ceiling for the exponential part.
    pub max: Duration,
    /// Upper bound of the random jitter added on top.
    pub jitter: Duration,
}

impl ReconnectPolicy {
    /// Create a policy.
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self { base, max, jitter }
    }

    /// Same policy without jitter (deterministic delays).
    pub fn without_jitter(self) -> Self {
        Self {
            jitter: Duration::ZERO,
            ..self
        }
    }

    /// Delay before reconnection attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let exponential = self.base.saturating_mul(factor).min(self.max);
        exponential + Duration::from_millis(random_jitter_ms(self.jitter.as_millis() as u64))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: Duration::from_millis(1000),
        }
    }
}

/// Random jitter in `0..=max_ms` milliseconds.
fn random_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut bytes = [0u8; 8];
    match getrandom::getrandom(&mut bytes) {
        Ok(()) => u64::from_le_bytes(bytes) % (max_ms + 1),
        // No entropy source: fall back to the deterministic delay.
        Err(_) => 0,
    }
}
