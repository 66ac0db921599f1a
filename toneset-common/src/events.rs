//! Session event types and event distribution
//!
//! Every observable step of a test session (phase transitions, completed trials,
//! pause/resume) is published as a [`SessionEvent`] on an [`EventBus`] owned by the
//! session context. Subscribers (UI adapters, progress printers, tests) receive
//! events without the trial loop knowing who is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Why a session entered the paused state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PauseReason {
    /// Subject or operator requested the pause
    Requested,
    /// Playback or response-channel fault surfaced by the trial loop
    Fault {
        /// Human-readable fault description
        message: String,
    },
}

/// ToneSet session events
///
/// Events are broadcast via [`EventBus`] and serialize with a `type` tag so they
/// can be forwarded verbatim to a UI process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A test session left the idle state
    SessionStarted {
        /// Session identifier
        session_id: Uuid,
        /// Test name (e.g. "calibration", "confidence")
        test: String,
        /// When the session started
        timestamp: DateTime<Utc>,
    },

    /// A phase began presenting trials
    PhaseStarted {
        session_id: Uuid,
        /// Phase name (e.g. "ramp", "floor", "calibration")
        phase: String,
        timestamp: DateTime<Utc>,
    },

    /// A phase consumed all of its trials
    PhaseCompleted {
        session_id: Uuid,
        phase: String,
        timestamp: DateTime<Utc>,
    },

    /// A trial was finalized and recorded
    TrialCompleted {
        session_id: Uuid,
        phase: String,
        /// Primary frequency of the presented tone (Hz)
        frequency: f64,
        /// Presented volume
        volume: f64,
        /// Whether the response matched the expected answer
        correct: bool,
        timestamp: DateTime<Utc>,
    },

    /// The session was paused; any in-flight trial was discarded
    SessionPaused {
        session_id: Uuid,
        reason: PauseReason,
        timestamp: DateTime<Utc>,
    },

    /// The session resumed at the same position
    SessionResumed {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The session reached its terminal state
    SessionCompleted {
        session_id: Uuid,
        /// Total trials recorded over the session
        trials: usize,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Session identifier carried by every event
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::SessionStarted { session_id, .. }
            | SessionEvent::PhaseStarted { session_id, .. }
            | SessionEvent::PhaseCompleted { session_id, .. }
            | SessionEvent::TrialCompleted { session_id, .. }
            | SessionEvent::SessionPaused { session_id, .. }
            | SessionEvent::SessionResumed { session_id, .. }
            | SessionEvent::SessionCompleted { session_id, .. } => *session_id,
        }
    }
}

/// Central event distribution bus for session events
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (a slow subscriber never delays trial presentation)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// `emit` works from plain threads; no runtime is required to publish.
///
/// # Examples
///
/// ```
/// use toneset_common::events::{EventBus, SessionEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(SessionEvent::SessionResumed {
///     session_id: uuid::Uuid::new_v4(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Recommended values:
    /// - Interactive sessions: 256
    /// - Testing: 10-100
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus_delivers_to_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        let count = bus
            .emit(SessionEvent::PhaseStarted {
                session_id: id,
                phase: "ramp".to_string(),
                timestamp: Utc::now(),
            })
            .expect("one subscriber is listening");
        assert_eq!(count, 1);

        match rx.try_recv().unwrap() {
            SessionEvent::PhaseStarted { phase, session_id, .. } => {
                assert_eq!(phase, "ramp");
                assert_eq!(session_id, id);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_fails_but_lossy_does_not_panic() {
        let bus = EventBus::new(10);
        let event = SessionEvent::SessionResumed {
            session_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SessionEvent::SessionPaused {
            session_id: Uuid::nil(),
            reason: PauseReason::Fault {
                message: "device lost".to_string(),
            },
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SessionPaused");
        assert_eq!(json["reason"]["kind"], "Fault");
        assert_eq!(json["reason"]["message"], "device lost");

        let back: SessionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.session_id(), Uuid::nil());
    }
}
