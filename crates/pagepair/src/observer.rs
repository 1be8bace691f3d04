//! Engine state-transition notifications.
//!
//! The engine reports every transition to a [`PairingObserver`]. The default
//! [`TracingObserver`] forwards to `tracing`; [`EventLog`] records events for
//! tests and debug dumps.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::buffer::Stream;

/// One engine state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PairingEvent {
    /// Overlay aligned onto the original at window offset `offset`.
    Matched {
        original: u64,
        overlay: u64,
        offset: usize,
        composited: bool,
    },
    /// Skipped original filled with a resized, unverified overlay.
    BacktrackFill { original: u64, overlay: u64 },
    /// Front records dropped from a buffer.
    Pruned { stream: Stream, count: usize },
    /// Fully consumed record popped from the front of a buffer.
    Consumed { stream: Stream, sequence_index: u64 },
    /// Oracle rejected a candidate pair.
    Rejected {
        original: u64,
        overlay: u64,
        reason: String,
    },
    /// Double overlay matched one half and stays buffered for the other.
    AwaitingSecondHalf { overlay: u64 },
    /// Window exhausted; overlay stays buffered.
    Unresolved { overlay: u64, candidates: usize },
}

/// Receiver of engine transitions.
pub trait PairingObserver {
    fn on_event(&mut self, _event: &PairingEvent) {}
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PairingObserver for TracingObserver {
    fn on_event(&mut self, event: &PairingEvent) {
        match event {
            PairingEvent::Matched {
                original,
                overlay,
                offset,
                composited,
            } => tracing::debug!(
                "overlay {} -> original {} (offset {}, composited: {})",
                overlay,
                original,
                offset,
                composited
            ),
            PairingEvent::BacktrackFill { original, overlay } => {
                tracing::debug!("backtrack fill: overlay {} -> original {}", overlay, original)
            }
            PairingEvent::Pruned { stream, count } => {
                tracing::debug!("pruned {} {} page(s)", count, stream.label())
            }
            PairingEvent::Consumed {
                stream,
                sequence_index,
            } => tracing::debug!("consumed {} {}", stream.label(), sequence_index),
            PairingEvent::Rejected {
                original,
                overlay,
                reason,
            } => tracing::trace!("overlay {} vs original {}: {}", overlay, original, reason),
            PairingEvent::AwaitingSecondHalf { overlay } => {
                tracing::debug!("overlay {} awaits a second original", overlay)
            }
            PairingEvent::Unresolved {
                overlay,
                candidates,
            } => tracing::debug!(
                "overlay {} unresolved after {} candidate(s)",
                overlay,
                candidates
            ),
        }
    }
}

/// Shared, cloneable event recorder.
///
/// Hand one clone to the engine and keep another to inspect.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<PairingEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PairingEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl PairingObserver for EventLog {
    fn on_event(&mut self, event: &PairingEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
