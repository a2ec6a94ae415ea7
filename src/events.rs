//! Presentation events
//!
//! The flow engine never talks to a renderer. It buffers [`SimEvent`]s while an
//! actor runs and the engine forwards them to every registered [`Observer`]
//! once the actor has finished.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::world::{LocationId, VictimId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimEvent {
    /// A victim was acquired from the population of `location`.
    Created {
        victim: VictimId,
        location: LocationId,
    },
    /// A victim was attached to `to` after leaving `from`. Reacquisition
    /// reports `from == to`.
    Moved {
        victim: VictimId,
        from: LocationId,
        to: LocationId,
    },
    /// A victim should no longer be displayed.
    Hidden { victim: VictimId },
}

impl SimEvent {
    pub fn victim(&self) -> VictimId {
        match self {
            SimEvent::Created { victim, .. }
            | SimEvent::Moved { victim, .. }
            | SimEvent::Hidden { victim } => *victim,
        }
    }
}

pub trait Observer: Send {
    fn on_event(&mut self, event: &SimEvent);
}

/// Keeps every event it sees. Clones share the same log.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<SimEvent>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.events
            .lock()
            .expect("event recorder lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .expect("event recorder lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Observer for EventRecorder {
    fn on_event(&mut self, event: &SimEvent) {
        self.events
            .lock()
            .expect("event recorder lock poisoned")
            .push(*event);
    }
}

impl<F> Observer for F
where
    F: FnMut(&SimEvent) + Send,
{
    fn on_event(&mut self, event: &SimEvent) {
        self(event)
    }
}
