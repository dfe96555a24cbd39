//! In-process event channels between the engine and its host
//!
//! The engine owns two buses. The outbound one carries camera, layout and
//! insert notifications to subscribers; the inbound one takes insert requests
//! from the host and is drained once per frame. Both are bounded: when a bus is
//! full the oldest queued event is dropped, so a host that never subscribes
//! cannot grow the queue without limit.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::layout::LayoutMode;
use crate::tile::TileMode;

/// Events kept per bus before the oldest are dropped
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneEvent {
    CameraChanged {
        scale: f32,
        translate_x: f32,
        translate_y: f32,
    },
    LayoutChanged {
        mode: LayoutMode,
    },
    /// An entity id to insert into the host's query input.
    ///
    /// Travels both ways. The engine publishes it outbound when a node is
    /// double clicked, and hosts send it inbound to have it routed to
    /// `HostCallbacks::on_insert_request`.
    InsertId {
        id: String,
    },
}

/// Bounded multi-producer event queue. Cloned senders and receivers all see
/// the same stream; each event is delivered to exactly one receiver.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: Sender<SceneEvent>,
    rx: Receiver<SceneEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// A raw sender. Unlike [`EventBus::publish`] its `send` blocks while the
    /// bus is full; use `try_send` from threads that must not wait.
    pub fn sender(&self) -> Sender<SceneEvent> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<SceneEvent> {
        self.rx.clone()
    }

    /// Queue an event without blocking, evicting the oldest when full
    pub fn publish(&self, mut event: SceneEvent) {
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    let evicted = self.rx.try_recv().ok();
                    trace!(?evicted, "event bus full, dropped oldest");
                    event = rejected;
                }
                // The bus owns a receiver, so this cannot happen
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Take everything currently queued
    pub fn drain(&self) -> Vec<SceneEvent> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Normalize a raw entity id into `person:N` or `company:N`.
///
/// Already prefixed ids are lowercased. Bare numeric ids are prefixed by tile
/// mode: graph tiles use the node group (1 is a person), flow tiles only name
/// companies at the two anchors, everything else is a person. Returns `None`
/// when no id can be formed.
pub fn canonical_entity_id(raw: &str, group: u16, index: usize, mode: Option<&TileMode>) -> Option<String> {
    let raw = raw.trim();
    if let Some((prefix, digits)) = raw.split_once(':') {
        let prefix = prefix.to_ascii_lowercase();
        if (prefix == "person" || prefix == "company") && is_numeric(digits) {
            return Some(format!("{prefix}:{digits}"));
        }
        return Some(raw.to_string()).filter(|s| !s.is_empty());
    }
    if !is_numeric(raw) {
        return Some(raw.to_string()).filter(|s| !s.is_empty());
    }
    match mode {
        Some(TileMode::Graph) if group == 1 => Some(format!("person:{raw}")),
        Some(TileMode::Graph) => Some(format!("company:{raw}")),
        Some(TileMode::Flows) if index <= 1 => Some(format!("company:{raw}")),
        Some(TileMode::Flows) => None,
        _ => Some(format!("person:{raw}")),
    }
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_events_drain_in_order() {
        let bus = EventBus::new();
        bus.publish(SceneEvent::LayoutChanged {
            mode: LayoutMode::Grid,
        });
        bus.sender()
            .send(SceneEvent::InsertId { id: "person:1".into() })
            .unwrap();
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], SceneEvent::InsertId { .. }));
        assert!(bus.drain().is_empty());
    }

    #[test]
    fn full_bus_drops_oldest_events() {
        let bus = EventBus::with_capacity(4);
        for i in 0..10 {
            bus.publish(SceneEvent::InsertId { id: format!("person:{i}") });
        }
        assert_eq!(bus.len(), 4);
        let ids: Vec<_> = bus
            .drain()
            .into_iter()
            .map(|e| match e {
                SceneEvent::InsertId { id } => id,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec!["person:6", "person:7", "person:8", "person:9"]);
        assert!(bus.is_empty());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&SceneEvent::LayoutChanged {
            mode: LayoutMode::Radial,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"layout_changed","mode":"radial"}"#);
    }

    #[test]
    fn prefixed_ids_are_lowercased() {
        assert_eq!(canonical_entity_id("Person:42", 0, 5, None).as_deref(), Some("person:42"));
        assert_eq!(
            canonical_entity_id("COMPANY:7", 1, 0, Some(&TileMode::Graph)).as_deref(),
            Some("company:7")
        );
    }

    #[test]
    fn numeric_ids_follow_tile_mode() {
        let graph = Some(TileMode::Graph);
        assert_eq!(canonical_entity_id("9", 1, 3, graph.as_ref()).as_deref(), Some("person:9"));
        assert_eq!(canonical_entity_id("9", 0, 3, graph.as_ref()).as_deref(), Some("company:9"));

        let flows = Some(TileMode::Flows);
        assert_eq!(canonical_entity_id("9", 0, 1, flows.as_ref()).as_deref(), Some("company:9"));
        assert_eq!(canonical_entity_id("9", 0, 2, flows.as_ref()), None);

        assert_eq!(
            canonical_entity_id("9", 0, 2, Some(&TileMode::PersonEgo)).as_deref(),
            Some("person:9")
        );
        assert_eq!(canonical_entity_id("9", 0, 2, None).as_deref(), Some("person:9"));
    }

    #[test]
    fn handles_pass_through_and_blank_is_none() {
        assert_eq!(canonical_entity_id("ada-l", 0, 0, None).as_deref(), Some("ada-l"));
        assert_eq!(canonical_entity_id("  ", 0, 0, None), None);
    }
}
