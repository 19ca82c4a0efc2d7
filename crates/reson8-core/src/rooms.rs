//! Publish/subscribe fan-out over server- and channel-scoped rooms.
//!
//! Membership is an explicit map guarded by concurrent maps; a session joins
//! and leaves rooms as it moves, and `emit`/`emit_except` deliver a frame to
//! every member's outbound queue. Slow or gone receivers only fail their own
//! send.

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use reson8_models::events::OutboundFrame;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    Server(i64),
    Channel(i64),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Server(id) => write!(f, "server:{id}"),
            Room::Channel(id) => write!(f, "channel:{id}"),
        }
    }
}

pub struct RoomBroker {
    members: DashMap<Room, HashSet<String>>,
    senders: DashMap<String, mpsc::UnboundedSender<OutboundFrame>>,
}

impl RoomBroker {
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
            senders: DashMap::new(),
        }
    }

    /// Attach a connection's outbound queue. Must precede any join.
    pub fn register(&self, connection_id: &str, sender: mpsc::UnboundedSender<OutboundFrame>) {
        self.senders.insert(connection_id.to_string(), sender);
    }

    /// Drop the connection from every room and forget its queue.
    pub fn unregister(&self, connection_id: &str) {
        self.senders.remove(connection_id);
        self.members.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    pub fn join(&self, room: Room, connection_id: &str) {
        self.members
            .entry(room)
            .or_default()
            .insert(connection_id.to_string());
    }

    pub fn leave(&self, room: Room, connection_id: &str) {
        if let Some(mut members) = self.members.get_mut(&room) {
            members.remove(connection_id);
        }
        self.members.remove_if(&room, |_, members| members.is_empty());
    }

    /// Deliver to every member of the room.
    pub fn emit(&self, room: Room, frame: OutboundFrame) {
        self.emit_inner(room, None, frame);
    }

    /// Deliver to every member except the emitting connection.
    pub fn emit_except(&self, room: Room, except: &str, frame: OutboundFrame) {
        self.emit_inner(room, Some(except), frame);
    }

    fn emit_inner(&self, room: Room, except: Option<&str>, frame: OutboundFrame) {
        let Some(members) = self.members.get(&room) else {
            return;
        };
        for connection_id in members.iter() {
            if except == Some(connection_id.as_str()) {
                continue;
            }
            if let Some(sender) = self.senders.get(connection_id) {
                if sender.send(frame.clone()).is_err() {
                    tracing::debug!(%room, connection_id, "dropping frame for closed connection");
                }
            }
        }
    }

    /// Deliver directly to one connection, bypassing room membership.
    pub fn send_to(&self, connection_id: &str, frame: OutboundFrame) {
        if let Some(sender) = self.senders.get(connection_id) {
            let _ = sender.send(frame);
        }
    }

    pub fn member_count(&self, room: Room) -> usize {
        self.members.get(&room).map(|m| m.len()).unwrap_or(0)
    }
}

impl Default for RoomBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event: &str) -> OutboundFrame {
        OutboundFrame::new(event, json!({}))
    }

    fn connect(broker: &RoomBroker, id: &str) -> mpsc::UnboundedReceiver<OutboundFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        broker.register(id, tx);
        rx
    }

    #[test]
    fn emit_reaches_all_members() {
        let broker = RoomBroker::new();
        let mut a = connect(&broker, "a");
        let mut b = connect(&broker, "b");
        broker.join(Room::Server(1), "a");
        broker.join(Room::Server(1), "b");

        broker.emit(Room::Server(1), frame("PING"));

        assert_eq!(a.try_recv().unwrap().event, "PING");
        assert_eq!(b.try_recv().unwrap().event, "PING");
    }

    #[test]
    fn emit_except_skips_the_emitter() {
        let broker = RoomBroker::new();
        let mut a = connect(&broker, "a");
        let mut b = connect(&broker, "b");
        broker.join(Room::Channel(5), "a");
        broker.join(Room::Channel(5), "b");

        broker.emit_except(Room::Channel(5), "a", frame("NEW_PRODUCER"));

        assert!(a.try_recv().is_err());
        assert_eq!(b.try_recv().unwrap().event, "NEW_PRODUCER");
    }

    #[test]
    fn membership_is_scoped_per_room() {
        let broker = RoomBroker::new();
        let mut a = connect(&broker, "a");
        broker.join(Room::Server(1), "a");

        broker.emit(Room::Channel(1), frame("PING"));
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn unregister_removes_from_every_room() {
        let broker = RoomBroker::new();
        let _a = connect(&broker, "a");
        broker.join(Room::Server(1), "a");
        broker.join(Room::Channel(2), "a");

        broker.unregister("a");
        assert_eq!(broker.member_count(Room::Server(1)), 0);
        assert_eq!(broker.member_count(Room::Channel(2)), 0);
    }
}
