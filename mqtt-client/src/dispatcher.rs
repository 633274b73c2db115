use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use mqtt_core::{
    err::client::ErrorKind,
    packet::{MqttPacket, PacketType},
};
use tokio::sync::oneshot;

use crate::error::ClientError;

/// Opaque token returned from `add_handler`, used to later `remove_handler`.
pub type HandlerId = u64;

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub type Callback = Arc<dyn Fn(MqttPacket) -> BoxFuture + Send + Sync>;

struct Entry {
    id: HandlerId,
    callback: Callback,
}

/// Packet-type -> ordered handler-list registry, plus one-shot correlation of
/// responses to outstanding requests by packet id.
///
/// `dispatch` is called from the single receive task for every inbound packet.
/// It first checks for a waiting `await_msg` caller (keyed by packet type and,
/// when the packet carries one, its packet id); if none claims the packet it
/// falls through to the persistent handler list for that type, fanning out to
/// every registered callback in its own task so a slow callback cannot stall
/// reception.
pub struct Dispatcher {
    handlers: Mutex<HashMap<PacketType, Vec<Entry>>>,
    waiters: Mutex<HashMap<(PacketType, Option<u16>), oneshot::Sender<MqttPacket>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        return Self {
            handlers: Mutex::new(HashMap::new()),
            waiters: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        };
    }

    pub fn add_handler(&self, msg_type: PacketType, callback: Callback) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.handlers.lock().unwrap();
        handlers.entry(msg_type).or_insert_with(Vec::new).push(Entry { id, callback });
        return id;
    }

    /// Idempotent: removing an id that is not (or no longer) registered is a no-op.
    pub fn remove_handler(&self, msg_type: PacketType, id: HandlerId) {
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(list) = handlers.get_mut(&msg_type) {
            list.retain(|entry| entry.id != id);
        }
    }

    /// Installs a one-shot waiter that resolves on the first matching packet.
    /// When `packet_id` is `Some`, only a packet carrying that exact id
    /// satisfies the wait; other packets of the same type pass through to the
    /// persistent handler list untouched. Resolves with an error if the
    /// waiter is dropped unfulfilled, e.g. by `fail_all_waiters` on
    /// connection loss, rather than hanging forever.
    pub async fn await_msg(&self, msg_type: PacketType, packet_id: Option<u16>) -> Result<MqttPacket, ClientError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters.lock().unwrap();
            waiters.insert((msg_type, packet_id), tx);
        }
        return rx.await.map_err(|_| {
            ClientError::new(ErrorKind::Eof, String::from("connection lost while awaiting a response"))
        });
    }

    /// Drops every outstanding waiter, resolving each pending `await_msg` call
    /// with an error instead of leaving it pending across a reconnect.
    pub fn fail_all_waiters(&self) {
        let mut waiters = self.waiters.lock().unwrap();
        waiters.clear();
    }

    /// Delivered by the receive task for every inbound packet.
    pub fn dispatch(&self, packet: MqttPacket) {
        let msg_type = packet.msg_type();
        let packet_id = packet_id_of(&packet);

        if let Some(id) = packet_id {
            if let Some(tx) = self.take_waiter(msg_type, Some(id)) {
                let _ = tx.send(packet);
                return;
            }
        }
        if let Some(tx) = self.take_waiter(msg_type, None) {
            let _ = tx.send(packet);
            return;
        }

        let snapshot: Vec<Callback> = {
            let handlers = self.handlers.lock().unwrap();
            match handlers.get(&msg_type) {
                Some(list) => list.iter().map(|entry| entry.callback.clone()).collect(),
                None => return,
            }
        };

        for callback in snapshot {
            tokio::spawn(callback(packet.clone()));
        }
    }

    fn take_waiter(&self, msg_type: PacketType, packet_id: Option<u16>) -> Option<oneshot::Sender<MqttPacket>> {
        let mut waiters = self.waiters.lock().unwrap();
        waiters.remove(&(msg_type, packet_id))
    }
}

/// Extracts the packet id a response-correlated packet carries, if any.
pub fn packet_id_of(packet: &MqttPacket) -> Option<u16> {
    match packet {
        MqttPacket::PubAck(p) => Some(p.packet_id),
        MqttPacket::PubRec(p) => Some(p.packet_id),
        MqttPacket::PubRel(p) => Some(p.packet_id),
        MqttPacket::PubComp(p) => Some(p.packet_id),
        MqttPacket::SubAck(p) => Some(p.packet_id),
        MqttPacket::UnsubAck(p) => Some(p.packet_id),
        MqttPacket::Publish(p) => p.packet_id,
        _ => None,
    }
}
