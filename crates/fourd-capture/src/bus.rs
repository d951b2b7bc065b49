// crates/fourd-capture/src/bus.rs
//
// In-process Message Bus (spec §4.A). One `MasterBus` hub plus one
// `SlaveBus` handle per connected Slave. Delivery is ordered per
// (sender, kind) because each handle carries a single crossbeam channel —
// crossbeam_channel::unbounded is FIFO, so everything sent down one
// channel preserves its relative order; cross-kind ordering across
// different slaves is never implied (spec §5).
//
// A networked deployment would additionally frame these envelopes over a
// socket; that transport detail is out of this core's scope ("Local
// delivery... bypasses framing" — spec §4.A) and is left to a real
// `Transport` the way the camera SDK and farm driver are left as opaque
// collaborators (spec §1).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use fourd_core::{BusMessage, Envelope};

/// The Master-side hub: one inbox fed by every connected Slave, plus a
/// per-slave outbox for directives.
pub struct MasterBus {
    slaves: Mutex<HashMap<String, Sender<Envelope>>>,
    inbox_tx: Sender<Envelope>,
    inbox_rx: Receiver<Envelope>,
}

impl Default for MasterBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterBus {
    pub fn new() -> Self {
        let (inbox_tx, inbox_rx) = unbounded();
        Self { slaves: Mutex::new(HashMap::new()), inbox_tx, inbox_rx }
    }

    /// Register a new Slave and return its handle. Mirrors a Slave
    /// connecting to the Master.
    pub fn connect_slave(&self, name: impl Into<String>) -> SlaveBus {
        let name = name.into();
        let (to_slave_tx, to_slave_rx) = unbounded();
        self.slaves.lock().unwrap().insert(name.clone(), to_slave_tx);
        SlaveBus { name, rx: to_slave_rx, to_master: self.inbox_tx.clone() }
    }

    /// Drop a Slave's outbox — subsequent `send_to` calls for it fail.
    /// Called when SLAVE_DOWN is observed or a Slave is restarted away.
    pub fn disconnect_slave(&self, name: &str) {
        self.slaves.lock().unwrap().remove(name);
    }

    pub fn connected_slaves(&self) -> Vec<String> {
        self.slaves.lock().unwrap().keys().cloned().collect()
    }

    /// Directive to one named Slave (e.g. SLAVE_RESTART, TOGGLE_LIVE_VIEW).
    pub fn send_to(&self, slave_name: &str, message: BusMessage) -> bool {
        let slaves = self.slaves.lock().unwrap();
        match slaves.get(slave_name) {
            Some(tx) => tx.send(Envelope::new("master", message)).is_ok(),
            None => false,
        }
    }

    /// Broadcast to every connected Slave (e.g. MASTER_UP/DOWN, TOGGLE_RECORDING).
    pub fn broadcast(&self, message: BusMessage) {
        let slaves = self.slaves.lock().unwrap();
        for tx in slaves.values() {
            let _ = tx.send(Envelope::new("master", message.clone()));
        }
    }

    pub fn recv(&self) -> Option<Envelope> {
        self.inbox_rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Envelope> {
        match self.inbox_rx.recv_timeout(timeout) {
            Ok(envelope) => Some(envelope),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<Envelope> {
        self.inbox_rx.try_recv().ok()
    }
}

/// A Slave's handle onto the bus: receive directives from the Master, send
/// reports back.
pub struct SlaveBus {
    name: String,
    rx: Receiver<Envelope>,
    to_master: Sender<Envelope>,
}

impl SlaveBus {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self, message: BusMessage) {
        let _ = self.to_master.send(Envelope::new(self.name.clone(), message));
    }

    pub fn recv(&self) -> Option<Envelope> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// A cloneable, send-only handle onto this Slave's report channel. A
    /// Slave process hosts several CameraRuntimes that all need to report
    /// back to the Master but must never each own the single directive
    /// receiver, so they get one of these instead of a full `SlaveBus`.
    pub fn report_handle(&self) -> SlaveReportHandle {
        SlaveReportHandle { name: self.name.clone(), to_master: self.to_master.clone() }
    }
}

#[derive(Clone)]
pub struct SlaveReportHandle {
    name: String,
    to_master: Sender<Envelope>,
}

impl SlaveReportHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn send(&self, message: BusMessage) {
        let _ = self.to_master.send(Envelope::new(self.name.clone(), message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_every_connected_slave() {
        let master = MasterBus::new();
        let slave_a = master.connect_slave("a");
        let slave_b = master.connect_slave("b");

        master.broadcast(BusMessage::MasterUp);

        assert!(matches!(slave_a.recv().unwrap().message, BusMessage::MasterUp));
        assert!(matches!(slave_b.recv().unwrap().message, BusMessage::MasterUp));
    }

    #[test]
    fn slave_reports_arrive_in_masters_inbox_tagged_with_sender() {
        let master = MasterBus::new();
        let slave = master.connect_slave("slave-1");
        slave.send(BusMessage::SlaveDown { slave_name: "slave-1".into() });

        let envelope = master.recv().unwrap();
        assert_eq!(envelope.sender, "slave-1");
    }

    #[test]
    fn per_sender_ordering_is_preserved() {
        let master = MasterBus::new();
        let slave = master.connect_slave("slave-1");
        for i in 0..5 {
            slave.send(BusMessage::CameraParm { name: "n".into(), value: i.to_string() });
        }
        for i in 0..5 {
            let envelope = master.recv().unwrap();
            if let BusMessage::CameraParm { value, .. } = envelope.message {
                assert_eq!(value, i.to_string());
            } else {
                panic!("unexpected message");
            }
        }
    }

    #[test]
    fn directive_to_unknown_slave_is_reported_as_failure() {
        let master = MasterBus::new();
        assert!(!master.send_to("ghost", BusMessage::Retrigger));
    }
}
