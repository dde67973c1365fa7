//! The seam between the game server and whatever moves datagrams.
//!
//! The server only ever polls for events, sends bytes to a peer and drops a
//! peer with a reason. [`MemoryTransport`] implements the seam with plain
//! queues; the UDP adapter lives in [`crate::udp`].

use shared::types::DisconnectReason;
use std::collections::VecDeque;
use std::fmt;

/// Opaque handle for one remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Reliable,
    Unreliable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connect { peer: PeerId, version: u32 },
    Receive { peer: PeerId, data: Vec<u8> },
    Disconnect { peer: PeerId },
}

pub trait Transport {
    /// Next pending event, without blocking.
    fn poll(&mut self) -> Option<TransportEvent>;

    fn send(&mut self, peer: PeerId, data: &[u8], delivery: Delivery);

    /// Closes the link after delivering `reason` to the peer.
    fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub peer: PeerId,
    pub data: Vec<u8>,
    pub delivery: Delivery,
}

/// Queue-backed transport that records everything the server emits.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    inbound: VecDeque<TransportEvent>,
    sent: Vec<SentPacket>,
    disconnects: Vec<(PeerId, DisconnectReason)>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_connect(&mut self, peer: PeerId, version: u32) {
        self.inbound.push_back(TransportEvent::Connect { peer, version });
    }

    pub fn push_receive(&mut self, peer: PeerId, data: &[u8]) {
        self.inbound.push_back(TransportEvent::Receive {
            peer,
            data: data.to_vec(),
        });
    }

    pub fn push_disconnect(&mut self, peer: PeerId) {
        self.inbound.push_back(TransportEvent::Disconnect { peer });
    }

    pub fn sent(&self) -> &[SentPacket] {
        &self.sent
    }

    /// Drains the record of sent packets.
    pub fn take_sent(&mut self) -> Vec<SentPacket> {
        std::mem::take(&mut self.sent)
    }

    pub fn sent_to(&self, peer: PeerId) -> impl Iterator<Item = &SentPacket> + '_ {
        self.sent.iter().filter(move |p| p.peer == peer)
    }

    pub fn disconnects(&self) -> &[(PeerId, DisconnectReason)] {
        &self.disconnects
    }
}

impl Transport for MemoryTransport {
    fn poll(&mut self) -> Option<TransportEvent> {
        self.inbound.pop_front()
    }

    fn send(&mut self, peer: PeerId, data: &[u8], delivery: Delivery) {
        self.sent.push(SentPacket {
            peer,
            data: data.to_vec(),
            delivery,
        });
    }

    fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason) {
        self.disconnects.push((peer, reason));
    }
}
