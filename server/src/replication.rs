//! Outbound packet fan-out over the [`Transport`] seam
//!
//! The hub owns the transport handle, the connection pool and one scratch
//! buffer per packet kind. Every send encodes into the scratch buffer for
//! its kind and hands the written range to the transport, so steady-state
//! replication never allocates.

use crate::connection::{ConnectionPool, ConnectionState};
use crate::transport::{Delivery, PeerId, Transport, TransportEvent};
use log::{error, trace};
use shared::packets::{Packet, PacketId};
use shared::types::DisconnectReason;
use shared::{CodecError, Team, Vec3, Writer, MAX_PLAYERS};

fn delivery_for(id: PacketId) -> Delivery {
    if id.is_reliable() {
        Delivery::Reliable
    } else {
        Delivery::Unreliable
    }
}

/// Which connections a broadcast reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Team(Team),
}

pub struct ReplicationHub<T: Transport> {
    transport: T,
    pool: ConnectionPool,
    scratch: Vec<Vec<u8>>,
}

impl<T: Transport> ReplicationHub<T> {
    pub fn new(transport: T, max_players: usize) -> Self {
        Self {
            transport,
            pool: ConnectionPool::new(max_players),
            scratch: PacketId::ALL
                .iter()
                .map(|id| vec![0u8; id.max_len()])
                .collect(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut ConnectionPool {
        &mut self.pool
    }

    pub fn poll(&mut self) -> Option<TransportEvent> {
        self.transport.poll()
    }

    /// Closes a peer's link with a reason code
    pub fn refuse(&mut self, peer: PeerId, reason: DisconnectReason) {
        self.transport.disconnect(peer, reason);
    }

    /// Encodes into the scratch buffer of the packet's kind and returns the
    /// written length
    fn encode(&mut self, packet: &Packet<'_>) -> Option<(PacketId, usize)> {
        let id = packet.id();
        let mut w = Writer::new(&mut self.scratch[id.index()][..]);
        match packet.encode(&mut w) {
            Ok(()) => Some((id, w.position())),
            Err(e) => {
                error!("Failed to encode {:?}: {}", id, e);
                None
            }
        }
    }

    /// Sends to one connection regardless of its handshake state
    pub fn send(&mut self, player_id: u8, packet: &Packet<'_>) {
        let Some(peer) = self.pool.get(player_id).and_then(|c| c.peer) else {
            return;
        };
        if let Some((id, len)) = self.encode(packet) {
            self.transport
                .send(peer, &self.scratch[id.index()][..len], delivery_for(id));
        }
    }

    /// Sends to every Connected player except `exclude`
    pub fn broadcast(&mut self, packet: &Packet<'_>, exclude: Option<u8>) {
        self.broadcast_to(Audience::All, packet, exclude);
    }

    pub fn broadcast_team(&mut self, team: Team, packet: &Packet<'_>, exclude: Option<u8>) {
        self.broadcast_to(Audience::Team(team), packet, exclude);
    }

    pub fn broadcast_to(&mut self, audience: Audience, packet: &Packet<'_>, exclude: Option<u8>) {
        let Some((id, len)) = self.encode(packet) else {
            return;
        };
        let data = &self.scratch[id.index()][..len];
        let delivery = delivery_for(id);
        let mut count = 0;
        for conn in self.pool.connected() {
            if Some(conn.id) == exclude {
                continue;
            }
            if let Audience::Team(team) = audience {
                if conn.team != team {
                    continue;
                }
            }
            if let Some(peer) = conn.peer {
                self.transport.send(peer, data, delivery);
                count += 1;
            }
        }
        trace!("Broadcast {:?} ({} bytes) to {} players", id, len, count);
    }

    /// Fixed-layout snapshot of every slot's position and orientation in id
    /// order. Slots without a live, joined player are written as zeros.
    pub fn broadcast_world_update(&mut self) {
        let len = match self.encode_world_update() {
            Ok(len) => len,
            Err(e) => {
                error!("Failed to encode world update: {}", e);
                return;
            }
        };
        let data = &self.scratch[PacketId::WorldUpdate.index()][..len];
        let delivery = delivery_for(PacketId::WorldUpdate);
        for conn in self.pool.connected() {
            if let Some(peer) = conn.peer {
                self.transport.send(peer, data, delivery);
            }
        }
    }

    fn encode_world_update(&mut self) -> Result<usize, CodecError> {
        let mut w = Writer::new(&mut self.scratch[PacketId::WorldUpdate.index()][..]);
        w.write_enum(PacketId::WorldUpdate)?;
        for id in 0..MAX_PLAYERS {
            match self.pool.get(id as u8) {
                Some(conn)
                    if conn.state == ConnectionState::Connected && conn.joined && conn.alive =>
                {
                    w.write_vec3(conn.body.position)?;
                    w.write_vec3(conn.body.orientation())?;
                }
                _ => {
                    w.write_vec3(Vec3::ZERO)?;
                    w.write_vec3(Vec3::ZERO)?;
                }
            }
        }
        Ok(w.position())
    }
}
