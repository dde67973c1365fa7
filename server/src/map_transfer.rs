//! Map download for joining players.
//!
//! One connecting player at a time holds the transfer. The owner receives a
//! map-start packet with the compressed size, then chunks of the compressed
//! span data until the cursor reaches the end.

use crate::connection::ConnectionState;
use crate::error::ServerError;
use crate::replication::ReplicationHub;
use crate::transport::Transport;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use log::{debug, info};
use shared::{Packet, VoxelMap};
use std::io::Write;

/// zlib-compresses `data` in one pass.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, ServerError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data).map_err(ServerError::Compression)?;
    encoder.finish().map_err(ServerError::Compression)
}

#[derive(Debug)]
pub struct MapTransfer {
    owner: Option<u8>,
    compressed: Vec<u8>,
    cursor: usize,
    chunk_size: usize,
    chunks_per_tick: usize,
}

impl MapTransfer {
    pub fn new(chunk_size: usize, chunks_per_tick: usize) -> Self {
        Self {
            owner: None,
            compressed: Vec::new(),
            cursor: 0,
            chunk_size: chunk_size.max(1),
            chunks_per_tick: chunks_per_tick.max(1),
        }
    }

    pub fn owner(&self) -> Option<u8> {
        self.owner
    }

    pub fn compressed_len(&self) -> usize {
        self.compressed.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Drops ownership if `player_id` holds it. Returns whether it did.
    pub fn release(&mut self, player_id: u8) -> bool {
        if self.owner != Some(player_id) {
            return false;
        }
        debug!("Player {} released map ownership at {}", player_id, self.cursor);
        self.owner = None;
        self.cursor = 0;
        true
    }

    /// Advances the transfer by up to `chunks_per_tick` chunks.
    ///
    /// Returns the id of the player whose download finished during this call.
    pub fn service<T: Transport>(
        &mut self,
        map: &mut VoxelMap,
        hub: &mut ReplicationHub<T>,
    ) -> Result<Option<u8>, ServerError> {
        let owner = match self.owner {
            Some(owner) => owner,
            None => match hub.pool().first_connecting() {
                Some(next) => {
                    self.begin(next, map, hub)?;
                    next
                }
                None => return Ok(None),
            },
        };

        let still_connecting = hub
            .pool()
            .get(owner)
            .is_some_and(|c| c.state == ConnectionState::Connecting);
        if !still_connecting {
            self.release(owner);
            return Ok(None);
        }

        for _ in 0..self.chunks_per_tick {
            if self.cursor >= self.compressed.len() {
                break;
            }
            let end = (self.cursor + self.chunk_size).min(self.compressed.len());
            hub.send(owner, &Packet::MapChunk(&self.compressed[self.cursor..end]));
            self.cursor = end;
        }

        if self.cursor >= self.compressed.len() {
            info!("Map transfer to player {} complete", owner);
            self.owner = None;
            self.cursor = 0;
            return Ok(Some(owner));
        }
        Ok(None)
    }

    fn begin<T: Transport>(
        &mut self,
        owner: u8,
        map: &mut VoxelMap,
        hub: &mut ReplicationHub<T>,
    ) -> Result<(), ServerError> {
        if map.is_changed() || self.compressed.is_empty() {
            let raw = map.encode();
            self.compressed = compress(&raw)?;
            map.mark_clean();
            debug!(
                "Map buffer regenerated: {} bytes raw, {} compressed",
                raw.len(),
                self.compressed.len()
            );
        }
        self.owner = Some(owner);
        self.cursor = 0;
        info!(
            "Player {} took map ownership ({} bytes)",
            owner,
            self.compressed.len()
        );
        hub.send(
            owner,
            &Packet::MapStart {
                size: self.compressed.len() as u32,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryTransport, PeerId};
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn hub_with(connecting: usize) -> ReplicationHub<MemoryTransport> {
        let mut hub = ReplicationHub::new(MemoryTransport::new(), 4);
        for i in 0..connecting {
            hub.pool_mut().allocate(PeerId(i as u64 + 1));
        }
        hub
    }

    fn reassemble(hub: &ReplicationHub<MemoryTransport>, peer: PeerId) -> (u32, Vec<u8>) {
        let mut size = 0;
        let mut data = Vec::new();
        for sent in hub.transport().sent_to(peer) {
            match Packet::decode(&sent.data, shared::Origin::Server).unwrap() {
                Packet::MapStart { size: s } => size = s,
                Packet::MapChunk(chunk) => data.extend_from_slice(chunk),
                other => panic!("unexpected packet {:?}", other),
            }
        }
        (size, data)
    }

    #[test]
    fn test_idle_without_connecting_players() {
        let mut map = VoxelMap::flat(40);
        let mut hub = hub_with(0);
        let mut transfer = MapTransfer::new(8192, 4);
        assert_eq!(transfer.service(&mut map, &mut hub).unwrap(), None);
        assert_eq!(transfer.owner(), None);
        assert!(hub.transport().sent().is_empty());
    }

    #[test]
    fn test_full_transfer_round_trip() {
        let mut map = VoxelMap::flat(40);
        map.modify_block(10, 10, 39, true, 0x00FF0000);
        let mut hub = hub_with(1);
        let mut transfer = MapTransfer::new(1024, 2);

        let mut finished = None;
        for _ in 0..1000 {
            finished = transfer.service(&mut map, &mut hub).unwrap();
            if finished.is_some() {
                break;
            }
        }
        assert_eq!(finished, Some(0));
        assert_eq!(transfer.owner(), None);
        assert!(!map.is_changed());

        let (size, data) = reassemble(&hub, PeerId(1));
        assert_eq!(size as usize, data.len());
        let mut raw = Vec::new();
        ZlibDecoder::new(&data[..]).read_to_end(&mut raw).unwrap();
        let decoded = VoxelMap::decode(&raw).unwrap();
        assert!(decoded.solid_at(10, 10, 39));
        assert_eq!(decoded.color_at(10, 10, 39), Some(0x00FF0000));
    }

    #[test]
    fn test_single_owner_at_a_time() {
        let mut map = VoxelMap::flat(40);
        let mut hub = hub_with(2);
        let mut transfer = MapTransfer::new(16, 1);

        transfer.service(&mut map, &mut hub).unwrap();
        assert_eq!(transfer.owner(), Some(0));
        for _ in 0..5 {
            transfer.service(&mut map, &mut hub).unwrap();
            assert_eq!(transfer.owner(), Some(0));
        }
        assert_eq!(hub.transport().sent_to(PeerId(2)).count(), 0);
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let mut map = VoxelMap::flat(40);
        let mut hub = hub_with(1);
        let mut transfer = MapTransfer::new(100, 3);
        transfer.service(&mut map, &mut hub).unwrap();

        let sent = hub.transport().sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].data[0], 18);
        for chunk in &sent[1..] {
            assert_eq!(chunk.data[0], 19);
            assert!(chunk.data.len() <= 101);
        }
        assert_eq!(transfer.cursor(), 300.min(transfer.compressed_len()));
    }

    #[test]
    fn test_release_only_by_owner() {
        let mut map = VoxelMap::flat(40);
        let mut hub = hub_with(2);
        let mut transfer = MapTransfer::new(16, 1);
        transfer.service(&mut map, &mut hub).unwrap();

        assert!(!transfer.release(1));
        assert_eq!(transfer.owner(), Some(0));
        assert!(transfer.release(0));
        assert_eq!(transfer.owner(), None);
    }

    #[test]
    fn test_buffer_regenerated_after_edit() {
        let mut map = VoxelMap::flat(40);
        let mut hub = hub_with(1);
        let mut transfer = MapTransfer::new(8192, 64);
        transfer.service(&mut map, &mut hub).unwrap();
        let first = transfer.compressed.clone();

        map.modify_block(100, 100, 30, true, 0x00123456);
        assert!(map.is_changed());
        hub.pool_mut().release(0);
        hub.pool_mut().allocate(PeerId(9));
        transfer.service(&mut map, &mut hub).unwrap();
        assert_ne!(first, transfer.compressed);
        assert!(!map.is_changed());
    }
}
