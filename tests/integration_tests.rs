//! End-to-end tests driving the server through its transport seam

use flate2::read::ZlibDecoder;
use server::config::ServerConfig;
use server::connection::ConnectionState;
use server::handlers::Rejection;
use server::network::Server;
use server::transport::{Delivery, MemoryTransport, PeerId};
use shared::packets::{BlockAction, BlockLine, ChatMessage, ExistingPlayer, GrenadeThrown, Hit};
use shared::types::{BlockActionKind, ChatType, DamageType, DisconnectReason, HitType, KillType};
use shared::{
    Color, IVec3, Origin, Packet, PacketId, PlayerName, Team, Tool, Vec3, VoxelMap, Weapon,
    WireEnum, Writer, PROTOCOL_VERSION,
};
use std::io::Read;

const DT: f32 = 1.0 / 60.0;
const MAX_TICKS: usize = 2_000;
const GROUND: i32 = 40;

fn test_config() -> ServerConfig {
    ServerConfig {
        max_players: 4,
        map_chunk_size: 1024,
        map_chunks_per_tick: 1,
        position_tolerance: 1000.0,
        seed: Some(7),
        ..ServerConfig::default()
    }
}

fn new_server(config: ServerConfig) -> Server<MemoryTransport> {
    Server::new(config, VoxelMap::flat(GROUND), MemoryTransport::new())
}

fn encode(packet: &Packet<'_>) -> Vec<u8> {
    let mut buf = vec![0u8; packet.id().max_len()];
    let mut w = Writer::new(&mut buf[..]);
    packet.encode(&mut w).expect("packet encodes");
    let len = w.position();
    buf.truncate(len);
    buf
}

fn received(server: &Server<MemoryTransport>, peer: PeerId) -> Vec<Packet<'_>> {
    server
        .transport()
        .sent_to(peer)
        .filter_map(|p| Packet::decode(&p.data, Origin::Server).ok())
        .collect()
}

fn received_ids(server: &Server<MemoryTransport>, peer: PeerId) -> Vec<PacketId> {
    received(server, peer).iter().map(|p| p.id()).collect()
}

fn state_of(server: &Server<MemoryTransport>, peer: PeerId) -> Option<ConnectionState> {
    let id = server.hub().pool().by_peer(peer)?;
    server.hub().pool().get(id).map(|c| c.state)
}

fn tick_until(
    server: &mut Server<MemoryTransport>,
    done: impl Fn(&Server<MemoryTransport>) -> bool,
) {
    for _ in 0..MAX_TICKS {
        if done(server) {
            return;
        }
        server.tick(DT);
    }
    panic!("condition not reached within {} ticks", MAX_TICKS);
}

/// Connects `peer` and runs ticks until its map download has finished.
fn connect(server: &mut Server<MemoryTransport>, peer: PeerId) -> u8 {
    server.transport_mut().push_connect(peer, PROTOCOL_VERSION);
    server.pump();
    let id = server.hub().pool().by_peer(peer).expect("slot allocated");
    tick_until(server, |s| state_of(s, peer) == Some(ConnectionState::Connected));
    id
}

fn join(
    server: &mut Server<MemoryTransport>,
    peer: PeerId,
    id: u8,
    team: Team,
    tool: Tool,
    name: &str,
) {
    let packet = Packet::ExistingPlayer(ExistingPlayer {
        player_id: id,
        team,
        weapon: Weapon::Rifle,
        tool,
        kills: 0,
        color: Color::new(10, 20, 30),
        name: PlayerName::from(name),
    });
    server.transport_mut().push_receive(peer, &encode(&packet));
    server.pump();
}

fn send(server: &mut Server<MemoryTransport>, peer: PeerId, packet: &Packet<'_>) {
    server.transport_mut().push_receive(peer, &encode(packet));
    server.pump();
}

/// A rifle headshot from `peer` at `target`: a full health bar.
fn headshot(server: &mut Server<MemoryTransport>, peer: PeerId, target: u8) {
    let hit = Packet::Hit(Hit {
        target,
        hit_type: HitType::Head,
    });
    send(server, peer, &hit);
}

fn is_alive(server: &Server<MemoryTransport>, id: u8) -> bool {
    server.hub().pool().get(id).is_some_and(|c| c.alive)
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// Tests that a second player waits for the first map download to finish
    #[test]
    fn map_transfer_is_serialized() {
        let mut server = new_server(test_config());
        server.transport_mut().push_connect(PeerId(1), PROTOCOL_VERSION);
        server.transport_mut().push_connect(PeerId(2), PROTOCOL_VERSION);
        server.pump();
        server.tick(DT);

        assert!(received_ids(&server, PeerId(1)).contains(&PacketId::MapStart));
        assert!(received_ids(&server, PeerId(2)).is_empty());

        tick_until(&mut server, |s| {
            state_of(s, PeerId(1)) == Some(ConnectionState::Connected)
        });
        assert_eq!(state_of(&server, PeerId(2)), Some(ConnectionState::Connecting));
        assert!(!received_ids(&server, PeerId(2)).contains(&PacketId::MapChunk));

        tick_until(&mut server, |s| {
            state_of(s, PeerId(2)) == Some(ConnectionState::Connected)
        });
        let ids = received_ids(&server, PeerId(2));
        assert_eq!(ids.first(), Some(&PacketId::MapStart));
        assert_eq!(ids.last(), Some(&PacketId::StateData));
    }

    /// Tests that the streamed chunks reassemble into the server's map
    #[test]
    fn map_download_reassembles() {
        let mut server = new_server(test_config());
        connect(&mut server, PeerId(1));

        let packets = received(&server, PeerId(1));
        let mut size = None;
        let mut compressed = Vec::new();
        for packet in &packets {
            match packet {
                Packet::MapStart { size: s } => size = Some(*s as usize),
                Packet::MapChunk(chunk) => {
                    assert!(chunk.len() <= 1024);
                    compressed.extend_from_slice(chunk);
                }
                _ => {}
            }
        }
        assert_eq!(size, Some(compressed.len()));

        let mut raw = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut raw)
            .expect("valid zlib stream");
        let map = VoxelMap::decode(&raw).expect("valid map");
        assert_eq!(map.find_top_block(256, 256), Some(GROUND));
        assert_eq!(map.find_top_block(0, 511), Some(GROUND));
    }

    /// Tests that a full server refuses without allocating a slot
    #[test]
    fn capacity_refusal() {
        let mut server = new_server(ServerConfig {
            max_players: 2,
            ..test_config()
        });
        for peer in 1..=3 {
            server.transport_mut().push_connect(PeerId(peer), PROTOCOL_VERSION);
        }
        server.pump();

        assert_eq!(server.hub().pool().len(), 2);
        assert_eq!(server.hub().pool().by_peer(PeerId(3)), None);
        assert_eq!(
            server.transport().disconnects(),
            &[(PeerId(3), DisconnectReason::ServerFull)]
        );
    }

    /// Tests that the version check runs before the capacity check
    #[test]
    fn wrong_version_refusal() {
        let mut server = new_server(ServerConfig {
            max_players: 1,
            ..test_config()
        });
        server.transport_mut().push_connect(PeerId(1), PROTOCOL_VERSION);
        server.transport_mut().push_connect(PeerId(2), PROTOCOL_VERSION + 1);
        server.pump();

        assert_eq!(
            server.transport().disconnects(),
            &[(PeerId(2), DisconnectReason::WrongVersion)]
        );
        assert_eq!(server.hub().pool().len(), 1);
    }

    /// Tests that a departing download owner hands the transfer to the next peer
    #[test]
    fn disconnect_releases_transfer() {
        let mut server = new_server(test_config());
        server.transport_mut().push_connect(PeerId(1), PROTOCOL_VERSION);
        server.transport_mut().push_connect(PeerId(2), PROTOCOL_VERSION);
        server.pump();
        server.tick(DT);
        let first = server.hub().pool().by_peer(PeerId(1)).expect("slot");
        assert_eq!(server.transfer().owner(), Some(first));

        server.transport_mut().push_disconnect(PeerId(1));
        server.pump();
        assert_eq!(server.transfer().owner(), None);
        assert_eq!(server.hub().pool().len(), 1);

        server.tick(DT);
        let second = server.hub().pool().by_peer(PeerId(2)).expect("slot");
        assert_eq!(server.transfer().owner(), Some(second));
        assert!(received_ids(&server, PeerId(2)).contains(&PacketId::MapStart));
    }

    /// Tests that a connected player leaving is announced to the others
    #[test]
    fn player_left_broadcast() {
        let mut server = new_server(test_config());
        let first = connect(&mut server, PeerId(1));
        connect(&mut server, PeerId(2));
        server.transport_mut().take_sent();

        server.transport_mut().push_disconnect(PeerId(1));
        server.pump();

        let packets = received(&server, PeerId(2));
        assert!(packets.contains(&Packet::PlayerLeft { player_id: first }));
        assert_eq!(
            server.hub().pool().get(first).map(|c| c.state),
            Some(ConnectionState::Disconnected)
        );
    }

    /// Tests that a second connect from a known peer on a full server is ignored
    #[test]
    fn repeated_connect_keeps_slot() {
        let mut server = new_server(ServerConfig {
            max_players: 1,
            ..test_config()
        });
        server.transport_mut().push_connect(PeerId(1), PROTOCOL_VERSION);
        server.pump();
        let id = server.hub().pool().by_peer(PeerId(1));
        assert!(server.hub().pool().is_full());

        server.transport_mut().push_connect(PeerId(1), PROTOCOL_VERSION);
        server.pump();

        assert!(server.transport().disconnects().is_empty());
        assert_eq!(server.hub().pool().len(), 1);
        assert_eq!(server.hub().pool().by_peer(PeerId(1)), id);
    }

    /// Tests that a block line from a peer still downloading the map is
    /// refused before its endpoints are looked at
    #[test]
    fn block_line_while_connecting() {
        let mut server = new_server(test_config());
        server.transport_mut().push_connect(PeerId(1), PROTOCOL_VERSION);
        server.pump();
        let id = server.hub().pool().by_peer(PeerId(1)).expect("slot");

        let line = BlockLine {
            player_id: id,
            start: IVec3::new(i32::MIN, i32::MIN, i32::MIN),
            end: IVec3::new(i32::MAX, i32::MAX, i32::MAX),
        };
        let result = server.handle_packet(id, Packet::BlockLine(line));

        assert!(matches!(result, Err(Rejection::NotInPlay)));
        assert!(server.transport().sent().is_empty());
    }

    /// Tests that garbage from a peer is dropped without a reply
    #[test]
    fn malformed_packet_ignored() {
        let mut server = new_server(test_config());
        connect(&mut server, PeerId(1));
        server.transport_mut().take_sent();

        server.transport_mut().push_receive(PeerId(1), &[0xEE, 1, 2, 3]);
        server.transport_mut().push_receive(PeerId(1), &[]);
        server.transport_mut().push_receive(PeerId(9), &[0]);
        server.pump();

        assert!(server.transport().sent().is_empty());
        assert!(server.transport().disconnects().is_empty());
    }
}

/// GAMEPLAY INTEGRATION TESTS
mod gameplay_tests {
    use super::*;

    /// Tests that joining announces the player and a late joiner learns about them
    #[test]
    fn join_spawns_player() {
        let mut server = new_server(test_config());
        let first = connect(&mut server, PeerId(1));
        join(&mut server, PeerId(1), first, Team::A, Tool::Gun, "alpha");

        let spawned = received(&server, PeerId(1)).into_iter().find_map(|p| match p {
            Packet::CreatePlayer(create) => Some(create),
            _ => None,
        });
        let create = spawned.expect("CreatePlayer broadcast");
        assert_eq!(create.player_id, first);
        assert_eq!(create.team, Team::A);
        assert_eq!(create.name.as_str(), "alpha");
        assert!((64.0..128.0).contains(&create.position.x));

        connect(&mut server, PeerId(2));
        let existing = received(&server, PeerId(2)).into_iter().find_map(|p| match p {
            Packet::ExistingPlayer(existing) => Some(existing),
            _ => None,
        });
        assert_eq!(existing.map(|e| e.player_id), Some(first));
    }

    /// Tests that duplicate names get a numeric suffix
    #[test]
    fn duplicate_names_are_suffixed() {
        let mut server = new_server(test_config());
        let first = connect(&mut server, PeerId(1));
        let second = connect(&mut server, PeerId(2));
        join(&mut server, PeerId(1), first, Team::A, Tool::Gun, "twin");
        join(&mut server, PeerId(2), second, Team::B, Tool::Gun, "TWIN");

        let pool = server.hub().pool();
        let names: Vec<_> = [first, second]
            .iter()
            .filter_map(|id| pool.get(*id))
            .map(|c| c.name.as_str().to_string())
            .collect();
        assert_eq!(names[0], "twin");
        assert_ne!(names[1].to_lowercase(), "twin");
        assert!(names[1].starts_with("TWIN"));
    }

    /// Tests carrying the enemy intel home scores a capture
    #[test]
    fn capture_flow() {
        let mut server = new_server(test_config());
        let id = connect(&mut server, PeerId(1));
        join(&mut server, PeerId(1), id, Team::A, Tool::Gun, "runner");

        let intel = server.ctf().intel(Team::B).expect("intel").entity.position;
        let base = server.ctf().base(Team::A).expect("base").entity.position;

        let at_intel = Vec3::new(intel.x, intel.y, intel.z - 2.4);
        send(&mut server, PeerId(1), &Packet::Position(at_intel));
        server.tick(DT);
        assert_eq!(server.ctf().carried_by(id), Some(Team::B));
        assert!(received(&server, PeerId(1)).contains(&Packet::IntelPickup { player_id: id }));

        let at_base = Vec3::new(base.x, base.y, base.z - 2.4);
        send(&mut server, PeerId(1), &Packet::Position(at_base));
        server.tick(DT);

        assert_eq!(server.ctf().carried_by(id), None);
        assert_eq!(server.ctf().scores(), [1, 0]);
        let packets = received(&server, PeerId(1));
        assert!(packets
            .iter()
            .any(|p| matches!(p, Packet::IntelCapture(c) if c.player_id == id && !c.winning)));
        assert!(packets.iter().any(|p| matches!(p, Packet::MoveObject(_))));
        assert_eq!(server.hub().pool().get(id).map(|c| c.kills), Some(10));
    }

    /// Tests that a block placed next to the builder lands in the map and is replicated
    #[test]
    fn block_build() {
        let mut server = new_server(test_config());
        let builder = connect(&mut server, PeerId(1));
        let watcher = connect(&mut server, PeerId(2));
        join(&mut server, PeerId(1), builder, Team::A, Tool::Block, "mason");
        join(&mut server, PeerId(2), watcher, Team::B, Tool::Gun, "watcher");
        server.transport_mut().take_sent();

        let position = server.hub().pool().get(builder).expect("builder").body.position;
        let cell = IVec3::new(position.x as i32 + 1, position.y as i32, GROUND - 1);
        assert!(!server.map().solid_at(cell.x, cell.y, cell.z));

        send(
            &mut server,
            PeerId(1),
            &Packet::BlockAction(BlockAction {
                player_id: builder,
                action: BlockActionKind::Build,
                position: cell,
            }),
        );

        assert!(server.map().solid_at(cell.x, cell.y, cell.z));
        assert_eq!(server.hub().pool().get(builder).map(|c| c.blocks), Some(49));
        assert!(received_ids(&server, PeerId(2)).contains(&PacketId::BlockAction));
    }

    /// Tests that a build out of reach changes nothing
    #[test]
    fn block_build_out_of_reach() {
        let mut server = new_server(test_config());
        let builder = connect(&mut server, PeerId(1));
        join(&mut server, PeerId(1), builder, Team::A, Tool::Block, "mason");
        server.transport_mut().take_sent();

        let cell = IVec3::new(500, 500, GROUND - 1);
        send(
            &mut server,
            PeerId(1),
            &Packet::BlockAction(BlockAction {
                player_id: builder,
                action: BlockActionKind::Build,
                position: cell,
            }),
        );

        assert!(!server.map().solid_at(cell.x, cell.y, cell.z));
        assert!(server.transport().sent().is_empty());
    }

    /// Tests that a block line reaching outside the map is refused whole
    #[test]
    fn block_line_outside_map() {
        let mut server = new_server(test_config());
        let builder = connect(&mut server, PeerId(1));
        join(&mut server, PeerId(1), builder, Team::A, Tool::Block, "mason");
        server.transport_mut().take_sent();

        let position = server.hub().pool().get(builder).expect("builder").body.position;
        let near = IVec3::new(position.x as i32, position.y as i32, GROUND - 1);
        let lines = [
            (near, IVec3::new(20_000_000, near.y, near.z)),
            (IVec3::new(-3, near.y, near.z), near),
            (near, IVec3::new(i32::MAX, i32::MIN, i32::MAX)),
        ];
        for (start, end) in lines {
            let line = BlockLine {
                player_id: builder,
                start,
                end,
            };
            let result = server.handle_packet(builder, Packet::BlockLine(line));
            assert!(matches!(result, Err(Rejection::OutOfMap(_))), "{:?}", result);
        }

        assert!(!server.map().solid_at(near.x, near.y, near.z));
        assert_eq!(server.hub().pool().get(builder).map(|c| c.blocks), Some(50));
        assert!(server.transport().sent().is_empty());
    }

    /// Tests that a spectator is announced but never spawned
    #[test]
    fn spectator_join_is_not_spawned() {
        let mut server = new_server(test_config());
        connect(&mut server, PeerId(1));
        let ghost = connect(&mut server, PeerId(2));
        server.transport_mut().take_sent();

        join(&mut server, PeerId(2), ghost, Team::Spectator, Tool::Gun, "ghost");

        assert!(!is_alive(&server, ghost));
        assert!(server.hub().pool().get(ghost).is_some_and(|c| c.joined));
        assert!(!received_ids(&server, PeerId(1)).contains(&PacketId::CreatePlayer));
        let announced = received(&server, PeerId(1)).into_iter().find_map(|p| match p {
            Packet::ExistingPlayer(existing) => Some(existing),
            _ => None,
        });
        let announced = announced.expect("ExistingPlayer broadcast");
        assert_eq!(announced.player_id, ghost);
        assert_eq!(announced.team, Team::Spectator);

        for _ in 0..120 {
            server.tick(DT);
        }
        assert!(!is_alive(&server, ghost));
    }

    /// Tests that the intel falls to the ground when its holder is killed
    #[test]
    fn intel_dropped_on_death() {
        let mut server = new_server(test_config());
        let runner = connect(&mut server, PeerId(1));
        let shooter = connect(&mut server, PeerId(2));
        join(&mut server, PeerId(1), runner, Team::A, Tool::Gun, "runner");
        join(&mut server, PeerId(2), shooter, Team::B, Tool::Gun, "shooter");

        let intel = server.ctf().intel(Team::B).expect("intel").entity.position;
        let at_intel = Vec3::new(intel.x, intel.y, intel.z - 2.4);
        send(&mut server, PeerId(1), &Packet::Position(at_intel));
        server.tick(DT);
        assert_eq!(server.ctf().carried_by(runner), Some(Team::B));
        server.transport_mut().take_sent();

        headshot(&mut server, PeerId(2), runner);

        assert!(!is_alive(&server, runner));
        assert_eq!(server.ctf().carried_by(runner), None);
        let dropped = server.ctf().intel(Team::B).expect("intel").entity.position;
        assert_eq!(dropped.z, GROUND as f32);

        let packets = received(&server, PeerId(2));
        assert!(packets.iter().any(|p| matches!(
            p,
            Packet::IntelDrop(intel) if intel.player_id == runner && intel.position == dropped
        )));
        assert!(packets.iter().any(|p| matches!(
            p,
            Packet::KillAction(kill) if kill.player_id == runner
                && kill.killer_id == shooter
                && kill.kill_type == KillType::Headshot
        )));
        assert_eq!(server.hub().pool().get(shooter).map(|c| c.kills), Some(1));
    }

    /// Tests that the intel is dropped for the others when its holder leaves
    #[test]
    fn intel_dropped_on_disconnect() {
        let mut server = new_server(test_config());
        let runner = connect(&mut server, PeerId(1));
        connect(&mut server, PeerId(2));
        join(&mut server, PeerId(1), runner, Team::A, Tool::Gun, "runner");

        let intel = server.ctf().intel(Team::B).expect("intel").entity.position;
        send(
            &mut server,
            PeerId(1),
            &Packet::Position(Vec3::new(intel.x, intel.y, intel.z - 2.4)),
        );
        server.tick(DT);
        assert_eq!(server.ctf().carried_by(runner), Some(Team::B));
        server.transport_mut().take_sent();

        server.transport_mut().push_disconnect(PeerId(1));
        server.pump();

        assert_eq!(server.ctf().carried_by(runner), None);
        let ids = received_ids(&server, PeerId(2));
        let dropped = ids.iter().position(|id| *id == PacketId::IntelDrop);
        let left = ids.iter().position(|id| *id == PacketId::PlayerLeft);
        assert!(dropped.is_some());
        assert!(dropped < left);
    }

    /// Tests that a dead player stays down for the respawn time, then spawns
    #[test]
    fn respawn_after_countdown() {
        let mut server = new_server(ServerConfig {
            respawn_time: 2,
            ..test_config()
        });
        let victim = connect(&mut server, PeerId(1));
        let shooter = connect(&mut server, PeerId(2));
        join(&mut server, PeerId(1), victim, Team::A, Tool::Gun, "victim");
        join(&mut server, PeerId(2), shooter, Team::B, Tool::Gun, "shooter");

        headshot(&mut server, PeerId(2), victim);
        assert!(!is_alive(&server, victim));
        assert_eq!(server.hub().pool().get(victim).map(|c| c.respawn_timer), Some(2));
        server.transport_mut().take_sent();

        for _ in 0..59 {
            server.tick(DT);
        }
        assert!(!is_alive(&server, victim));

        let mut ticks = 59;
        while !is_alive(&server, victim) {
            server.tick(DT);
            ticks += 1;
            assert!(ticks <= 2 * 60 + 5, "still dead after {} ticks", ticks);
        }

        let spawned = received(&server, PeerId(2)).into_iter().find_map(|p| match p {
            Packet::CreatePlayer(create) => Some(create),
            _ => None,
        });
        let create = spawned.expect("CreatePlayer broadcast");
        assert_eq!(create.player_id, victim);
        assert!((64.0..128.0).contains(&create.position.x));
        assert_eq!(server.hub().pool().get(victim).map(|c| c.hp), Some(100));
    }

    /// Tests that a burnt-out fuse hurts nearby enemies and breaks the ground
    #[test]
    fn grenade_explosion() {
        let mut server = new_server(test_config());
        let thrower = connect(&mut server, PeerId(1));
        let target = connect(&mut server, PeerId(2));
        join(&mut server, PeerId(1), thrower, Team::A, Tool::Grenade, "thrower");
        join(&mut server, PeerId(2), target, Team::B, Tool::Gun, "target");
        server.transport_mut().take_sent();

        let victim = server.hub().pool().get(target).expect("target").body.position;
        let cell = IVec3::new(victim.x as i32, victim.y as i32, GROUND - 1);
        send(
            &mut server,
            PeerId(1),
            &Packet::Grenade(GrenadeThrown {
                player_id: thrower,
                fuse: 0.04,
                position: Vec3::new(victim.x, victim.y, GROUND as f32 - 0.5),
                velocity: Vec3::ZERO,
            }),
        );
        assert_eq!(server.grenades().len(), 1);
        assert_eq!(server.hub().pool().get(thrower).map(|c| c.grenades), Some(2));
        assert!(received_ids(&server, PeerId(2)).contains(&PacketId::Grenade));

        for _ in 0..5 {
            server.tick(DT);
        }
        assert!(server.grenades().is_empty());
        assert!(!is_alive(&server, target));
        assert!(!server.map().solid_at(cell.x, cell.y, GROUND));

        let packets = received(&server, PeerId(2));
        assert!(packets.iter().any(|p| matches!(
            p,
            Packet::KillAction(kill) if kill.player_id == target
                && kill.killer_id == thrower
                && kill.kill_type == KillType::Grenade
        )));
        assert!(packets.iter().any(|p| matches!(
            p,
            Packet::BlockAction(action) if action.action == BlockActionKind::GrenadeDestroy
                && action.position == cell
        )));
        assert!(is_alive(&server, thrower));
    }

    /// Tests that a long drop onto the ground hurts
    #[test]
    fn fall_damage_on_hard_landing() {
        let mut server = new_server(test_config());
        let id = connect(&mut server, PeerId(1));
        join(&mut server, PeerId(1), id, Team::A, Tool::Gun, "jumper");
        server.transport_mut().take_sent();

        let position = server.hub().pool().get(id).expect("player").body.position;
        send(
            &mut server,
            PeerId(1),
            &Packet::Position(Vec3::new(position.x, position.y, 5.0)),
        );
        tick_until(&mut server, |s| {
            s.hub().pool().get(id).is_some_and(|c| !c.alive || c.hp < 100)
        });

        let packets = received(&server, PeerId(1));
        let hurt = packets.iter().any(|p| match p {
            Packet::KillAction(kill) => kill.player_id == id && kill.kill_type == KillType::Fall,
            Packet::SetHp(hp) => hp.damage_type == DamageType::Fall,
            _ => false,
        });
        assert!(hurt);
    }

    /// Tests that a late joiner learns who is dead before its state snapshot
    #[test]
    fn joiner_sees_dead_players() {
        let mut server = new_server(ServerConfig {
            respawn_time: 30,
            ..test_config()
        });
        let victim = connect(&mut server, PeerId(1));
        let shooter = connect(&mut server, PeerId(2));
        join(&mut server, PeerId(1), victim, Team::A, Tool::Gun, "victim");
        join(&mut server, PeerId(2), shooter, Team::B, Tool::Gun, "shooter");
        headshot(&mut server, PeerId(2), victim);
        assert!(!is_alive(&server, victim));

        connect(&mut server, PeerId(3));

        let packets = received(&server, PeerId(3));
        let announced = packets.iter().position(|p| {
            matches!(p, Packet::ExistingPlayer(e) if e.player_id == victim)
        });
        let killed = packets.iter().position(|p| match p {
            Packet::KillAction(kill) => {
                kill.player_id == victim
                    && kill.killer_id == shooter
                    && kill.kill_type == KillType::Headshot
                    && kill.respawn_time > 0
            }
            _ => false,
        });
        assert!(announced.is_some());
        assert!(announced < killed);
        assert!(!packets
            .iter()
            .any(|p| matches!(p, Packet::KillAction(kill) if kill.player_id == shooter)));
        assert_eq!(packets.last().map(|p| p.id()), Some(PacketId::StateData));
    }

    /// Tests that team chat reaches teammates only
    #[test]
    fn team_chat_stays_in_team() {
        let mut server = new_server(test_config());
        let peers = [PeerId(1), PeerId(2), PeerId(3)];
        let teams = [Team::A, Team::A, Team::B];
        let mut ids = Vec::new();
        for peer in peers {
            ids.push(connect(&mut server, peer));
        }
        for ((peer, id), team) in peers.iter().zip(&ids).zip(teams) {
            join(&mut server, *peer, *id, team, Tool::Gun, "");
        }
        server.transport_mut().take_sent();

        send(
            &mut server,
            PeerId(1),
            &Packet::Chat(ChatMessage {
                player_id: ids[0],
                chat_type: ChatType::Team,
                message: "hold the bridge".into(),
            }),
        );

        assert!(received_ids(&server, PeerId(1)).contains(&PacketId::Chat));
        assert!(received_ids(&server, PeerId(2)).contains(&PacketId::Chat));
        assert!(!received_ids(&server, PeerId(3)).contains(&PacketId::Chat));
    }

    /// Tests that world updates are unreliable and only reach connected peers
    #[test]
    fn world_update_cadence() {
        let mut server = new_server(test_config());
        connect(&mut server, PeerId(1));
        server.transport_mut().take_sent();

        for _ in 0..60 {
            server.tick(DT);
        }
        let updates: Vec<_> = server
            .transport()
            .sent_to(PeerId(1))
            .filter(|p| p.data.first() == Some(&PacketId::WorldUpdate.to_byte()))
            .collect();
        // 100 ms period over one second
        assert!((9..=11).contains(&updates.len()));
        assert!(updates
            .iter()
            .all(|p| p.delivery == Delivery::Unreliable));
    }
}

/// UDP LOOPBACK TESTS
mod udp_tests {
    use super::*;
    use server::udp::{Frame, UdpTransport};
    use std::time::Duration;
    use tokio::net::UdpSocket;

    /// Tests a full connect, download and join over a real socket
    #[tokio::test]
    async fn loopback_connect_and_join() {
        let transport = UdpTransport::bind("127.0.0.1:0", Duration::from_secs(5))
            .await
            .expect("bind server");
        let server_addr = transport.local_addr().expect("server address");
        let mut server = Server::new(
            ServerConfig {
                map_chunks_per_tick: 8,
                ..test_config()
            },
            VoxelMap::flat(GROUND),
            transport,
        );

        let client = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
        let mut frame = Vec::new();
        Frame::Connect {
            version: PROTOCOL_VERSION,
        }
        .encode(&mut frame);
        client.send_to(&frame, server_addr).await.expect("send connect");

        let mut buf = vec![0u8; 16 * 1024];
        let mut player_id = None;
        let mut spawned = false;
        let mut chunks = 0;

        for _ in 0..MAX_TICKS {
            server.pump();
            server.tick(DT);

            while let Ok((len, _)) = client.try_recv_from(&mut buf) {
                let Some(Frame::Data(data)) = Frame::decode(&buf[..len]) else {
                    continue;
                };
                match Packet::decode(data, Origin::Server) {
                    Ok(Packet::MapChunk(_)) => chunks += 1,
                    Ok(Packet::StateData(state)) => {
                        player_id = Some(state.player_id);
                        let join = Packet::ExistingPlayer(ExistingPlayer {
                            player_id: state.player_id,
                            team: Team::B,
                            weapon: Weapon::Smg,
                            tool: Tool::Gun,
                            kills: 0,
                            color: Color::new(1, 2, 3),
                            name: PlayerName::from("looper"),
                        });
                        Frame::Data(&encode(&join)).encode(&mut frame);
                        client.send_to(&frame, server_addr).await.expect("send join");
                    }
                    Ok(Packet::CreatePlayer(create)) if Some(create.player_id) == player_id => {
                        assert_eq!(create.team, Team::B);
                        assert_eq!(create.weapon, Weapon::Smg);
                        spawned = true;
                    }
                    _ => {}
                }
            }
            if spawned {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert!(chunks > 0);
        assert_eq!(player_id, Some(0));
        assert!(spawned);
    }
}
