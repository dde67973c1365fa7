//! Server core: connection lifecycle, the fixed tick and the async run loop.
//!
//! All game state lives in [`Server`] and is only touched from the task that
//! drives it. Each iteration drains every pending transport event, then runs
//! the tick work: map transfer, movement, grenades, objectives, respawns and
//! the periodic world update.

use crate::combat::{grenade_damage, LiveGrenade};
use crate::config::ServerConfig;
use crate::connection::ConnectionState;
use crate::error::ServerError;
use crate::game::{CaptureStateMachine, Spawner};
use crate::map_transfer::MapTransfer;
use crate::replication::ReplicationHub;
use crate::transport::{PeerId, Transport, TransportEvent};
use crate::udp::UdpTransport;
use log::{debug, error, info, warn};
use shared::packets::{
    team_name_bytes, BlockAction, IntelCapture, IntelDrop, KillAction, SetHp, StateData,
};
use shared::physics::Landing;
use shared::types::{BlockActionKind, DamageType, DisconnectReason, KillType};
use shared::{Origin, Packet, Team, Vec3, VoxelMap, PROTOCOL_VERSION};
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};

/// Longest step fed to the simulation after a stall.
const MAX_STEP: f32 = 0.1;

/// Authoritative game server generic over the transport.
pub struct Server<T: Transport> {
    pub(crate) config: ServerConfig,
    pub(crate) map: VoxelMap,
    pub(crate) hub: ReplicationHub<T>,
    pub(crate) transfer: MapTransfer,
    pub(crate) ctf: CaptureStateMachine,
    pub(crate) spawner: Spawner,
    pub(crate) grenades: Vec<LiveGrenade>,
    second_timer: f32,
    world_update_timer: f32,
    ticks: u64,
}

impl<T: Transport> Server<T> {
    pub fn new(config: ServerConfig, map: VoxelMap, transport: T) -> Self {
        let mut spawner = Spawner::new(config.seed);
        let mut ctf = CaptureStateMachine::new(
            config.capture_limit,
            config.pickup_radius,
            config.capture_radius,
        );
        ctf.reset(&map, &mut spawner);

        Self {
            hub: ReplicationHub::new(transport, config.max_players),
            transfer: MapTransfer::new(config.map_chunk_size, config.map_chunks_per_tick),
            config,
            map,
            ctf,
            spawner,
            grenades: Vec::new(),
            second_timer: 0.0,
            world_update_timer: 0.0,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn map(&self) -> &VoxelMap {
        &self.map
    }

    pub fn hub(&self) -> &ReplicationHub<T> {
        &self.hub
    }

    pub fn transport(&self) -> &T {
        self.hub.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.hub.transport_mut()
    }

    pub fn ctf(&self) -> &CaptureStateMachine {
        &self.ctf
    }

    pub fn transfer(&self) -> &MapTransfer {
        &self.transfer
    }

    pub fn grenades(&self) -> &[LiveGrenade] {
        &self.grenades
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Handles every event the transport has queued.
    pub fn pump(&mut self) {
        while let Some(event) = self.hub.poll() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connect { peer, version } => self.handle_connect(peer, version),
            TransportEvent::Receive { peer, data } => {
                let Some(player_id) = self.hub.pool().by_peer(peer) else {
                    debug!("Data from unknown {}", peer);
                    return;
                };
                match Packet::decode(&data, Origin::Client) {
                    Ok(packet) => {
                        let kind = packet.id();
                        if let Err(e) = self.handle_packet(player_id, packet) {
                            warn!("Dropped {:?} from player {}: {}", kind, player_id, e);
                        }
                    }
                    Err(e) => warn!("Malformed packet from player {}: {}", player_id, e),
                }
            }
            TransportEvent::Disconnect { peer } => self.handle_disconnect(peer),
        }
    }

    /// Version check first, then repeats from a known peer, then capacity.
    /// A refused peer never gets a slot.
    pub fn handle_connect(&mut self, peer: PeerId, version: u32) {
        if version != PROTOCOL_VERSION {
            warn!(
                "Refusing {}: protocol version {} (expected {})",
                peer, version, PROTOCOL_VERSION
            );
            self.hub.refuse(peer, DisconnectReason::WrongVersion);
            return;
        }
        if let Some(player_id) = self.hub.pool().by_peer(peer) {
            warn!("Ignoring repeated connect from {} (player {})", peer, player_id);
            return;
        }
        if self.hub.pool().is_full() {
            warn!("Refusing {}: server full", peer);
            self.hub.refuse(peer, DisconnectReason::ServerFull);
            return;
        }
        if let Some(player_id) = self.hub.pool_mut().allocate(peer) {
            info!("{} connecting as player {}", peer, player_id);
        }
    }

    /// Releases map ownership, drops any carried intel, tells everyone the
    /// player left and resets the slot, in that order.
    pub fn handle_disconnect(&mut self, peer: PeerId) {
        let Some(player_id) = self.hub.pool().by_peer(peer) else {
            return;
        };
        self.transfer.release(player_id);

        let (position, was_connected, name) = match self.hub.pool().get(player_id) {
            Some(conn) => (conn.body.position, conn.is_connected(), conn.name),
            None => return,
        };
        self.drop_carried_intel(player_id, position, Some(player_id));
        self.grenades.retain(|g| g.owner != player_id);

        if was_connected {
            self.hub
                .broadcast(&Packet::PlayerLeft { player_id }, Some(player_id));
        }
        self.hub.pool_mut().release(player_id);
        info!("Player {} ({}) left", player_id, name);
    }

    /// Runs one simulation step of `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        self.ticks += 1;
        self.service_map_transfer();
        self.update_players(dt);
        self.update_grenades(dt);
        self.update_objectives();

        self.second_timer += dt;
        while self.second_timer >= 1.0 {
            self.second_timer -= 1.0;
            self.update_respawns();
        }

        self.world_update_timer += dt;
        let period = self.config.world_update_interval().as_secs_f32();
        if self.world_update_timer >= period {
            self.world_update_timer = (self.world_update_timer - period).min(period);
            self.hub.broadcast_world_update();
        }
    }

    fn service_map_transfer(&mut self) {
        match self.transfer.service(&mut self.map, &mut self.hub) {
            Ok(Some(player_id)) => self.finish_transfer(player_id),
            Ok(None) => {}
            Err(e) => error!("Map transfer failed: {}", e),
        }
    }

    /// Sends the world snapshot to a player whose map download finished and
    /// lets broadcasts reach them from now on.
    fn finish_transfer(&mut self, player_id: u8) {
        let others: Vec<_> = self
            .hub
            .pool()
            .connected()
            .filter(|c| c.joined && c.id != player_id)
            .map(|c| (c.existing_player(), c.alive, c.last_kill))
            .collect();
        for (existing, alive, last_kill) in others {
            self.hub.send(player_id, &Packet::ExistingPlayer(existing));
            if !alive {
                let (killer_id, kill_type) =
                    last_kill.unwrap_or((existing.player_id, KillType::Weapon));
                let respawn_time = self
                    .hub
                    .pool()
                    .get(existing.player_id)
                    .map_or(0, |c| c.respawn_timer);
                self.hub.send(
                    player_id,
                    &Packet::KillAction(KillAction {
                        player_id: existing.player_id,
                        killer_id,
                        kill_type,
                        respawn_time,
                    }),
                );
            }
        }

        let state = StateData {
            player_id,
            fog_color: self.config.fog_color,
            team_colors: self.config.team_colors,
            team_names: [
                team_name_bytes(&self.config.team_names[0]),
                team_name_bytes(&self.config.team_names[1]),
            ],
            ctf: self.ctf.ctf_state(),
        };
        self.hub.send(player_id, &Packet::StateData(state));

        if let Some(conn) = self.hub.pool_mut().get_mut(player_id) {
            conn.state = ConnectionState::Connected;
        }
        info!("Player {} is connected", player_id);
    }

    fn update_players(&mut self, dt: f32) {
        let mut falls = Vec::new();
        for conn in self.hub.pool_mut().iter_mut() {
            if !conn.is_active() {
                continue;
            }
            if let Landing::Hard(damage) = conn.body.move_player(&self.map, dt) {
                falls.push((conn.id, damage, conn.body.position));
            }
        }
        for (player_id, damage, position) in falls {
            debug!("Player {} took {} fall damage", player_id, damage);
            let damage = damage.clamp(0, u8::MAX as i32) as u8;
            self.damage_player(
                player_id,
                player_id,
                damage,
                DamageType::Fall,
                KillType::Fall,
                position,
            );
        }
    }

    fn update_grenades(&mut self, dt: f32) {
        let mut exploded = Vec::new();
        self.grenades.retain_mut(|grenade| {
            if grenade.update(&self.map, dt) {
                exploded.push(*grenade);
                false
            } else {
                true
            }
        });
        for grenade in exploded {
            self.explode(grenade);
        }
    }

    /// Damages every player caught in the blast who can see it, then clears
    /// the blocks around it.
    fn explode(&mut self, grenade: LiveGrenade) {
        let center = grenade.position();
        let owner_team = self
            .hub
            .pool()
            .get(grenade.owner)
            .map_or(Team::Spectator, |c| c.team);

        let victims: Vec<(u8, u8)> = self
            .hub
            .pool()
            .iter()
            .filter(|c| c.is_active())
            .filter(|c| c.id == grenade.owner || c.team != owner_team)
            .filter_map(|c| {
                let damage = grenade_damage(center.distance(&c.body.position));
                (damage > 0 && self.map.can_see(center, c.body.position)).then_some((c.id, damage))
            })
            .collect();
        for (victim, damage) in victims {
            self.damage_player(
                victim,
                grenade.owner,
                damage,
                DamageType::Weapon,
                KillType::Grenade,
                center,
            );
        }

        let cell = center.floor();
        if self.map.destroy_grenade(cell.x, cell.y, cell.z) > 0 {
            self.hub.broadcast(
                &Packet::BlockAction(BlockAction {
                    player_id: grenade.owner,
                    action: BlockActionKind::GrenadeDestroy,
                    position: cell,
                }),
                None,
            );
        }
    }

    fn update_objectives(&mut self) {
        let players: Vec<_> = self
            .hub
            .pool()
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.entity())
            .collect();

        for player in players {
            let at_base = self
                .ctf
                .base(player.team)
                .is_some_and(|b| {
                    b.entity.distance_to(player.position) <= self.config.capture_radius
                });
            if at_base {
                let restocked = self
                    .hub
                    .pool_mut()
                    .get_mut(player.id)
                    .is_some_and(|c| c.restock());
                if restocked {
                    self.hub.send(player.id, &Packet::Restock { player_id: player.id });
                }
            }

            if self.ctf.try_pickup(&player).is_some() {
                self.hub
                    .broadcast(&Packet::IntelPickup { player_id: player.id }, None);
            }

            if let Some(capture) = self.ctf.try_capture(&player, &self.map, &mut self.spawner) {
                self.hub.broadcast(
                    &Packet::IntelCapture(IntelCapture {
                        player_id: player.id,
                        winning: capture.winning,
                    }),
                    None,
                );
                if let Some(moved) = self.ctf.intel_move(capture.intel_team) {
                    self.hub.broadcast(&Packet::MoveObject(moved), None);
                }
                if let Some(conn) = self.hub.pool_mut().get_mut(player.id) {
                    conn.kills += 10;
                }
            }
        }
    }

    fn update_respawns(&mut self) {
        let mut due = Vec::new();
        for conn in self.hub.pool_mut().iter_mut() {
            if !conn.is_connected() || !conn.joined || conn.alive || !conn.team.is_playing() {
                continue;
            }
            conn.respawn_timer = conn.respawn_timer.saturating_sub(1);
            if conn.respawn_timer == 0 {
                due.push(conn.id);
            }
        }
        for player_id in due {
            self.respawn(player_id);
        }
    }

    /// Places a player at a fresh spawn point and announces them.
    pub(crate) fn respawn(&mut self, player_id: u8) {
        let Some(team) = self.hub.pool().get(player_id).map(|c| c.team) else {
            return;
        };
        let position = self.spawner.player_point(&self.map, team);
        let create = match self.hub.pool_mut().get_mut(player_id) {
            Some(conn) => {
                conn.spawn(position);
                conn.create_player()
            }
            None => return,
        };
        self.hub.broadcast(&Packet::CreatePlayer(create), None);
        debug!("Player {} spawned at {:?}", player_id, position);
    }

    /// Applies damage, killing the victim when health runs out.
    pub(crate) fn damage_player(
        &mut self,
        victim: u8,
        attacker: u8,
        amount: u8,
        damage_type: DamageType,
        kill_type: KillType,
        source: Vec3,
    ) {
        let hp = match self.hub.pool_mut().get_mut(victim) {
            Some(conn) if conn.alive => {
                conn.hp = conn.hp.saturating_sub(amount);
                conn.hp
            }
            _ => return,
        };
        if hp == 0 {
            self.kill_player(victim, attacker, kill_type);
        } else {
            self.hub.send(
                victim,
                &Packet::SetHp(SetHp {
                    hp,
                    damage_type,
                    source,
                }),
            );
        }
    }

    pub(crate) fn kill_player(&mut self, victim: u8, killer: u8, kill_type: KillType) {
        let respawn_time = self.config.respawn_time;
        let position = match self.hub.pool_mut().get_mut(victim) {
            Some(conn) if conn.alive => {
                conn.alive = false;
                conn.hp = 0;
                conn.respawn_timer = respawn_time;
                conn.last_kill = Some((killer, kill_type));
                conn.body.position
            }
            _ => return,
        };
        self.drop_carried_intel(victim, position, None);

        if killer != victim {
            if let Some(conn) = self.hub.pool_mut().get_mut(killer) {
                conn.kills += 1;
            }
        }
        self.hub.broadcast(
            &Packet::KillAction(KillAction {
                player_id: victim,
                killer_id: killer,
                kill_type,
                respawn_time,
            }),
            None,
        );
        info!("Player {} killed by {} ({:?})", victim, killer, kill_type);
    }

    fn drop_carried_intel(&mut self, player_id: u8, position: Vec3, exclude: Option<u8>) {
        if let Some((_, landing)) =
            self.ctf
                .drop_intel(player_id, position, &self.map, &mut self.spawner)
        {
            self.hub.broadcast(
                &Packet::IntelDrop(IntelDrop {
                    player_id,
                    position: landing,
                }),
                exclude,
            );
        }
    }
}

impl Server<UdpTransport> {
    /// Main server loop: socket readiness, fixed ticks and Ctrl-C.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let mut ticker = interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut last_tick = Instant::now();
        let report_every = u64::from(self.config.tick_rate) * 10;

        info!("Server started successfully");

        loop {
            tokio::select! {
                ready = self.hub.transport().readable() => {
                    if let Err(e) = ready {
                        error!("Socket error: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    self.pump();
                },

                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32().min(MAX_STEP);
                    last_tick = now;

                    self.pump();
                    self.tick(dt);

                    if self.ticks % report_every == 0 {
                        let players = self.hub.pool().len();
                        if players > 0 {
                            debug!("Tick {}: {} players, {} peers, {:.1}Hz",
                                   self.ticks, players, self.hub.transport().peer_count(), 1.0 / dt.max(f32::EPSILON));
                        }
                    }
                },

                result = &mut shutdown => {
                    if let Err(e) = result {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
