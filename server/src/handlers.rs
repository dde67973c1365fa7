//! Per-packet handling for client traffic.
//!
//! Every handler either applies the packet and replicates its effect, or
//! returns a [`Rejection`] that the caller logs before dropping the packet.

use crate::combat::{kill_type_for, validate_hit, HitRejected, LiveGrenade};
use crate::connection::Connection;
use crate::network::Server;
use crate::transport::Transport;
use log::info;
use shared::map::in_bounds;
use shared::math::cube_line;
use shared::packets::{
    BlockAction, BlockLine, ChangeTeam, ChangeWeapon, ChatMessage, ExistingPlayer,
    GrenadeThrown, Hit, InputData, PacketId, SetColor, SetTool, WeaponInput, WeaponReload,
};
use shared::types::{BlockActionKind, ChatType, DamageType, KillType};
use shared::{IVec3, Packet, PlayerName, Team, Tool, Vec3, VoxelMap, PLAYER_BLOCKS};
use thiserror::Error;

/// Furthest a player may reach to place or dig a block.
pub const BUILD_REACH: f32 = 6.0;
/// Longest block line accepted in one packet.
pub const MAX_LINE_CELLS: usize = 64;
const DEFAULT_NAME: &str = "Deuce";

/// Why a client packet was dropped.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("player is not in play")]
    NotInPlay,
    #[error("player has not joined yet")]
    NotJoined,
    #[error("player already joined")]
    AlreadyJoined,
    #[error("unknown player {0}")]
    UnknownPlayer(u8),
    #[error("holding {0:?}")]
    WrongTool(Tool),
    #[error("not enough blocks ({have} < {need})")]
    NoBlocks { have: u8, need: usize },
    #[error("no grenades left")]
    NoGrenades,
    #[error("cell {0:?} out of reach")]
    OutOfReach(IVec3),
    #[error("cell {0:?} cannot be changed")]
    Immutable(IVec3),
    #[error("non-finite vector")]
    NonFinite,
    #[error("cell {0:?} is outside the map")]
    OutOfMap(IVec3),
    #[error("line longer than {} cells", MAX_LINE_CELLS)]
    LineTooLong,
    #[error("{0:?} is not accepted from clients")]
    Unexpected(PacketId),
    #[error(transparent)]
    Hit(#[from] HitRejected),
}

fn within_reach(conn: &Connection, cell: IVec3) -> bool {
    conn.body.position.distance(&cell.center()) <= BUILD_REACH
}

impl<T: Transport> Server<T> {
    fn player(&self, player_id: u8) -> Result<&Connection, Rejection> {
        self.hub
            .pool()
            .get(player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))
    }

    fn player_mut(&mut self, player_id: u8) -> Result<&mut Connection, Rejection> {
        self.hub
            .pool_mut()
            .get_mut(player_id)
            .ok_or(Rejection::UnknownPlayer(player_id))
    }

    /// Alive, joined and on a playing team.
    fn active_player(&mut self, player_id: u8) -> Result<&mut Connection, Rejection> {
        let conn = self.player_mut(player_id)?;
        if !conn.is_active() {
            return Err(Rejection::NotInPlay);
        }
        Ok(conn)
    }

    fn joined_player(&mut self, player_id: u8) -> Result<&mut Connection, Rejection> {
        let conn = self.player_mut(player_id)?;
        if !conn.is_connected() || !conn.joined {
            return Err(Rejection::NotJoined);
        }
        Ok(conn)
    }

    /// Dispatches one decoded packet from `player_id`. Ids inside payloads
    /// are ignored in favour of the sender's slot.
    pub fn handle_packet(&mut self, player_id: u8, packet: Packet<'_>) -> Result<(), Rejection> {
        match packet {
            Packet::Position(position) => self.handle_position(player_id, position),
            Packet::Orientation(orientation) => {
                self.joined_player(player_id)?
                    .body
                    .set_orientation(orientation);
                Ok(())
            }
            Packet::Input(input) => self.handle_input(player_id, input),
            Packet::WeaponInput(input) => self.handle_weapon_input(player_id, input),
            Packet::Hit(hit) => self.handle_hit(player_id, hit),
            Packet::Grenade(grenade) => self.handle_grenade(player_id, grenade),
            Packet::SetTool(tool) => self.handle_set_tool(player_id, tool),
            Packet::SetColor(color) => self.handle_set_color(player_id, color),
            Packet::ExistingPlayer(existing) => self.handle_join(player_id, existing),
            Packet::BlockAction(action) => self.handle_block_action(player_id, action),
            Packet::BlockLine(line) => self.handle_block_line(player_id, line),
            Packet::Chat(chat) => self.handle_chat(player_id, chat),
            Packet::WeaponReload(_) => self.handle_reload(player_id),
            Packet::ChangeTeam(change) => self.handle_change_team(player_id, change),
            Packet::ChangeWeapon(change) => self.handle_change_weapon(player_id, change),
            other => Err(Rejection::Unexpected(other.id())),
        }
    }

    /// Accepts the client's position when it stays close to the simulated
    /// one; otherwise the authoritative position is sent back.
    fn handle_position(&mut self, player_id: u8, position: Vec3) -> Result<(), Rejection> {
        if !position.is_finite() {
            return Err(Rejection::NonFinite);
        }
        let tolerance = self.config.position_tolerance;
        let conn = self.active_player(player_id)?;
        if conn.body.position.distance(&position) <= tolerance {
            conn.body.position = position;
            return Ok(());
        }
        let authoritative = conn.body.position;
        self.hub.send(player_id, &Packet::Position(authoritative));
        Ok(())
    }

    fn handle_input(&mut self, player_id: u8, input: InputData) -> Result<(), Rejection> {
        let conn = self
            .hub
            .pool_mut()
            .get_mut(player_id)
            .filter(|c| c.is_active())
            .ok_or(Rejection::NotInPlay)?;
        conn.body.apply_input(input.keys, &self.map);
        self.hub.broadcast(
            &Packet::Input(InputData {
                player_id,
                keys: input.keys,
            }),
            Some(player_id),
        );
        Ok(())
    }

    /// Tracks fire buttons; each new press of primary fire spends a round.
    fn handle_weapon_input(&mut self, player_id: u8, input: WeaponInput) -> Result<(), Rejection> {
        let conn = self.active_player(player_id)?;
        let pressed = input.buttons.primary() && !conn.weapon_flags.primary();
        if pressed && conn.tool() == Tool::Gun && conn.clip > 0 {
            conn.clip -= 1;
        }
        conn.weapon_flags = input.buttons;
        conn.body.secondary_fire = input.buttons.secondary();
        self.hub.broadcast(
            &Packet::WeaponInput(WeaponInput {
                player_id,
                buttons: input.buttons,
            }),
            Some(player_id),
        );
        Ok(())
    }

    fn handle_hit(&mut self, player_id: u8, hit: Hit) -> Result<(), Rejection> {
        let attacker = self.player(player_id)?;
        let target = self.player(hit.target)?;
        let damage = validate_hit(attacker, target, hit.hit_type)?;
        let source = attacker.body.position;
        self.damage_player(
            hit.target,
            player_id,
            damage,
            DamageType::Weapon,
            kill_type_for(hit.hit_type),
            source,
        );
        Ok(())
    }

    fn handle_grenade(&mut self, player_id: u8, grenade: GrenadeThrown) -> Result<(), Rejection> {
        if !grenade.position.is_finite()
            || !grenade.velocity.is_finite()
            || !grenade.fuse.is_finite()
        {
            return Err(Rejection::NonFinite);
        }
        let conn = self.active_player(player_id)?;
        if conn.tool() != Tool::Grenade {
            return Err(Rejection::WrongTool(conn.tool()));
        }
        if conn.grenades == 0 {
            return Err(Rejection::NoGrenades);
        }
        conn.grenades -= 1;

        let live = LiveGrenade::new(player_id, grenade.position, grenade.velocity, grenade.fuse);
        self.grenades.push(live);
        self.hub.broadcast(
            &Packet::Grenade(GrenadeThrown {
                player_id,
                fuse: live.fuse,
                ..grenade
            }),
            Some(player_id),
        );
        Ok(())
    }

    fn handle_set_tool(&mut self, player_id: u8, tool: SetTool) -> Result<(), Rejection> {
        self.active_player(player_id)?.body.tool = tool.tool;
        self.hub.broadcast(
            &Packet::SetTool(SetTool {
                player_id,
                tool: tool.tool,
            }),
            Some(player_id),
        );
        Ok(())
    }

    fn handle_set_color(&mut self, player_id: u8, color: SetColor) -> Result<(), Rejection> {
        self.joined_player(player_id)?.color = color.color;
        self.hub.broadcast(
            &Packet::SetColor(SetColor {
                player_id,
                color: color.color,
            }),
            Some(player_id),
        );
        Ok(())
    }

    /// Picks a free variant of `name`: the name itself, else the name with
    /// the lowest numeric suffix nobody uses.
    fn unique_name(&self, player_id: u8, name: PlayerName) -> PlayerName {
        let pool = self.hub.pool();
        if !pool.name_taken(&name, player_id) {
            return name;
        }
        for suffix in 1u32.. {
            let tail = suffix.to_string();
            let keep = name.as_str().len().min(15usize.saturating_sub(tail.len()));
            let candidate =
                PlayerName::from(format!("{}{}", &name.as_str()[..keep], tail).as_str());
            if !pool.name_taken(&candidate, player_id) {
                return candidate;
            }
        }
        name
    }

    /// A Connected client announcing itself: name, team, weapon and color.
    /// Spectators are announced but never spawned.
    fn handle_join(&mut self, player_id: u8, existing: ExistingPlayer) -> Result<(), Rejection> {
        let conn = self.player(player_id)?;
        if !conn.is_connected() {
            return Err(Rejection::NotJoined);
        }
        if conn.joined {
            return Err(Rejection::AlreadyJoined);
        }

        let requested = if existing.name.is_empty() {
            PlayerName::from(DEFAULT_NAME)
        } else {
            existing.name
        };
        let name = self.unique_name(player_id, requested);

        let conn = self.player_mut(player_id)?;
        conn.joined = true;
        conn.name = name;
        conn.team = existing.team;
        conn.weapon = existing.weapon;
        conn.color = existing.color;
        conn.body.tool = existing.tool;
        let announce = conn.existing_player();
        info!("Player {} joined as {} on {:?}", player_id, name, existing.team);

        if existing.team.is_playing() {
            self.respawn(player_id);
        } else {
            self.hub.broadcast(&Packet::ExistingPlayer(announce), None);
        }
        Ok(())
    }

    fn handle_block_action(&mut self, player_id: u8, action: BlockAction) -> Result<(), Rejection> {
        let cell = action.position;
        let conn = self
            .hub
            .pool_mut()
            .get_mut(player_id)
            .filter(|c| c.is_active())
            .ok_or(Rejection::NotInPlay)?;
        let tool = conn.tool();

        match action.action {
            BlockActionKind::Build => {
                if tool != Tool::Block {
                    return Err(Rejection::WrongTool(tool));
                }
                if conn.blocks == 0 {
                    return Err(Rejection::NoBlocks { have: 0, need: 1 });
                }
                if !within_reach(conn, cell) {
                    return Err(Rejection::OutOfReach(cell));
                }
                if self.map.solid_at(cell.x, cell.y, cell.z)
                    || !self.map.modify_block(cell.x, cell.y, cell.z, true, conn.color.to_u32())
                {
                    return Err(Rejection::Immutable(cell));
                }
                conn.blocks -= 1;
            }
            BlockActionKind::Destroy => {
                match tool {
                    Tool::Gun => {}
                    Tool::Spade if within_reach(conn, cell) => {}
                    Tool::Spade => return Err(Rejection::OutOfReach(cell)),
                    other => return Err(Rejection::WrongTool(other)),
                }
                if !VoxelMap::is_breakable(cell.x, cell.y, cell.z)
                    || !self.map.destroy_block(cell.x, cell.y, cell.z)
                {
                    return Err(Rejection::Immutable(cell));
                }
                if tool == Tool::Spade {
                    conn.blocks = (conn.blocks + 1).min(PLAYER_BLOCKS);
                }
            }
            BlockActionKind::SpadeDestroy => {
                if tool != Tool::Spade {
                    return Err(Rejection::WrongTool(tool));
                }
                if !within_reach(conn, cell) {
                    return Err(Rejection::OutOfReach(cell));
                }
                if self.map.destroy_block_secondary(cell.x, cell.y, cell.z) == 0 {
                    return Err(Rejection::Immutable(cell));
                }
            }
            BlockActionKind::GrenadeDestroy => {
                return Err(Rejection::Unexpected(PacketId::BlockAction))
            }
        }

        self.hub.broadcast(
            &Packet::BlockAction(BlockAction {
                player_id,
                action: action.action,
                position: cell,
            }),
            None,
        );
        Ok(())
    }

    /// Builds every empty cell on the line between two cells.
    fn handle_block_line(&mut self, player_id: u8, line: BlockLine) -> Result<(), Rejection> {
        let conn = self
            .hub
            .pool_mut()
            .get_mut(player_id)
            .filter(|c| c.is_active())
            .ok_or(Rejection::NotInPlay)?;
        if conn.tool() != Tool::Block {
            return Err(Rejection::WrongTool(conn.tool()));
        }
        for end in [line.start, line.end] {
            if !in_bounds(end.x, end.y, end.z) {
                return Err(Rejection::OutOfMap(end));
            }
            if !within_reach(conn, end) {
                return Err(Rejection::OutOfReach(end));
            }
        }
        let cells =
            cube_line(line.start, line.end, MAX_LINE_CELLS).ok_or(Rejection::LineTooLong)?;

        let targets: Vec<IVec3> = cells
            .into_iter()
            .filter(|c| !self.map.solid_at(c.x, c.y, c.z) && VoxelMap::is_breakable(c.x, c.y, c.z))
            .collect();
        if targets.len() > conn.blocks as usize {
            return Err(Rejection::NoBlocks {
                have: conn.blocks,
                need: targets.len(),
            });
        }
        let color = conn.color.to_u32();
        for cell in &targets {
            self.map.modify_block(cell.x, cell.y, cell.z, true, color);
        }
        conn.blocks -= targets.len() as u8;

        self.hub.broadcast(
            &Packet::BlockLine(BlockLine {
                player_id,
                start: line.start,
                end: line.end,
            }),
            None,
        );
        Ok(())
    }

    fn handle_chat(&mut self, player_id: u8, chat: ChatMessage<'_>) -> Result<(), Rejection> {
        let conn = self.joined_player(player_id)?;
        let (name, team) = (conn.name, conn.team);
        let chat_type = chat.chat_type;
        if chat_type == ChatType::System {
            return Err(Rejection::Unexpected(PacketId::Chat));
        }
        info!("<{}> ({:?}) {}", name, chat_type, chat.message);

        let packet = Packet::Chat(ChatMessage {
            player_id,
            chat_type,
            message: chat.message,
        });
        match chat_type {
            ChatType::Team => self.hub.broadcast_team(team, &packet, None),
            _ => self.hub.broadcast(&packet, None),
        }
        Ok(())
    }

    fn handle_reload(&mut self, player_id: u8) -> Result<(), Rejection> {
        let conn = self.active_player(player_id)?;
        conn.reload();
        let reload = WeaponReload {
            player_id,
            clip: conn.clip,
            reserve: conn.reserve,
        };
        self.hub.broadcast(&Packet::WeaponReload(reload), None);
        Ok(())
    }

    /// Living players die on the way to a new team and respawn after the
    /// usual timer.
    fn handle_change_team(&mut self, player_id: u8, change: ChangeTeam) -> Result<(), Rejection> {
        let conn = self.joined_player(player_id)?;
        if conn.team == change.team {
            return Ok(());
        }
        let was_alive = conn.alive;
        if was_alive {
            self.kill_player(player_id, player_id, KillType::TeamChange);
        }

        let respawn_time = self.config.respawn_time;
        let conn = self.player_mut(player_id)?;
        conn.team = change.team;
        if !was_alive {
            conn.respawn_timer = respawn_time;
        }
        self.hub.broadcast(
            &Packet::ChangeTeam(ChangeTeam {
                player_id,
                team: change.team,
            }),
            None,
        );
        Ok(())
    }

    fn handle_change_weapon(
        &mut self,
        player_id: u8,
        change: ChangeWeapon,
    ) -> Result<(), Rejection> {
        let conn = self.joined_player(player_id)?;
        if conn.weapon == change.weapon {
            return Ok(());
        }
        let (alive, team) = (conn.alive, conn.team);
        conn.weapon = change.weapon;
        if alive && team != Team::Spectator {
            self.kill_player(player_id, player_id, KillType::ClassChange);
        }
        self.hub.broadcast(
            &Packet::ChangeWeapon(ChangeWeapon {
                player_id,
                weapon: change.weapon,
            }),
            None,
        );
        Ok(())
    }
}
