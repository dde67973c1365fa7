//! Capture-the-flag rules: spawn selection, intel pickup, drop and capture.
//!
//! The state machine only decides; the caller turns the returned events into
//! broadcasts.

use crate::entity::{Base, Entity, Intel, IntelState};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::packets::{CtfState, IntelLocation, MoveObject};
use shared::{Team, Vec3, VoxelMap, MAP_X, MAP_Y, MAP_Z};
use std::ops::Range;

/// Eye height above the block a player stands on.
const PLAYER_SPAWN_HEIGHT: f32 = 2.4;
const RELOCATE_ATTEMPTS: usize = 16;

fn spawn_area(team: Team) -> (Range<i32>, Range<i32>) {
    match team {
        Team::A => (64..128, 128..384),
        Team::B => (384..448, 128..384),
        Team::Spectator => (192..320, 192..320),
    }
}

/// Seedable source of spawn locations.
#[derive(Debug)]
pub struct Spawner {
    rng: StdRng,
}

impl Spawner {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Random column in the team's area, on top of its highest block.
    pub fn ground_point(&mut self, map: &VoxelMap, team: Team) -> Vec3 {
        let (xs, ys) = spawn_area(team);
        let x = self.rng.gen_range(xs);
        let y = self.rng.gen_range(ys);
        let z = map.find_top_block(x, y).unwrap_or(MAP_Z - 2);
        Vec3::new(x as f32 + 0.5, y as f32 + 0.5, z as f32)
    }

    pub fn player_point(&mut self, map: &VoxelMap, team: Team) -> Vec3 {
        let ground = self.ground_point(map, team);
        Vec3::new(ground.x, ground.y, ground.z - PLAYER_SPAWN_HEIGHT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capture {
    /// Team whose intel was carried home
    pub intel_team: Team,
    pub scores: [u8; 2],
    pub winning: bool,
    /// Where the intel was put back
    pub relocated: Vec3,
}

#[derive(Debug)]
pub struct CaptureStateMachine {
    intels: [Intel; 2],
    bases: [Base; 2],
    scores: [u8; 2],
    capture_limit: u8,
    pickup_radius: f32,
    capture_radius: f32,
}

impl CaptureStateMachine {
    pub fn new(capture_limit: u8, pickup_radius: f32, capture_radius: f32) -> Self {
        Self {
            intels: [
                Intel::new(Team::A, Vec3::ZERO),
                Intel::new(Team::B, Vec3::ZERO),
            ],
            bases: [Base::new(Team::A, Vec3::ZERO), Base::new(Team::B, Vec3::ZERO)],
            scores: [0; 2],
            capture_limit,
            pickup_radius,
            capture_radius,
        }
    }

    /// Zeroes scores and places every intel and base at a fresh spawn point.
    pub fn reset(&mut self, map: &VoxelMap, spawner: &mut Spawner) {
        self.scores = [0; 2];
        for team in [Team::A, Team::B] {
            let base = spawner.ground_point(map, team);
            self.bases[Self::slot(team)] = Base::new(team, base);
            let intel = self.fresh_spawn(team, map, spawner);
            self.intels[Self::slot(team)] = Intel::new(team, intel);
        }
        info!(
            "Intels at {:?} / {:?}, bases at {:?} / {:?}",
            self.intels[0].entity.position,
            self.intels[1].entity.position,
            self.bases[0].entity.position,
            self.bases[1].entity.position
        );
    }

    fn slot(team: Team) -> usize {
        team.index().unwrap_or_default()
    }

    fn fresh_spawn(&self, team: Team, map: &VoxelMap, spawner: &mut Spawner) -> Vec3 {
        let base = self.bases[Self::slot(team)].entity.position;
        let mut point = spawner.ground_point(map, team);
        for _ in 0..RELOCATE_ATTEMPTS {
            if point != base {
                break;
            }
            point = spawner.ground_point(map, team);
        }
        point
    }

    pub fn intel(&self, team: Team) -> Option<&Intel> {
        team.index().map(|i| &self.intels[i])
    }

    pub fn base(&self, team: Team) -> Option<&Base> {
        team.index().map(|i| &self.bases[i])
    }

    pub fn scores(&self) -> [u8; 2] {
        self.scores
    }

    pub fn capture_limit(&self) -> u8 {
        self.capture_limit
    }

    /// Team of the intel `player_id` carries, if any
    pub fn carried_by(&self, player_id: u8) -> Option<Team> {
        self.intels
            .iter()
            .find(|intel| intel.holder() == Some(player_id))
            .map(|intel| intel.entity.team)
    }

    /// Lets a living player grab the enemy intel when standing close to it.
    /// Returns the team of the intel picked up.
    pub fn try_pickup(&mut self, player: &Entity) -> Option<Team> {
        let enemy = player.team.other()?;
        if self.carried_by(player.id).is_some() {
            return None;
        }
        let intel = &mut self.intels[Self::slot(enemy)];
        if intel.is_taken() || player.distance_to(intel.entity.position) > self.pickup_radius {
            return None;
        }
        intel.state = IntelState::Held(player.id);
        info!("Player {} picked up the {:?} intel", player.id, enemy);
        Some(enemy)
    }

    /// Releases whatever `player_id` carries where they last stood, or at a
    /// random spawn when that spot is outside the world.
    pub fn drop_intel(
        &mut self,
        player_id: u8,
        position: Vec3,
        map: &VoxelMap,
        spawner: &mut Spawner,
    ) -> Option<(Team, Vec3)> {
        let team = self.carried_by(player_id)?;
        let landing = match Self::ground_below(position, map) {
            Some(point) => point,
            None => self.fresh_spawn(team, map, spawner),
        };
        let intel = &mut self.intels[Self::slot(team)];
        intel.state = IntelState::Dropped;
        intel.entity.position = landing;
        info!("Player {} dropped the {:?} intel at {:?}", player_id, team, landing);
        Some((team, landing))
    }

    fn ground_below(position: Vec3, map: &VoxelMap) -> Option<Vec3> {
        if !position.is_finite() {
            return None;
        }
        let cell = position.floor();
        if cell.x < 0 || cell.x >= MAP_X || cell.y < 0 || cell.y >= MAP_Y || cell.z >= MAP_Z {
            return None;
        }
        let z = (cell.z.max(0)..MAP_Z)
            .find(|z| map.solid_at(cell.x, cell.y, *z))
            .unwrap_or(MAP_Z - 1);
        Some(Vec3::new(position.x, position.y, z as f32))
    }

    /// Scores when the holder brings the enemy intel within reach of their
    /// own base. The intel goes back to a fresh spawn point.
    pub fn try_capture(
        &mut self,
        player: &Entity,
        map: &VoxelMap,
        spawner: &mut Spawner,
    ) -> Option<Capture> {
        let own = player.team.index()?;
        let intel_team = self.carried_by(player.id)?;
        if player.distance_to(self.bases[own].entity.position) > self.capture_radius {
            return None;
        }

        self.scores[own] = self.scores[own].saturating_add(1);
        let scores = self.scores;
        let winning = scores[own] >= self.capture_limit;

        let relocated = self.fresh_spawn(intel_team, map, spawner);
        let intel = &mut self.intels[Self::slot(intel_team)];
        intel.state = IntelState::AtBase;
        intel.entity.position = relocated;
        info!(
            "Player {} captured the {:?} intel, score {}-{}",
            player.id, intel_team, scores[0], scores[1]
        );

        if winning {
            debug!("{:?} reached the capture limit", player.team);
            self.scores = [0; 2];
        }
        Some(Capture {
            intel_team,
            scores,
            winning,
            relocated,
        })
    }

    pub fn intel_move(&self, team: Team) -> Option<MoveObject> {
        let intel = self.intel(team)?;
        Some(MoveObject {
            object_id: intel.entity.id,
            team,
            position: intel.entity.position,
        })
    }

    /// Snapshot for the state-data packet.
    pub fn ctf_state(&self) -> CtfState {
        let location = |intel: &Intel| match intel.holder() {
            Some(holder) => IntelLocation::Held(holder),
            None => IntelLocation::Ground(intel.entity.position),
        };
        CtfState {
            scores: self.scores,
            capture_limit: self.capture_limit,
            intels: [location(&self.intels[0]), location(&self.intels[1])],
            bases: [self.bases[0].entity.position, self.bases[1].entity.position],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (CaptureStateMachine, VoxelMap, Spawner) {
        let map = VoxelMap::flat(40);
        let mut spawner = Spawner::new(Some(42));
        let mut ctf = CaptureStateMachine::new(2, 3.0, 3.0);
        ctf.reset(&map, &mut spawner);
        (ctf, map, spawner)
    }

    fn player(id: u8, team: Team, position: Vec3) -> Entity {
        Entity::new(id, team, position)
    }

    #[test]
    fn test_spawn_points_inside_team_area() {
        let map = VoxelMap::flat(40);
        let mut spawner = Spawner::new(Some(1));
        for _ in 0..50 {
            let a = spawner.ground_point(&map, Team::A);
            assert!((64.0..128.0).contains(&a.x));
            assert!((128.0..384.0).contains(&a.y));
            assert_eq!(a.z, 40.0);

            let b = spawner.player_point(&map, Team::B);
            assert!((384.0..448.0).contains(&b.x));
            assert!((b.z - 37.6).abs() < 1e-5);
        }
    }

    #[test]
    fn test_seeded_spawner_is_deterministic() {
        let map = VoxelMap::flat(40);
        let mut first = Spawner::new(Some(9));
        let mut second = Spawner::new(Some(9));
        for _ in 0..10 {
            assert_eq!(first.ground_point(&map, Team::A), second.ground_point(&map, Team::A));
        }
    }

    #[test]
    fn test_pickup_requires_enemy_within_radius() {
        let (mut ctf, _, _) = setup();
        let intel_b = ctf.intel(Team::B).unwrap().entity.position;

        // Own intel cannot be picked up
        let intel_a = ctf.intel(Team::A).unwrap().entity.position;
        assert_eq!(ctf.try_pickup(&player(0, Team::A, intel_a)), None);
        // Spectators never pick up
        assert_eq!(ctf.try_pickup(&player(1, Team::Spectator, intel_b)), None);
        // Too far away
        let far = Vec3::new(intel_b.x + 3.5, intel_b.y, intel_b.z);
        assert_eq!(ctf.try_pickup(&player(0, Team::A, far)), None);

        let near = Vec3::new(intel_b.x + 2.0, intel_b.y, intel_b.z - 1.0);
        assert_eq!(ctf.try_pickup(&player(0, Team::A, near)), Some(Team::B));
        assert_eq!(ctf.intel(Team::B).unwrap().holder(), Some(0));
        assert_eq!(ctf.carried_by(0), Some(Team::B));

        // Already taken
        assert_eq!(ctf.try_pickup(&player(2, Team::A, intel_b)), None);
    }

    #[test]
    fn test_capture_only_at_own_base() {
        let (mut ctf, map, mut spawner) = setup();
        let intel_b = ctf.intel(Team::B).unwrap().entity.position;
        let base_a = ctf.base(Team::A).unwrap().entity.position;
        let base_b = ctf.base(Team::B).unwrap().entity.position;
        ctf.try_pickup(&player(0, Team::A, intel_b)).unwrap();

        assert_eq!(ctf.try_capture(&player(0, Team::A, base_b), &map, &mut spawner), None);
        let far = Vec3::new(base_a.x, base_a.y + 10.0, base_a.z);
        assert_eq!(ctf.try_capture(&player(0, Team::A, far), &map, &mut spawner), None);
        // Not carrying anything
        assert_eq!(ctf.try_capture(&player(1, Team::A, base_a), &map, &mut spawner), None);

        let capture = ctf
            .try_capture(&player(0, Team::A, base_a), &map, &mut spawner)
            .unwrap();
        assert_eq!(capture.intel_team, Team::B);
        assert_eq!(capture.scores, [1, 0]);
        assert!(!capture.winning);

        let intel = ctf.intel(Team::B).unwrap();
        assert!(!intel.is_taken());
        assert_eq!(intel.entity.position, capture.relocated);
        assert_ne!(intel.entity.position, base_b);
        assert!((384.0..448.0).contains(&intel.entity.position.x));
        assert_eq!(ctf.scores(), [1, 0]);
    }

    #[test]
    fn test_capture_limit_wins_and_resets_scores() {
        let (mut ctf, map, mut spawner) = setup();
        let base_a = ctf.base(Team::A).unwrap().entity.position;
        for round in 1..=2 {
            let intel_b = ctf.intel(Team::B).unwrap().entity.position;
            ctf.try_pickup(&player(0, Team::A, intel_b)).unwrap();
            let capture = ctf
                .try_capture(&player(0, Team::A, base_a), &map, &mut spawner)
                .unwrap();
            assert_eq!(capture.scores[0], round);
            assert_eq!(capture.winning, round == 2);
        }
        assert_eq!(ctf.scores(), [0, 0]);
    }

    #[test]
    fn test_drop_lands_on_ground() {
        let (mut ctf, map, mut spawner) = setup();
        let intel_a = ctf.intel(Team::A).unwrap().entity.position;
        ctf.try_pickup(&player(5, Team::B, intel_a)).unwrap();

        let (team, landing) = ctf
            .drop_intel(5, Vec3::new(250.5, 250.5, 20.0), &map, &mut spawner)
            .unwrap();
        assert_eq!(team, Team::A);
        assert_eq!(landing, Vec3::new(250.5, 250.5, 40.0));
        let intel = ctf.intel(Team::A).unwrap();
        assert_eq!(intel.state, IntelState::Dropped);
        assert!(!intel.is_taken());

        assert_eq!(ctf.drop_intel(5, Vec3::ZERO, &map, &mut spawner), None);
    }

    #[test]
    fn test_drop_outside_world_respawns() {
        let (mut ctf, map, mut spawner) = setup();
        let intel_a = ctf.intel(Team::A).unwrap().entity.position;
        ctf.try_pickup(&player(5, Team::B, intel_a)).unwrap();

        let (_, landing) = ctf
            .drop_intel(5, Vec3::new(-20.0, 600.0, 10.0), &map, &mut spawner)
            .unwrap();
        assert!((64.0..128.0).contains(&landing.x));
        assert_eq!(landing.z, 40.0);
    }

    #[test]
    fn test_ctf_snapshot_reports_holder() {
        let (mut ctf, _, _) = setup();
        let intel_b = ctf.intel(Team::B).unwrap().entity.position;
        ctf.try_pickup(&player(3, Team::A, intel_b)).unwrap();
        let state = ctf.ctf_state();
        assert_eq!(state.capture_limit, 2);
        assert_eq!(state.intels[1], IntelLocation::Held(3));
        assert!(matches!(state.intels[0], IntelLocation::Ground(_)));
        assert_eq!(state.bases[0], ctf.base(Team::A).unwrap().entity.position);

        let moved = ctf.intel_move(Team::B).unwrap();
        assert_eq!(moved.object_id, 1);
    }
}
