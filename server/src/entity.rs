use shared::{Team, Vec3};

/// Shared identity of everything placed in the world: players, intels and
/// bases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entity {
    pub id: u8,
    pub team: Team,
    pub position: Vec3,
}

impl Entity {
    pub fn new(id: u8, team: Team, position: Vec3) -> Self {
        Self { id, team, position }
    }

    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(&point)
    }
}

/// Where a team's intel currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntelState {
    AtBase,
    Held(u8),
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intel {
    pub entity: Entity,
    pub state: IntelState,
}

impl Intel {
    pub fn new(team: Team, position: Vec3) -> Self {
        Self {
            entity: Entity::new(team.index().unwrap_or_default() as u8, team, position),
            state: IntelState::AtBase,
        }
    }

    pub fn is_taken(&self) -> bool {
        matches!(self.state, IntelState::Held(_))
    }

    pub fn holder(&self) -> Option<u8> {
        match self.state {
            IntelState::Held(player) => Some(player),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Base {
    pub entity: Entity,
}

impl Base {
    /// Bases use object ids 2 and 3 after the two intels.
    pub fn new(team: Team, position: Vec3) -> Self {
        Self {
            entity: Entity::new(2 + team.index().unwrap_or_default() as u8, team, position),
        }
    }
}
