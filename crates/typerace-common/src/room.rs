use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Room lifecycle as the server reports it. The client derives its own
/// countdown sub-state locally from `game_started_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameState {
    Waiting,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: Uuid,
    pub nickname: String,
    /// Longest verified-correct prefix into the room text. Monotonic
    /// non-decreasing within a round.
    pub current_position: usize,
    pub wpm: u16,
    /// Percentage in [0, 100].
    pub accuracy: f64,
    pub is_finished: bool,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Player {
    pub fn new(id: Uuid, nickname: String, joined_at: DateTime<Utc>) -> Self {
        Self {
            id,
            nickname,
            current_position: 0,
            wpm: 0,
            accuracy: 100.0,
            is_finished: false,
            joined_at,
            finished_at: None,
            session_id: None,
        }
    }
}

/// Server-side room snapshot. `text` is identical and fixed for every player
/// during a round; only a restart replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    /// Human-entry code used to join.
    pub code: String,
    pub game_state: GameState,
    pub text: String,
    pub players: Vec<Player>,
    pub max_players: u8,
    /// Owning player; authorizes start and restart.
    pub created_by: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn is_owner(&self, id: Uuid) -> bool {
        self.created_by == id
    }
}
