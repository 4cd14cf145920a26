//! Session bootstrap: resolve who we are in which room, persist the identity
//! so a reload rejoins as the same player, and fetch the initial snapshot.

use std::collections::HashMap;
use std::path::PathBuf;

use uuid::Uuid;

use typerace_common::error::RaceError;
use typerace_common::room::Room;

use crate::api::RoomApi;

/// Keyed-value persistence for session identity. Injected so tests can fake
/// it and so nothing reaches for ambient global storage.
pub trait SessionStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn clear(&mut self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn clear(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// JSON-file-backed store. Load and save are best-effort: a missing or
/// unreadable file is an empty store, failed writes are logged and ignored.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl FileStore {
    pub fn open(path: PathBuf) -> Self {
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        Self { path, values }
    }

    fn persist(&self) {
        let contents = match serde_json::to_string_pretty(&self.values) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!("failed to encode session store: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(&self.path, contents) {
            tracing::warn!(path = %self.path.display(), "failed to save session store: {}", e);
        }
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
        self.persist();
    }

    fn clear(&mut self, key: &str) {
        self.values.remove(key);
        self.persist();
    }
}

/// How the user enters a room.
#[derive(Debug, Clone)]
pub enum RoomEntry {
    Create { text: Option<String> },
    Join { code: String },
}

/// Resolved identity plus the initial snapshot the state machine starts from.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub player_id: Uuid,
    pub nickname: String,
    pub room: Room,
}

fn player_key(code: &str) -> String {
    format!("player:{code}")
}

/// Create or join a room and resolve the local player identity. A stored
/// identity is reused only while the roster still knows it; otherwise we join
/// fresh and overwrite it. Any fetch failure here is fatal to the session.
pub async fn establish<A: RoomApi, S: SessionStore>(
    api: &A,
    store: &mut S,
    nickname: &str,
    entry: RoomEntry,
) -> Result<SessionContext, RaceError> {
    match entry {
        RoomEntry::Create { text } => {
            let room = api.create_room(nickname, text).await?;
            let player_id = room.created_by;
            store.set(&player_key(&room.code), &player_id.to_string());
            Ok(SessionContext {
                player_id,
                nickname: nickname.to_string(),
                room,
            })
        }
        RoomEntry::Join { code } => {
            let room = api.room_by_code(&code).await?;

            let stored = store
                .get(&player_key(&room.code))
                .and_then(|raw| raw.parse::<Uuid>().ok())
                .filter(|id| room.player(*id).is_some());
            if let Some(player_id) = stored {
                return Ok(SessionContext {
                    player_id,
                    nickname: nickname.to_string(),
                    room,
                });
            }

            store.clear(&player_key(&room.code));
            let player = api.join_room(nickname, &code).await?;
            store.set(&player_key(&room.code), &player.id.to_string());
            // refetch so the snapshot we hand the state machine includes us
            let room = api.room_by_code(&code).await?;
            Ok(SessionContext {
                player_id: player.id,
                nickname: nickname.to_string(),
                room,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::cell::RefCell;
    use typerace_common::room::{GameState, Player};

    struct FakeApi {
        room: RefCell<Room>,
    }

    impl FakeApi {
        fn new() -> Self {
            let owner = Uuid::new_v4();
            Self {
                room: RefCell::new(Room {
                    id: Uuid::new_v4(),
                    code: "ABCD".into(),
                    game_state: GameState::Waiting,
                    text: "some words".into(),
                    players: vec![Player::new(owner, "owner".into(), Utc::now())],
                    max_players: 4,
                    created_by: owner,
                    game_started_at: None,
                    created_at: Utc::now(),
                }),
            }
        }
    }

    impl RoomApi for FakeApi {
        async fn create_room(
            &self,
            nickname: &str,
            text: Option<String>,
        ) -> Result<Room, RaceError> {
            let mut room = self.room.borrow_mut();
            let creator = Uuid::new_v4();
            room.players = vec![Player::new(creator, nickname.into(), Utc::now())];
            room.created_by = creator;
            if let Some(text) = text {
                room.text = text;
            }
            Ok(room.clone())
        }

        async fn join_room(&self, nickname: &str, code: &str) -> Result<Player, RaceError> {
            let mut room = self.room.borrow_mut();
            if room.code != code {
                return Err(RaceError::Backend("room not found".into()));
            }
            let player = Player::new(Uuid::new_v4(), nickname.into(), Utc::now());
            room.players.push(player.clone());
            Ok(player)
        }

        async fn room_by_code(&self, code: &str) -> Result<Room, RaceError> {
            let room = self.room.borrow();
            if room.code != code {
                return Err(RaceError::FetchFailed("room not found".into()));
            }
            Ok(room.clone())
        }

        async fn start_game(&self, room_id: Uuid) -> Result<Room, RaceError> {
            let mut room = self.room.borrow_mut();
            if room.id != room_id {
                return Err(RaceError::Backend("room not found".into()));
            }
            room.game_state = GameState::InProgress;
            room.game_started_at = Some(Utc::now());
            Ok(room.clone())
        }
    }

    #[tokio::test]
    async fn test_create_stores_identity() {
        let api = FakeApi::new();
        let mut store = MemoryStore::default();
        let ctx = establish(&api, &mut store, "alice", RoomEntry::Create { text: None })
            .await
            .unwrap();
        assert_eq!(ctx.room.created_by, ctx.player_id);
        assert_eq!(
            store.get(&player_key(&ctx.room.code)),
            Some(ctx.player_id.to_string())
        );
    }

    #[tokio::test]
    async fn test_join_registers_and_refetches_roster() {
        let api = FakeApi::new();
        let mut store = MemoryStore::default();
        let ctx = establish(
            &api,
            &mut store,
            "bob",
            RoomEntry::Join { code: "ABCD".into() },
        )
        .await
        .unwrap();
        assert!(ctx.room.player(ctx.player_id).is_some());
        assert_eq!(ctx.room.players.len(), 2);
    }

    #[tokio::test]
    async fn test_join_reuses_stored_identity_still_in_roster() {
        let api = FakeApi::new();
        let mut store = MemoryStore::default();
        let first = establish(
            &api,
            &mut store,
            "bob",
            RoomEntry::Join { code: "ABCD".into() },
        )
        .await
        .unwrap();

        // a reload joins as the same player instead of creating a new one
        let second = establish(
            &api,
            &mut store,
            "bob",
            RoomEntry::Join { code: "ABCD".into() },
        )
        .await
        .unwrap();
        assert_eq!(second.player_id, first.player_id);
        assert_eq!(second.room.players.len(), 2);
    }

    #[tokio::test]
    async fn test_join_discards_identity_gone_from_roster() {
        let api = FakeApi::new();
        let mut store = MemoryStore::default();
        store.set(&player_key("ABCD"), &Uuid::new_v4().to_string());

        let ctx = establish(
            &api,
            &mut store,
            "bob",
            RoomEntry::Join { code: "ABCD".into() },
        )
        .await
        .unwrap();
        assert!(ctx.room.player(ctx.player_id).is_some());
        assert_eq!(
            store.get(&player_key("ABCD")),
            Some(ctx.player_id.to_string())
        );
    }

    #[tokio::test]
    async fn test_join_unknown_room_is_fatal() {
        let api = FakeApi::new();
        let mut store = MemoryStore::default();
        let result = establish(
            &api,
            &mut store,
            "bob",
            RoomEntry::Join { code: "NOPE".into() },
        )
        .await;
        assert!(matches!(result, Err(RaceError::FetchFailed(_))));
    }

    #[tokio::test]
    async fn test_start_game_via_api() {
        let api = FakeApi::new();
        let room_id = api.room.borrow().id;
        let room = api.start_game(room_id).await.unwrap();
        assert_eq!(room.game_state, GameState::InProgress);
        assert!(room.game_started_at.is_some());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::default();
        assert_eq!(store.get("k"), None);
        store.set("k", "v");
        assert_eq!(store.get("k"), Some("v".into()));
        store.clear("k");
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("typerace-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json");

        let mut store = FileStore::open(path.clone());
        store.set("player:ABCD", "some-id");
        drop(store);

        let store = FileStore::open(path);
        assert_eq!(store.get("player:ABCD"), Some("some-id".into()));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let store = FileStore::open(PathBuf::from("/nonexistent/typerace/session.json"));
        assert_eq!(store.get("anything"), None);
    }
}
