use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::Mutex;

use std::collections::HashMap;

use crate::models::game::{Game, GameError};

pub const ROOM_CODE_LEN: usize = 6;

/// In-memory registry of running games, keyed by opaque room code.
///
/// One lock guards the whole map, so every mutation of a given game is
/// serialized in arrival order; the engine itself never has to deal with
/// concurrent callers.
pub struct RoomService {
    rooms: Mutex<HashMap<String, Game>>,
}

impl RoomService {
    pub fn new() -> Self {
        RoomService {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a fresh game under a new room code and returns the code.
    pub async fn create_room(&self) -> String {
        let mut rooms = self.rooms.lock().await;
        let mut code = generate_code();
        while rooms.contains_key(&code) {
            code = generate_code();
        }
        rooms.insert(code.clone(), Game::new(code.clone()));
        log::info!("Room created: {}", code);
        code
    }

    /// Runs `f` against the game registered under `code` while holding the
    /// registry lock.
    pub async fn with_game<T>(
        &self,
        code: &str,
        f: impl FnOnce(&mut Game) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let mut rooms = self.rooms.lock().await;
        let game = rooms.get_mut(code).ok_or(GameError::RoomNotFound)?;
        f(game)
    }

    /// Drops the room once its last player is gone. Returns whether the room
    /// was deleted.
    pub async fn delete_if_empty(&self, code: &str) -> bool {
        let mut rooms = self.rooms.lock().await;
        let empty = rooms.get(code).map_or(false, |game| game.players.is_empty());
        if empty {
            rooms.remove(code);
            log::info!("Room deleted: {} ({} still active)", code, rooms.len());
        }
        empty
    }
}

fn generate_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_CODE_LEN)
        .map(|byte| (byte as char).to_ascii_uppercase())
        .collect()
}
