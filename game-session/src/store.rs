use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use game_types::GameId;
use tracing::warn;

/// Remembers which display name was used per session, so a dropped peer
/// can rejoin under the same identity.
pub trait NameStore: Send + Sync {
    fn remember(&self, game_id: &GameId, name: &str);
    fn recall(&self, game_id: &GameId) -> Option<String>;
    fn forget(&self, game_id: &GameId);
}

#[derive(Default)]
pub struct MemoryNameStore {
    names: Mutex<HashMap<GameId, String>>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NameStore for MemoryNameStore {
    fn remember(&self, game_id: &GameId, name: &str) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(game_id.clone(), name.to_string());
    }

    fn recall(&self, game_id: &GameId) -> Option<String> {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(game_id)
            .cloned()
    }

    fn forget(&self, game_id: &GameId) {
        self.names
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(game_id);
    }
}

/// JSON file of game id -> name mappings, surviving process restarts.
/// Storage failures are logged and treated as an absent record; losing
/// the record only costs the reconnect shortcut.
pub struct FileNameStore {
    path: PathBuf,
}

impl FileNameStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> HashMap<GameId, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn save(&self, names: &HashMap<GameId, String>) {
        let json = match serde_json::to_string_pretty(names) {
            Ok(json) => json,
            Err(err) => {
                warn!("failed to encode name records: {err}");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), "failed to write name records: {err}");
        }
    }
}

impl NameStore for FileNameStore {
    fn remember(&self, game_id: &GameId, name: &str) {
        let mut names = self.load();
        names.insert(game_id.clone(), name.to_string());
        self.save(&names);
    }

    fn recall(&self, game_id: &GameId) -> Option<String> {
        self.load().get(game_id).cloned()
    }

    fn forget(&self, game_id: &GameId) {
        let mut names = self.load();
        if names.remove(game_id).is_some() {
            self.save(&names);
        }
    }
}
