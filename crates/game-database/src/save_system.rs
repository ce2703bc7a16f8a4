//! Versioned JSON save snapshots.
//!
//! A save file is one exchangeable JSON document: seed, world structure,
//! entities, player, clock. Byte-exact compatibility across engine
//! versions is not promised; the version field gates loading.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use game_domain::{GameTime, PlayerState};

use crate::error::{DatabaseError, DatabaseResult};
use crate::memory::{MemoryStore, StoreSnapshot};

pub const SAVE_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSnapshot {
    pub version: u32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub game_time: GameTime,
    pub player: PlayerState,
    pub store: StoreSnapshot,
}

pub struct SaveSystem {
    directory: PathBuf,
}

impl SaveSystem {
    /// Saves under the platform data dir, `./saves` when none exists.
    pub fn new() -> Self {
        let directory = dirs::data_dir()
            .map(|d| d.join("undercroft").join("saves"))
            .unwrap_or_else(|| PathBuf::from("./saves"));
        Self { directory }
    }

    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        // Keep save names filesystem-safe without rejecting anything.
        let safe: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{safe}.json"))
    }

    /// Capture the current world into a named snapshot.
    pub fn capture(
        name: &str,
        store: &MemoryStore,
        player: &PlayerState,
        game_time: GameTime,
    ) -> SaveSnapshot {
        SaveSnapshot {
            version: SAVE_VERSION,
            name: name.to_string(),
            created_at: Utc::now(),
            game_time,
            player: player.clone(),
            store: store.snapshot(),
        }
    }

    pub fn save(&self, snapshot: &SaveSnapshot) -> DatabaseResult<PathBuf> {
        fs::create_dir_all(&self.directory)?;
        let path = self.path_for(&snapshot.name);
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json)?;
        tracing::info!(save = %snapshot.name, path = %path.display(), "wrote save snapshot");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> DatabaseResult<SaveSnapshot> {
        let path = self.path_for(name);
        if !path.exists() {
            return Err(DatabaseError::NotFound(format!("save '{name}'")));
        }
        let json = fs::read_to_string(&path)?;
        let snapshot: SaveSnapshot = serde_json::from_str(&json)?;
        if snapshot.version != SAVE_VERSION {
            return Err(DatabaseError::InvalidArgument(format!(
                "save '{name}' has version {}, engine expects {SAVE_VERSION}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Restore a snapshot into the store and hand back player and clock.
    pub fn restore(snapshot: SaveSnapshot, store: &MemoryStore) -> (PlayerState, GameTime) {
        store.restore(snapshot.store);
        (snapshot.player, snapshot.game_time)
    }

    pub fn list(&self) -> DatabaseResult<Vec<String>> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl Default for SaveSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_domain::{
        ChunkLevel, EdgeKey, EntityId, SpaceId, WorldChunk, WorldSeed,
        Direction,
    };
    use crate::traits::{WorldChunkRepository, WorldSeedRepository};

    fn temp_save_dir() -> PathBuf {
        std::env::temp_dir().join(format!("undercroft-saves-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn save_then_load_preserves_player_and_world() {
        let store = MemoryStore::new();
        let chunk = WorldChunk::new(ChunkLevel::Subzone, None);
        WorldChunkRepository::save(&store, &chunk).await.unwrap();
        let starting_space = SpaceId::new();
        WorldSeedRepository::save(
            &store,
            &WorldSeed {
                starting_space_id: starting_space,
                root_chunk_id: chunk.id,
                rng_seed: 42,
            },
        )
        .await
        .unwrap();

        let mut player = PlayerState::fresh(EntityId::new(), "Maro", starting_space);
        player.inventory.gold = 137;
        player
            .revealed_exits
            .insert(EdgeKey::new(starting_space, &Direction::North));

        let system = SaveSystem::with_directory(temp_save_dir());
        let snapshot = SaveSystem::capture("slot one", &store, &player, 900);
        system.save(&snapshot).unwrap();

        let restored_store = MemoryStore::new();
        let loaded = system.load("slot one").unwrap();
        let (restored_player, game_time) = SaveSystem::restore(loaded, &restored_store);

        assert_eq!(restored_player.name, player.name);
        assert_eq!(restored_player.gold(), 137);
        assert_eq!(restored_player.current_room_id, starting_space);
        assert_eq!(restored_player.revealed_exits, player.revealed_exits);
        assert_eq!(game_time, 900);
        let seed = WorldSeedRepository::get(&restored_store).await.unwrap().unwrap();
        assert_eq!(seed.root_chunk_id, chunk.id);

        std::fs::remove_dir_all(system.directory()).ok();
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let store = MemoryStore::new();
        let player = PlayerState::fresh(EntityId::new(), "Maro", SpaceId::new());
        let system = SaveSystem::with_directory(temp_save_dir());
        let mut snapshot = SaveSystem::capture("old", &store, &player, 0);
        snapshot.version = 1;
        system.save(&snapshot).unwrap();

        assert!(matches!(
            system.load("old"),
            Err(DatabaseError::InvalidArgument(_))
        ));

        std::fs::remove_dir_all(system.directory()).ok();
    }
}
