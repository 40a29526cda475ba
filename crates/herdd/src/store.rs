//! Durable document store for the registry.
//!
//! Three JSON documents under one data directory. Each save writes to a temp
//! file in the same directory and renames over the target, so a reader never
//! observes a partially written document. Missing files load as empty.

use herd_shared::error::HerdError;
use herd_shared::model::RegistrySnapshot;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

pub const USERS_FILE: &str = "users.json";
pub const ANIMALS_FILE: &str = "animals.json";
pub const MISSING_FILE: &str = "missing.json";

pub struct Store {
    dir: PathBuf,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load all three documents. Absent files yield empty collections.
    pub fn load(&self) -> Result<RegistrySnapshot, HerdError> {
        let snapshot = RegistrySnapshot {
            users: self.read_doc(USERS_FILE)?,
            animals: self.read_doc(ANIMALS_FILE)?,
            missing: self.read_doc(MISSING_FILE)?,
        };
        debug!(
            "Loaded registry: {} users, {} animals, {} missing",
            snapshot.users.len(),
            snapshot.animals.len(),
            snapshot.missing.len()
        );
        Ok(snapshot)
    }

    /// Persist all three documents atomically (per document).
    pub fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), HerdError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| HerdError::Persistence(format!("create {}: {}", self.dir.display(), e)))?;
        self.write_doc(USERS_FILE, &snapshot.users)?;
        self.write_doc(ANIMALS_FILE, &snapshot.animals)?;
        self.write_doc(MISSING_FILE, &snapshot.missing)?;
        Ok(())
    }

    fn read_doc<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, HerdError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let bytes = fs::read(&path)
            .map_err(|e| HerdError::Persistence(format!("read {}: {}", path.display(), e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HerdError::Persistence(format!("parse {}: {}", path.display(), e)))
    }

    fn write_doc<T: Serialize>(&self, name: &str, value: &T) -> Result<(), HerdError> {
        let path = self.dir.join(name);
        let temp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| HerdError::Persistence(format!("encode {}: {}", path.display(), e)))?;
        fs::write(&temp_path, bytes)
            .map_err(|e| HerdError::Persistence(format!("write {}: {}", temp_path.display(), e)))?;
        // Atomic replace
        fs::rename(&temp_path, &path)
            .map_err(|e| HerdError::Persistence(format!("rename {}: {}", path.display(), e)))
    }
}
