//! Authoritative registry of users, animals and the missing set.
//!
//! All state lives behind one RwLock. Every mutation clones the current
//! snapshot, applies the change to the clone, persists the clone, and only
//! then commits it, so a failed save leaves memory at the last durable
//! snapshot and a concurrent reader never observes a half-applied change.

use std::collections::BTreeSet;
use std::sync::Arc;

use herd_shared::error::HerdError;
use herd_shared::model::{
    dedup_preserving_order, AnimalId, AnimalRecord, PhotoRef, RegistrySnapshot, UserId,
    UserRecord,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::store::Store;

#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<RegistrySnapshot>>,
    store: Arc<Store>,
}

impl Registry {
    /// Load the registry from its store.
    pub fn open(store: Store) -> Result<Self, HerdError> {
        let snapshot = store.load()?;
        info!(
            "Registry opened: {} users, {} animals, {} missing",
            snapshot.users.len(),
            snapshot.animals.len(),
            snapshot.missing.len()
        );
        Ok(Self {
            inner: Arc::new(RwLock::new(snapshot)),
            store: Arc::new(store),
        })
    }

    /// Create or refresh a user. Idempotent on identical calls.
    pub async fn upsert_user(&self, id: &UserId, name: &str) -> Result<(), HerdError> {
        {
            let data = self.inner.read().await;
            if data.users.get(id).map_or(false, |u| u.name == name) {
                return Ok(());
            }
        }
        self.commit(|data| {
            data.users
                .entry(id.clone())
                .and_modify(|u| u.name = name.to_string())
                .or_insert_with(|| UserRecord {
                    name: name.to_string(),
                    animals: Vec::new(),
                });
            Ok(())
        })
        .await
    }

    /// Enroll an animal under the given owner. The animal id is the
    /// identifier model's predicted class, so a second enrollment that lands
    /// on the same class overwrites the existing record (the displaced owner
    /// loses the id from their list). Appending to the owner's list is
    /// set-like: repeated enrollment of the same id keeps a single entry.
    pub async fn enroll(
        &self,
        user: &UserId,
        animal_id: &AnimalId,
        name: &str,
        photo: &PhotoRef,
    ) -> Result<(), HerdError> {
        self.commit(|data| {
            let record = AnimalRecord {
                name: name.to_string(),
                owner: user.clone(),
                photo: photo.clone(),
            };
            if let Some(prev) = data.animals.insert(animal_id.clone(), record) {
                warn!(
                    "Enrollment for class {} displaced {} (owner {})",
                    animal_id, prev.name, prev.owner
                );
                if prev.owner != *user {
                    if let Some(old_owner) = data.users.get_mut(&prev.owner) {
                        old_owner.animals.retain(|a| a != animal_id);
                    }
                }
            }
            let owner = data.users.entry(user.clone()).or_default();
            if !owner.animals.contains(animal_id) {
                owner.animals.push(animal_id.clone());
            }
            Ok(())
        })
        .await
    }

    /// Animals owned by the user, deduplicated. If duplicates had accumulated
    /// in storage the compacted list is persisted back.
    pub async fn list(&self, user: &UserId) -> Result<Vec<(AnimalId, AnimalRecord)>, HerdError> {
        {
            let data = self.inner.read().await;
            let Some(record) = data.users.get(user) else {
                return Ok(Vec::new());
            };
            let deduped = dedup_preserving_order(&record.animals);
            if deduped.len() == record.animals.len() {
                return Ok(collect_animals(&data, &deduped));
            }
        }
        // Self-healing compaction: rewrite the owner's list without duplicates.
        self.commit(|data| {
            let ids = match data.users.get_mut(user) {
                Some(record) => {
                    record.animals = dedup_preserving_order(&record.animals);
                    record.animals.clone()
                }
                None => return Ok(Vec::new()),
            };
            Ok(collect_animals(data, &ids))
        })
        .await
    }

    /// Delete an animal. Fails with an ownership error unless the id is in
    /// the caller's owned set. Also clears the id from the missing set so no
    /// dangling missing entry survives the animal.
    pub async fn remove(&self, user: &UserId, animal_id: &AnimalId) -> Result<(), HerdError> {
        self.commit(|data| {
            match data.users.get_mut(user) {
                Some(record) if record.animals.contains(animal_id) => {
                    record.animals.retain(|a| a != animal_id);
                }
                _ => {
                    return Err(HerdError::Ownership {
                        user: user.clone(),
                        animal: animal_id.clone(),
                    })
                }
            }
            data.animals.remove(animal_id);
            data.missing.remove(animal_id);
            Ok(())
        })
        .await
    }

    /// Flag an animal as missing and return its record for broadcasting.
    /// Set membership is idempotent; an explicit re-trigger returns the
    /// record again so the caller may re-broadcast.
    pub async fn mark_missing(
        &self,
        user: &UserId,
        animal_id: &AnimalId,
    ) -> Result<AnimalRecord, HerdError> {
        self.commit(|data| {
            let owns = data
                .users
                .get(user)
                .map_or(false, |r| r.animals.contains(animal_id));
            if !owns {
                return Err(HerdError::Ownership {
                    user: user.clone(),
                    animal: animal_id.clone(),
                });
            }
            let animal = data.animals.get(animal_id).cloned().ok_or_else(|| {
                HerdError::Persistence(format!("animal {} has no record", animal_id))
            })?;
            if !data.missing.insert(animal_id.clone()) {
                info!("Animal {} was already flagged missing", animal_id);
            }
            Ok(animal)
        })
        .await
    }

    pub async fn animal(&self, id: &AnimalId) -> Option<AnimalRecord> {
        self.inner.read().await.animals.get(id).cloned()
    }

    pub async fn user_name(&self, id: &UserId) -> Option<String> {
        self.inner.read().await.users.get(id).map(|u| u.name.clone())
    }

    /// All known users; the recipient set for a missing alert.
    pub async fn user_ids(&self) -> Vec<UserId> {
        self.inner.read().await.users.keys().cloned().collect()
    }

    pub async fn missing_ids(&self) -> BTreeSet<AnimalId> {
        self.inner.read().await.missing.clone()
    }

    /// Copy-mutate-persist-commit. On a save failure the in-memory snapshot
    /// is untouched.
    async fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut RegistrySnapshot) -> Result<T, HerdError>,
    ) -> Result<T, HerdError> {
        let mut guard = self.inner.write().await;
        let mut next = guard.clone();
        let out = mutate(&mut next)?;
        self.store.save(&next)?;
        *guard = next;
        Ok(out)
    }
}

fn collect_animals(
    data: &RegistrySnapshot,
    ids: &[AnimalId],
) -> Vec<(AnimalId, AnimalRecord)> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match data.animals.get(id) {
            Some(animal) => out.push((id.clone(), animal.clone())),
            None => warn!("Animal {} is listed but has no record", id),
        }
    }
    out
}
