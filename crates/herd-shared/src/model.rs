//! Core data model: users, animals, and the persisted registry documents.
//!
//! Animal identity is the domain classifier's predicted class index,
//! stringified. Two physically distinct animals that the model maps to the
//! same class therefore share an id; the registry resolves that collision by
//! overwriting (see Registry::enroll).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Opaque user identity issued by the transport. For direct chats the chat id
/// equals the user id.
pub type UserId = String;

/// Animal identity: the identifier model's arg-max class, as a string.
pub type AnimalId = String;

/// Transport file handle that can be used to resend a photo without holding
/// the raw bytes.
pub type PhotoRef = String;

/// A registered community member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    /// Owned animal ids, in enrollment order. Deduplicated before persistence.
    #[serde(default)]
    pub animals: Vec<AnimalId>,
}

/// An enrolled animal. Name and owner are immutable after enrollment; the
/// record is destroyed when its owner removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalRecord {
    pub name: String,
    pub owner: UserId,
    pub photo: PhotoRef,
}

/// In-memory image of the three persisted documents.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub users: HashMap<UserId, UserRecord>,
    pub animals: HashMap<AnimalId, AnimalRecord>,
    pub missing: BTreeSet<AnimalId>,
}

/// Drop repeated ids, keeping the first occurrence of each.
pub fn dedup_preserving_order(ids: &[AnimalId]) -> Vec<AnimalId> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.insert(id.clone()) {
            out.push(id.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first_occurrence_order() {
        let ids = vec![
            "3".to_string(),
            "1".to_string(),
            "3".to_string(),
            "2".to_string(),
            "1".to_string(),
        ];
        assert_eq!(dedup_preserving_order(&ids), vec!["3", "1", "2"]);
    }

    #[test]
    fn test_dedup_noop_on_unique_list() {
        let ids = vec!["a".to_string(), "b".to_string()];
        assert_eq!(dedup_preserving_order(&ids), ids);
    }

    #[test]
    fn test_user_record_tolerates_missing_animals_field() {
        let rec: UserRecord = serde_json::from_str(r#"{"name":"Astrid"}"#).unwrap();
        assert_eq!(rec.name, "Astrid");
        assert!(rec.animals.is_empty());
    }
}
