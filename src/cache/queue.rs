//! Persistent job queue
//!
//! Jobs live in their own catalog tree, keyed by a big-endian counter so
//! the tree's natural order is insertion order. Dequeue pops the minimum
//! key, which removes the head atomically.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// What a worker should do with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Upload,
    Download,
    Update,
    Delete,
}

impl Action {
    /// Stable wire discriminant; catalog rows written by one version must
    /// dequeue correctly in the next.
    pub fn as_u8(self) -> u8 {
        match self {
            Action::List => 0,
            Action::Upload => 1,
            Action::Download => 2,
            Action::Update => 3,
            Action::Delete => 4,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Action::List),
            1 => Ok(Action::Upload),
            2 => Ok(Action::Download),
            3 => Ok(Action::Update),
            4 => Ok(Action::Delete),
            other => Err(Error::InvalidAction(other)),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Action::List => "list",
            Action::Upload => "upload",
            Action::Download => "download",
            Action::Update => "update",
            Action::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A queued unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Monotonically increasing queue position
    pub id: u64,
    /// Target catalog entry
    pub entry_id: String,
    pub action: Action,
}

#[derive(Serialize, Deserialize)]
struct JobRecord {
    entry_id: String,
    action: u8,
}

pub(super) fn push(tree: &sled::Tree, id: u64, entry_id: &str, action: Action) -> Result<()> {
    let record = JobRecord {
        entry_id: entry_id.to_string(),
        action: action.as_u8(),
    };
    tree.insert(id.to_be_bytes(), bincode::serialize(&record)?)?;
    Ok(())
}

pub(super) fn pop(tree: &sled::Tree) -> Result<Job> {
    let (key, value) = tree.pop_min()?.ok_or(Error::QueueEmpty)?;

    let id = key
        .as_ref()
        .try_into()
        .map(u64::from_be_bytes)
        .map_err(|_| Error::BadFormat("job key".to_string()))?;
    let record: JobRecord = bincode::deserialize(&value)?;

    Ok(Job {
        id,
        entry_id: record.entry_id,
        action: Action::from_u8(record.action)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_round_trip() {
        for action in [
            Action::List,
            Action::Upload,
            Action::Download,
            Action::Update,
            Action::Delete,
        ] {
            assert_eq!(Action::from_u8(action.as_u8()).unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_action_rejected() {
        assert!(matches!(Action::from_u8(9), Err(Error::InvalidAction(9))));
    }

    #[test]
    fn test_push_pop_order() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tree = db.open_tree("jobs").unwrap();

        push(&tree, 1, "first", Action::Upload).unwrap();
        push(&tree, 2, "second", Action::Download).unwrap();

        assert_eq!(pop(&tree).unwrap().entry_id, "first");
        assert_eq!(pop(&tree).unwrap().entry_id, "second");
        assert!(matches!(pop(&tree), Err(Error::QueueEmpty)));
    }
}
