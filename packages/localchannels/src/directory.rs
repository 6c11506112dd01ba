//! The directory of connected identities.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::identity::{self, ChannelId};
use crate::error::Result;

/// Ordered set of currently registered identities.
///
/// Stored as a single JSON array under the directory key. It is the source
/// of truth for who is connected and is only written by connect and
/// disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directory {
    ids: BTreeSet<ChannelId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &BTreeSet<ChannelId> {
        &self.ids
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.ids.iter().copied()
    }

    /// Returns `false` if the identity was already present.
    pub fn insert(&mut self, id: ChannelId) -> bool {
        self.ids.insert(id)
    }

    /// Returns `false` if the identity was not present.
    pub fn remove(&mut self, id: ChannelId) -> bool {
        self.ids.remove(&id)
    }

    /// Allocate an identity that is not in this directory.
    pub fn allocate(&self) -> Result<ChannelId> {
        identity::allocate(&self.ids)
    }

    /// Compare a previously known set of identities against this snapshot.
    pub fn delta_from<'a, I>(&self, known: I) -> DirectoryDelta
    where
        I: IntoIterator<Item = &'a ChannelId>,
    {
        let known: BTreeSet<ChannelId> = known.into_iter().copied().collect();
        DirectoryDelta {
            joined: self.ids.difference(&known).copied().collect(),
            left: known.difference(&self.ids).copied().collect(),
        }
    }
}

impl FromIterator<ChannelId> for Directory {
    fn from_iter<T: IntoIterator<Item = ChannelId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Difference between a locally cached identity set and a new snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryDelta {
    /// Present in the snapshot, unknown locally. Ascending.
    pub joined: Vec<ChannelId>,
    /// Known locally, absent from the snapshot. Ascending.
    pub left: Vec<ChannelId>,
}

impl DirectoryDelta {
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(values: &[u32]) -> Directory {
        values.iter().copied().map(ChannelId::new).collect()
    }

    fn ids(values: &[u32]) -> Vec<ChannelId> {
        values.iter().copied().map(ChannelId::new).collect()
    }

    #[test]
    fn delta_reports_joins_and_leaves() {
        let known = ids(&[0, 1, 2]);
        let delta = dir(&[1, 2, 5, 6]).delta_from(&known);
        assert_eq!(delta.joined, ids(&[5, 6]));
        assert_eq!(delta.left, ids(&[0]));
        assert!(!delta.is_empty());
    }

    #[test]
    fn unchanged_snapshot_has_empty_delta() {
        let known = ids(&[3, 4]);
        assert!(dir(&[3, 4]).delta_from(&known).is_empty());
    }

    #[test]
    fn serializes_as_sorted_array() {
        let directory = dir(&[9, 2, 4]);
        assert_eq!(serde_json::to_string(&directory).unwrap(), "[2,4,9]");

        let parsed: Directory = serde_json::from_str("[4,2,2]").unwrap();
        assert_eq!(parsed, dir(&[2, 4]));
    }

    #[test]
    fn insert_remove() {
        let mut directory = Directory::new();
        assert!(directory.insert(ChannelId::new(1)));
        assert!(!directory.insert(ChannelId::new(1)));
        assert!(directory.contains(ChannelId::new(1)));
        assert!(directory.remove(ChannelId::new(1)));
        assert!(!directory.remove(ChannelId::new(1)));
        assert!(directory.is_empty());
    }

    #[test]
    fn allocate_uses_directory_contents() {
        assert_eq!(dir(&[0, 1]).allocate().unwrap(), ChannelId::new(2));
    }
}
