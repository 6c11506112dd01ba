//! The name binding table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};
use crate::identity::ChannelId;

/// Global mapping of human-readable names to identities.
///
/// A name is bound to at most one identity. An identity can hold any number
/// of names. Entries may point at identities that are no longer connected;
/// only the owner's own disconnect cleans its names up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BindingTable {
    names: BTreeMap<String, ChannelId>,
}

/// A single name-level change between two binding tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingChange {
    Bound { id: ChannelId, name: String },
    Unbound { id: ChannelId, name: String },
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `id`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NameAlreadyBound`] if `name` is bound to a different
    /// identity and `rebind` is false. The table is left unchanged.
    pub fn bind(&mut self, id: ChannelId, name: &str, rebind: bool) -> Result<()> {
        match self.names.get(name) {
            Some(current) if *current != id && !rebind => {
                Err(ChannelError::NameAlreadyBound(name.to_string()))
            }
            _ => {
                self.names.insert(name.to_string(), id);
                Ok(())
            }
        }
    }

    /// Release `name`, which must currently be bound to `id`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NameNotBound`] if `name` is unbound or bound to a
    /// different identity. The table is left unchanged.
    pub fn unbind(&mut self, id: ChannelId, name: &str) -> Result<()> {
        match self.names.get(name) {
            Some(current) if *current == id => {
                self.names.remove(name);
                Ok(())
            }
            _ => Err(ChannelError::NameNotBound(name.to_string())),
        }
    }

    /// Remove every name bound to `id`, returning the removed names in order.
    pub fn release_all(&mut self, id: ChannelId) -> Vec<String> {
        let released = self.names_of(id);
        self.names.retain(|_, owner| *owner != id);
        released
    }

    pub fn lookup(&self, name: &str) -> Option<ChannelId> {
        self.names.get(name).copied()
    }

    /// Names bound to `id`, found by a linear scan.
    pub fn names_of(&self, id: ChannelId) -> Vec<String> {
        self.names
            .iter()
            .filter(|(_, owner)| **owner == id)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ChannelId)> + '_ {
        self.names.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Per-name differences going from `self` to `newer`.
    ///
    /// Unbinds come first, then binds. A name moved from one identity to
    /// another is a rebind, which silently replaces the old owner: it yields
    /// only a bind for the new one.
    pub fn changes_to(&self, newer: &BindingTable) -> Vec<BindingChange> {
        let mut changes = Vec::new();
        for (name, id) in &self.names {
            if !newer.names.contains_key(name) {
                changes.push(BindingChange::Unbound {
                    id: *id,
                    name: name.clone(),
                });
            }
        }
        for (name, id) in &newer.names {
            if self.names.get(name) != Some(id) {
                changes.push(BindingChange::Bound {
                    id: *id,
                    name: name.clone(),
                });
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ChannelId = ChannelId::new(1);
    const B: ChannelId = ChannelId::new(2);

    #[test]
    fn bind_and_lookup() {
        let mut table = BindingTable::new();
        table.bind(A, "svc", false).unwrap();
        assert_eq!(table.lookup("svc"), Some(A));
        assert_eq!(table.lookup("other"), None);
    }

    #[test]
    fn bind_conflict_leaves_table_unchanged() {
        let mut table = BindingTable::new();
        table.bind(A, "svc", false).unwrap();
        let before = table.clone();

        let err = table.bind(B, "svc", false).unwrap_err();
        assert!(matches!(err, ChannelError::NameAlreadyBound(ref n) if n == "svc"));
        assert_eq!(table, before);
    }

    #[test]
    fn rebind_overwrites_only_that_name() {
        let mut table = BindingTable::new();
        table.bind(A, "svc", false).unwrap();
        table.bind(A, "other", false).unwrap();

        table.bind(B, "svc", true).unwrap();
        assert_eq!(table.lookup("svc"), Some(B));
        assert_eq!(table.lookup("other"), Some(A));
    }

    #[test]
    fn binding_same_name_to_same_owner_is_idempotent() {
        let mut table = BindingTable::new();
        table.bind(A, "svc", false).unwrap();
        table.bind(A, "svc", false).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unbind_requires_owner() {
        let mut table = BindingTable::new();
        table.bind(A, "svc", false).unwrap();
        let before = table.clone();

        let err = table.unbind(B, "svc").unwrap_err();
        assert!(matches!(err, ChannelError::NameNotBound(_)));
        assert_eq!(table, before);

        let err = table.unbind(A, "missing").unwrap_err();
        assert!(matches!(err, ChannelError::NameNotBound(_)));

        table.unbind(A, "svc").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn release_all_removes_only_owner_names() {
        let mut table = BindingTable::new();
        table.bind(A, "a1", false).unwrap();
        table.bind(B, "b1", false).unwrap();
        table.bind(A, "a2", false).unwrap();

        let released = table.release_all(A);
        assert_eq!(released, vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(table.names_of(A), Vec::<String>::new());
        assert_eq!(table.names_of(B), vec!["b1".to_string()]);
    }

    #[test]
    fn changes_between_tables() {
        let mut old = BindingTable::new();
        old.bind(A, "svc", false).unwrap();
        old.bind(A, "keep", false).unwrap();
        old.bind(B, "gone", false).unwrap();

        let mut new = old.clone();
        new.bind(B, "svc", true).unwrap();
        new.unbind(B, "gone").unwrap();
        new.bind(B, "fresh", false).unwrap();

        let changes = old.changes_to(&new);
        assert_eq!(
            changes,
            vec![
                BindingChange::Unbound {
                    id: B,
                    name: "gone".to_string()
                },
                BindingChange::Bound {
                    id: B,
                    name: "fresh".to_string()
                },
                BindingChange::Bound {
                    id: B,
                    name: "svc".to_string()
                },
            ]
        );
    }

    #[test]
    fn serializes_as_object() {
        let mut table = BindingTable::new();
        table.bind(A, "svc", false).unwrap();
        assert_eq!(serde_json::to_string(&table).unwrap(), r#"{"svc":1}"#);
    }
}
