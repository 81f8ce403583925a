//! Partial component updates.

use std::collections::BTreeMap;
use std::collections::btree_map;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tessera_foundation::{Name, Value};

use crate::table::EntityValues;

/// Component changes applied to one entity.
///
/// Each entry either sets a component (`Some`) or removes it (`None`).
/// Setting a component the entity lacks adds it; removing one moves the
/// entity to the archetype without it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Changes(BTreeMap<Name, Option<Value>>);

impl Changes {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set a component.
    #[must_use]
    pub fn set(mut self, name: impl Into<Name>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), Some(value.into()));
        self
    }

    /// Builder method to remove a component.
    #[must_use]
    pub fn remove(mut self, name: impl Into<Name>) -> Self {
        self.0.insert(name.into(), None);
        self
    }

    /// Records one entry, replacing any earlier entry for the name.
    pub fn insert(&mut self, name: Name, value: Option<Value>) {
        self.0.insert(name, value);
    }

    /// The entry for `name`: `None` if absent, `Some(None)` if it removes.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Option<&Value>> {
        self.0.get(name).map(Option::as_ref)
    }

    /// Returns true if `name` has an entry.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, Option<&Value>)> {
        self.0.iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// Iterates over entries that set a value.
    pub fn assigned(&self) -> impl Iterator<Item = (&Name, &Value)> {
        self.0.iter().filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
    }

    /// Iterates over names this change set touches.
    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.0.keys()
    }

    /// Folds `top` into `self`; where both have an entry, `top` wins.
    pub fn overlay(&mut self, top: Self) {
        self.0.extend(top.0);
    }

    /// Applies the changes to a full set of values.
    #[must_use]
    pub fn apply_to(&self, mut values: EntityValues) -> EntityValues {
        for (name, value) in &self.0 {
            match value {
                Some(v) => {
                    values.insert(Name::clone(name), v.clone());
                }
                None => {
                    values.remove(name);
                }
            }
        }
        values
    }
}

impl From<EntityValues> for Changes {
    fn from(values: EntityValues) -> Self {
        Self(values.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }
}

impl FromIterator<(Name, Option<Value>)> for Changes {
    fn from_iter<I: IntoIterator<Item = (Name, Option<Value>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Changes {
    type Item = (Name, Option<Value>);
    type IntoIter = btree_map::IntoIter<Name, Option<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
