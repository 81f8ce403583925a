//! Archetypes: one table per distinct component set.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tessera_foundation::{Entity, Error, ID, Name, Result, Value};

use crate::config::StoreConfig;
use crate::location::{EntityLocation, EntityLocationTable};
use crate::table::{EntityValues, Table};

/// Index of an archetype within its store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ArchetypeId(u32);

impl ArchetypeId {
    /// Creates an archetype id from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "archetype {}", self.0)
    }
}

/// A table whose columns are exactly one component set, `id` included.
#[derive(Clone, Debug)]
pub struct Archetype {
    id: ArchetypeId,
    components: Vec<Name>,
    table: Table,
}

impl Archetype {
    /// Wraps a table. Component names are taken from its columns.
    #[must_use]
    pub fn new(id: ArchetypeId, table: Table) -> Self {
        let components = table.names().cloned().collect();
        Self {
            id,
            components,
            table,
        }
    }

    /// This archetype's id.
    #[must_use]
    pub const fn id(&self) -> ArchetypeId {
        self.id
    }

    /// Sorted component names, `id` included.
    #[must_use]
    pub fn components(&self) -> &[Name] {
        &self.components
    }

    /// Returns true if `name` is one of the components.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.components
            .binary_search_by(|n| n.as_ref().cmp(name))
            .is_ok()
    }

    /// The underlying table.
    #[must_use]
    pub const fn table(&self) -> &Table {
        &self.table
    }

    /// Number of entities stored.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.table.rows()
    }

    /// Returns true if no entity is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.table.rows() == 0
    }

    /// Entity stored at `row`.
    #[must_use]
    pub fn entity_at(&self, row: usize) -> Option<Entity> {
        self.table.cell(row, ID).and_then(|v| v.as_entity())
    }

    /// Iterates over stored entities in row order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        (0..self.len()).filter_map(|row| self.entity_at(row))
    }

    /// Creates a new entity in this archetype.
    ///
    /// `values` must hold every non-`id` component; an `id` entry, if present,
    /// is replaced by the allocated id.
    ///
    /// # Errors
    ///
    /// Returns `MissingComponent`, `UnknownComponent` or `SchemaViolation`; no
    /// id is consumed on failure.
    pub fn insert(
        &mut self,
        mut values: EntityValues,
        locations: &mut EntityLocationTable,
        config: &StoreConfig,
    ) -> Result<Entity> {
        let entity = locations.peek_next();
        values.insert(Name::from(ID), Value::from(entity));
        let row = self.table.add_row(&values, config)?;
        let created = locations.create(EntityLocation { archetype: self.id, row });
        if created != entity {
            return Err(Error::internal("entity id allocation diverged"));
        }
        Ok(entity)
    }

    /// Appends a row for an entity that already has an id (stored in `values`).
    ///
    /// The caller is responsible for pointing the entity's location at the
    /// returned row.
    ///
    /// # Errors
    ///
    /// Same as [`Table::add_row`].
    pub fn push_row(&mut self, values: &EntityValues, config: &StoreConfig) -> Result<usize> {
        self.table.add_row(values, config)
    }

    /// Overwrites components of a stored row.
    ///
    /// # Errors
    ///
    /// Same as [`Table::update_row`].
    pub fn update_row<'a, I>(&mut self, row: usize, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a Name, &'a Value)>,
    {
        self.table.update_row(row, values)
    }

    /// Removes `row`, repointing the entity that was moved into its place.
    pub fn delete_row(&mut self, row: usize, locations: &mut EntityLocationTable) {
        if self.table.delete_row(row) {
            if let Some(moved) = self.entity_at(row) {
                locations.update(moved, EntityLocation { archetype: self.id, row });
            }
        }
    }
}
