//! Configuration for column storage.

use tessera_foundation::{Error, ErrorKind, Result};

/// Sizing policy for columns, tables, and the entity location table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Rows allocated when a column is created.
    pub initial_capacity: usize,

    /// Smallest absolute growth step when a column runs out of rows.
    pub min_growth: usize,

    /// Upper bound on rows per column. Growing past it fails with `CannotGrow`.
    pub max_rows: usize,

    /// Slots reserved up front in the entity location table.
    pub entity_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            min_growth: 16,
            max_rows: i32::MAX as usize,
            entity_capacity: 16,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration that starts every column at a single row.
    ///
    /// Useful when many archetypes hold only a handful of entities.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            initial_capacity: 1,
            min_growth: 1,
            entity_capacity: 0,
            ..Self::default()
        }
    }

    /// Builder method to set the initial column capacity.
    #[must_use]
    pub fn with_initial_capacity(mut self, rows: usize) -> Self {
        self.initial_capacity = rows;
        self
    }

    /// Builder method to set the minimum growth step.
    #[must_use]
    pub fn with_min_growth(mut self, rows: usize) -> Self {
        self.min_growth = rows;
        self
    }

    /// Builder method to set the maximum rows per column.
    #[must_use]
    pub fn with_max_rows(mut self, rows: usize) -> Self {
        self.max_rows = rows;
        self
    }

    /// Builder method to set the initial entity location capacity.
    #[must_use]
    pub fn with_entity_capacity(mut self, entities: usize) -> Self {
        self.entity_capacity = entities;
        self
    }

    /// Computes the capacity a column of `current` rows grows to so that it
    /// holds at least `needed` rows.
    ///
    /// Growth doubles, takes at least `min_growth` rows per step, and is
    /// clamped to `max_rows`.
    ///
    /// # Errors
    ///
    /// Returns `CannotGrow` if `needed` exceeds `max_rows`.
    pub fn grown_capacity(&self, current: usize, needed: usize) -> Result<usize> {
        if needed > self.max_rows {
            return Err(Error::new(ErrorKind::CannotGrow {
                requested: needed,
                maximum: self.max_rows,
            }));
        }
        let doubled = current.saturating_mul(2);
        let stepped = current.saturating_add(self.min_growth.max(1));
        Ok(doubled.max(stepped).max(needed).min(self.max_rows))
    }
}
