//! Tables: named columns sharing one row count.

use std::collections::BTreeMap;

use tessera_foundation::{Error, Name, Result, Value};

use crate::column::{Column, TypedBuffer};
use crate::config::StoreConfig;

/// Component values of one row, keyed by component name.
pub type EntityValues = BTreeMap<Name, Value>;

/// Ordered set of named columns with a shared row count.
///
/// Rows `0..rows` are live. Every column always has the same capacity,
/// which is never below `rows`.
#[derive(Clone, Debug)]
pub struct Table {
    columns: Vec<(Name, Column)>,
    rows: usize,
    capacity: usize,
}

impl Table {
    /// Creates an empty table over `columns`.
    ///
    /// Columns are sorted by name. Their capacities are equalized to the
    /// largest one.
    ///
    /// # Errors
    ///
    /// Propagates capacity errors from equalizing the columns.
    pub fn new(mut columns: Vec<(Name, Column)>) -> Result<Self> {
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        let capacity = columns.iter().map(|(_, c)| c.capacity()).max().unwrap_or(0);
        for (_, column) in &mut columns {
            if column.capacity() < capacity {
                column.set_capacity(capacity)?;
            }
        }
        Ok(Self {
            columns,
            rows: 0,
            capacity,
        })
    }

    /// Number of live rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Allocated rows per column.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|i| &self.columns[i].1)
    }

    /// Iterates over `(name, column)` pairs in name order.
    pub fn columns(&self) -> impl Iterator<Item = (&Name, &Column)> {
        self.columns.iter().map(|(n, c)| (n, c))
    }

    /// Column names in order.
    pub fn names(&self) -> impl Iterator<Item = &Name> {
        self.columns.iter().map(|(n, _)| n)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .binary_search_by(|(n, _)| n.as_ref().cmp(name))
            .ok()
    }

    /// Grows every column so at least `needed` rows fit.
    ///
    /// # Errors
    ///
    /// Returns `CannotGrow` if the configuration's row limit is exceeded.
    pub fn ensure_capacity(&mut self, needed: usize, config: &StoreConfig) -> Result<()> {
        if needed <= self.capacity {
            return Ok(());
        }
        let capacity = config.grown_capacity(self.capacity, needed)?;
        for (_, column) in &mut self.columns {
            column.set_capacity(capacity)?;
        }
        tracing::debug!(from = self.capacity, to = capacity, "table grew");
        self.capacity = capacity;
        Ok(())
    }

    /// Appends a row holding exactly one value per column.
    ///
    /// # Errors
    ///
    /// Returns `MissingComponent` or `UnknownComponent` if `values` does not
    /// name exactly this table's columns, and `SchemaViolation` if a value is
    /// rejected. A failed append leaves the live rows untouched.
    pub fn add_row(&mut self, values: &EntityValues, config: &StoreConfig) -> Result<usize> {
        if let Some(extra) = values.keys().find(|k| self.index_of(k).is_none()) {
            return Err(Error::unknown_component(extra));
        }
        if let Some((missing, _)) = self.columns.iter().find(|(n, _)| !values.contains_key(n)) {
            return Err(Error::missing_component(missing));
        }
        let row = self.rows;
        self.ensure_capacity(row + 1, config)?;
        for (name, column) in &mut self.columns {
            let value = values
                .get(name.as_ref())
                .ok_or_else(|| Error::missing_component(name))?;
            column.set(row, value)?;
        }
        self.rows += 1;
        Ok(row)
    }

    /// Overwrites some columns of a live row.
    ///
    /// # Errors
    ///
    /// Returns `UnknownComponent` for names outside the table and
    /// `SchemaViolation` if a value is rejected; in both cases the row keeps
    /// its previous values.
    pub fn update_row<'a, I>(&mut self, row: usize, values: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a Name, &'a Value)>,
    {
        if row >= self.rows {
            return Err(Error::index_out_of_bounds(row, self.rows));
        }
        let mut previous: Vec<(usize, Value)> = Vec::new();
        for (name, value) in values {
            let outcome = match self.index_of(name) {
                Some(i) => {
                    let column = &mut self.columns[i].1;
                    let old = column.get(row).unwrap_or(Value::Null);
                    column.set(row, value).map(|()| previous.push((i, old)))
                }
                None => Err(Error::unknown_component(name)),
            };
            if let Err(e) = outcome {
                for (i, old) in previous.into_iter().rev() {
                    // Restoring a value the column already held cannot fail.
                    let _ = self.columns[i].1.set(row, &old);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Reads a live row.
    #[must_use]
    pub fn row(&self, row: usize) -> Option<EntityValues> {
        if row >= self.rows {
            return None;
        }
        self.columns
            .iter()
            .map(|(name, column)| column.get(row).map(|v| (Name::clone(name), v)))
            .collect()
    }

    /// Reads one cell of a live row.
    #[must_use]
    pub fn cell(&self, row: usize, name: &str) -> Option<Value> {
        if row >= self.rows {
            return None;
        }
        self.column(name).and_then(|c| c.get(row))
    }

    /// Removes a live row by moving the last row into its place.
    ///
    /// Returns true if a row was moved, in which case the row formerly at
    /// `rows - 1` now lives at `row`.
    pub fn delete_row(&mut self, row: usize) -> bool {
        if row >= self.rows {
            return false;
        }
        let last = self.rows - 1;
        self.rows = last;
        if row == last {
            return false;
        }
        for (_, column) in &mut self.columns {
            column.move_row(last, row);
        }
        true
    }
}
