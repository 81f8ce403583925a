//! Error types for the Tessera system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.

use std::fmt;

use thiserror::Error;

use crate::entity::Entity;
use crate::value::Value;

/// The main error type for Tessera operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates an invalid schema error.
    #[must_use]
    pub fn invalid_schema(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSchema(reason.into()))
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn entity_not_found(entity: Entity) -> Self {
        Self::new(ErrorKind::EntityNotFound(entity))
    }

    /// Creates a schema violation error for a value written at `path`.
    #[must_use]
    pub fn schema_violation(path: &str, expected: &str, actual: &Value) -> Self {
        Self::new(ErrorKind::SchemaViolation {
            path: path.to_string(),
            expected: expected.to_string(),
            actual: actual.kind_name().to_string(),
        })
    }

    /// Creates an unknown component error.
    #[must_use]
    pub fn unknown_component(name: &str) -> Self {
        Self::new(ErrorKind::UnknownComponent(name.to_string()))
    }

    /// Creates a missing component error.
    #[must_use]
    pub fn missing_component(name: &str) -> Self {
        Self::new(ErrorKind::MissingComponent(name.to_string()))
    }

    /// Creates an unknown resource error.
    #[must_use]
    pub fn unknown_resource(name: &str) -> Self {
        Self::new(ErrorKind::UnknownResource(name.to_string()))
    }

    /// Creates an index out of bounds error.
    #[must_use]
    pub fn index_out_of_bounds(index: usize, capacity: usize) -> Self {
        Self::new(ErrorKind::IndexOutOfBounds { index, capacity })
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Schema cannot be used the way it was asked to be used.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Archetype component set lacks the `id` component.
    #[error("id is required")]
    MissingIdComponent,

    /// Entity does not resolve to a live location.
    #[error("entity not found: {0:?}")]
    EntityNotFound(Entity),

    /// Capacity change would drop existing rows.
    #[error("cannot shrink column from {capacity} to {requested}")]
    CannotShrink {
        /// Capacity asked for.
        requested: usize,
        /// Current capacity.
        capacity: usize,
    },

    /// Capacity change exceeds the configured maximum.
    #[error("cannot grow column to {requested}: maximum is {maximum}")]
    CannotGrow {
        /// Capacity asked for.
        requested: usize,
        /// Configured maximum.
        maximum: usize,
    },

    /// Row index beyond a column's capacity.
    #[error("index out of bounds: {index} (capacity {capacity})")]
    IndexOutOfBounds {
        /// The index that was accessed.
        index: usize,
        /// The column's capacity.
        capacity: usize,
    },

    /// Update tried to write or remove the `id` component.
    #[error("id cannot be changed")]
    IdIsImmutable,

    /// Value does not conform to the column's schema.
    #[error("schema violation at {path}: expected {expected}, got {actual}")]
    SchemaViolation {
        /// Location inside the value, `$` being the root.
        path: String,
        /// What the schema expects there.
        expected: String,
        /// Kind of the value found.
        actual: String,
    },

    /// Component name is not registered, or not part of the archetype.
    #[error("unknown component: {0}")]
    UnknownComponent(String),

    /// Insert omitted a component the archetype requires.
    #[error("missing component: {0}")]
    MissingComponent(String),

    /// Component or resource registered twice.
    #[error("duplicate component: {0}")]
    DuplicateComponent(String),

    /// Resource was not declared at store creation.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// Named transaction was not declared.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// System names a phase the scheduler does not know.
    #[error("unknown phase: {0}")]
    UnknownPhase(String),

    /// Two systems share a name.
    #[error("duplicate system: {0}")]
    DuplicateSystem(String),

    /// Before/after constraints within a phase form a cycle.
    #[error("cyclic system order in phase {phase}: {}", systems.join(", "))]
    CyclicSystemOrder {
        /// Phase containing the cycle.
        phase: String,
        /// Systems that could not be ordered.
        systems: Vec<String>,
    },

    /// A system returned an error while running.
    #[error("system {system} failed: {message}")]
    SystemFailed {
        /// Failing system.
        system: String,
        /// Underlying error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Component the failing operation addressed.
    pub component: Option<String>,
    /// Named transaction that was executing.
    pub transaction: Option<String>,
    /// Entity the failing operation addressed.
    pub entity: Option<Entity>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the component.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    /// Sets the named transaction.
    #[must_use]
    pub fn with_transaction(mut self, name: impl Into<String>) -> Self {
        self.transaction = Some(name.into());
        self
    }

    /// Sets the entity.
    #[must_use]
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if let Some(name) = &self.transaction {
            write!(f, "in transaction {name}")?;
            sep = ", ";
        }
        if let Some(entity) = self.entity {
            write!(f, "{sep}on {entity}")?;
            sep = ", ";
        }
        if let Some(component) = &self.component {
            write!(f, "{sep}component {component}")?;
        }
        Ok(())
    }
}

/// Result type for Tessera operations.
pub type Result<T> = std::result::Result<T, Error>;
