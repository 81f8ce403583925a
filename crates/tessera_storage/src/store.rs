//! The entity store.
//!
//! Owns every archetype, the entity location table, the registered component
//! schemas, and the resources. All mutation is synchronous; the store knows
//! nothing about transactions or observers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tessera_foundation::{Entity, Error, ErrorKind, ID, Name, Result, Schema, Value};

use crate::archetype::{Archetype, ArchetypeId};
use crate::changes::Changes;
use crate::column::Column;
use crate::config::StoreConfig;
use crate::layout::LayoutCache;
use crate::location::{EntityLocation, EntityLocationTable};
use crate::table::{EntityValues, Table};

/// Columnar entity store.
///
/// # Example
///
/// ```
/// use tessera_storage::{Changes, Store};
/// use tessera_foundation::{Schema, Value};
///
/// let mut store = Store::new(
///     [("position", Schema::vec3()), ("name", Schema::String)],
///     [("time", Value::Float(0.0))],
/// ).unwrap();
///
/// let values = [("position".into(), Value::from([1.0, 2.0, 3.0]))].into_iter().collect();
/// let e = store.create(values).unwrap();
/// store.update(e, &Changes::new().set("name", "A")).unwrap();
/// assert_eq!(store.read(e).unwrap().len(), 3);
/// ```
pub struct Store {
    config: StoreConfig,
    components: BTreeMap<Name, Schema>,
    resources: BTreeMap<Name, Entity>,
    archetypes: Vec<Archetype>,
    archetype_ids: HashMap<Vec<Name>, ArchetypeId>,
    locations: EntityLocationTable,
    layouts: LayoutCache,
}

impl Store {
    /// Creates a store with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateComponent` if a name is registered twice (resources
    /// share the component namespace, `id` is reserved) and propagates errors
    /// from storing the resources' default values.
    pub fn new<C, CK, R, RK>(components: C, resources: R) -> Result<Self>
    where
        C: IntoIterator<Item = (CK, Schema)>,
        CK: Into<Name>,
        R: IntoIterator<Item = (RK, Value)>,
        RK: Into<Name>,
    {
        Self::with_config(StoreConfig::default(), components, resources)
    }

    /// Creates a store with the given configuration.
    ///
    /// # Errors
    ///
    /// See [`Store::new`].
    pub fn with_config<C, CK, R, RK>(config: StoreConfig, components: C, resources: R) -> Result<Self>
    where
        C: IntoIterator<Item = (CK, Schema)>,
        CK: Into<Name>,
        R: IntoIterator<Item = (RK, Value)>,
        RK: Into<Name>,
    {
        let mut store = Self {
            locations: EntityLocationTable::with_capacity(config.entity_capacity),
            config,
            components: BTreeMap::new(),
            resources: BTreeMap::new(),
            archetypes: Vec::new(),
            archetype_ids: HashMap::new(),
            layouts: LayoutCache::new(),
        };
        store.register(Name::from(ID), Schema::entity())?;
        for (name, schema) in components {
            store.register(name.into(), schema)?;
        }
        for (name, value) in resources {
            let name: Name = name.into();
            store.register(Name::clone(&name), Schema::Any)?;
            let archetype = store.ensure_archetype([ID, name.as_ref()])?;
            let entity = store.insert(archetype, [(Name::clone(&name), value)].into_iter().collect())?;
            store.resources.insert(name, entity);
        }
        Ok(store)
    }

    fn register(&mut self, name: Name, schema: Schema) -> Result<()> {
        if self.components.contains_key(&name) {
            return Err(Error::new(ErrorKind::DuplicateComponent(name.to_string())));
        }
        self.components.insert(name, schema);
        Ok(())
    }

    /// The sizing configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Schema of a registered component (resources included).
    #[must_use]
    pub fn component_schema(&self, name: &str) -> Option<&Schema> {
        self.components.get(name)
    }

    /// Registered components in name order, `id` and resources included.
    pub fn components(&self) -> impl Iterator<Item = (&Name, &Schema)> {
        self.components.iter()
    }

    /// Number of live entities, resource entities included.
    #[must_use]
    pub const fn entity_count(&self) -> usize {
        self.locations.len()
    }

    // =========================================================================
    // Archetypes
    // =========================================================================

    /// Returns the archetype for exactly `names`, creating it on first use.
    ///
    /// Names may come in any order and may repeat; equivalent sets resolve to
    /// the same archetype.
    ///
    /// # Errors
    ///
    /// Returns `MissingIdComponent` if `id` is not among the names and
    /// `UnknownComponent` for unregistered names.
    pub fn ensure_archetype<I, S>(&mut self, names: I) -> Result<ArchetypeId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut key: Vec<Name> = Vec::new();
        for name in names {
            let name = name.as_ref();
            let (registered, _) = self
                .components
                .get_key_value(name)
                .ok_or_else(|| Error::unknown_component(name))?;
            key.push(Name::clone(registered));
        }
        key.sort();
        key.dedup();

        if let Some(&id) = self.archetype_ids.get(&key) {
            return Ok(id);
        }
        if key.binary_search_by(|n| n.as_ref().cmp(ID)).is_err() {
            return Err(Error::new(ErrorKind::MissingIdComponent));
        }

        let columns = key
            .iter()
            .map(|name| {
                let schema = &self.components[name];
                (
                    Name::clone(name),
                    Column::for_schema(schema, &mut self.layouts, &self.config),
                )
            })
            .collect();
        let table = Table::new(columns)?;
        let id = ArchetypeId::new(
            u32::try_from(self.archetypes.len()).map_err(|_| Error::internal("too many archetypes"))?,
        );
        self.archetypes.push(Archetype::new(id, table));
        tracing::debug!(archetype = %id, components = ?key, "archetype created");
        self.archetype_ids.insert(key, id);
        Ok(id)
    }

    /// Looks up an archetype.
    #[must_use]
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// All archetypes in creation order.
    #[must_use]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    /// Archetypes holding every `include` component and no `exclude` component.
    #[must_use]
    pub fn query_archetypes(&self, include: &[&str], exclude: &[&str]) -> Vec<ArchetypeId> {
        self.archetypes
            .iter()
            .filter(|a| include.iter().all(|n| a.has(n)) && !exclude.iter().any(|n| a.has(n)))
            .map(Archetype::id)
            .collect()
    }

    /// Entities of every matching archetype, archetype by archetype in row order.
    #[must_use]
    pub fn select(&self, include: &[&str], exclude: &[&str]) -> Vec<Entity> {
        self.query_archetypes(include, exclude)
            .into_iter()
            .flat_map(|id| self.archetypes[id.index()].entities())
            .collect()
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates an entity in `archetype`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` for an unknown archetype, otherwise see
    /// [`Archetype::insert`].
    pub fn insert(&mut self, archetype: ArchetypeId, values: EntityValues) -> Result<Entity> {
        let arch = self
            .archetypes
            .get_mut(archetype.index())
            .ok_or_else(|| Error::internal(format!("no {archetype}")))?;
        arch.insert(values, &mut self.locations, &self.config)
    }

    /// Creates an entity in the archetype of `id` plus the given components.
    ///
    /// # Errors
    ///
    /// See [`Store::ensure_archetype`] and [`Archetype::insert`].
    pub fn create(&mut self, values: EntityValues) -> Result<Entity> {
        let names: Vec<Name> = values.keys().cloned().collect();
        let archetype = self.ensure_archetype(names.iter().map(|n| &**n).chain([ID]))?;
        self.insert(archetype, values)
    }

    /// Where an entity lives, or `None` if it is not live.
    #[must_use]
    pub fn locate(&self, entity: Entity) -> Option<EntityLocation> {
        self.locations.locate(entity)
    }

    /// Returns true if the entity is live.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.locations.locate(entity).is_some()
    }

    /// Every component value of a live entity, `id` included.
    #[must_use]
    pub fn read(&self, entity: Entity) -> Option<EntityValues> {
        let loc = self.locations.locate(entity)?;
        self.archetypes[loc.archetype.index()].table().row(loc.row)
    }

    /// One component value of a live entity.
    #[must_use]
    pub fn get(&self, entity: Entity, component: &str) -> Option<Value> {
        let loc = self.locations.locate(entity)?;
        self.archetypes[loc.archetype.index()].table().cell(loc.row, component)
    }

    /// Applies component changes to a live entity.
    ///
    /// When the set of components stays the same the row is updated in place.
    /// Otherwise the entity migrates: its merged values are appended to the
    /// target archetype first, and only then is the old row removed, so a
    /// rejected value leaves the entity where it was.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound`, `IdIsImmutable` for changes to `id`,
    /// `UnknownComponent` for unregistered names and `SchemaViolation` for
    /// rejected values.
    pub fn update(&mut self, entity: Entity, changes: &Changes) -> Result<()> {
        let loc = self
            .locations
            .locate(entity)
            .ok_or_else(|| Error::entity_not_found(entity))?;
        if changes.contains(ID) {
            return Err(Error::new(ErrorKind::IdIsImmutable));
        }

        let current = &self.archetypes[loc.archetype.index()];
        let mut key: BTreeSet<&str> = current.components().iter().map(|n| &**n).collect();
        for (name, value) in changes.iter() {
            if value.is_some() {
                if !self.components.contains_key(name) {
                    return Err(Error::unknown_component(name));
                }
                key.insert(&**name);
            } else {
                key.remove(&**name);
            }
        }

        let unchanged = key.len() == current.components().len()
            && current.components().iter().all(|n| key.contains(&**n));
        if unchanged {
            return self.archetypes[loc.archetype.index()].update_row(loc.row, changes.assigned());
        }

        let key: Vec<Name> = key.into_iter().map(Name::from).collect();
        let old = current
            .table()
            .row(loc.row)
            .ok_or_else(|| Error::internal(format!("{entity} located past its table")))?;
        let merged = changes.apply_to(old);
        let target = self.ensure_archetype(&key)?;
        let row = self.archetypes[target.index()].push_row(&merged, &self.config)?;
        self.archetypes[loc.archetype.index()].delete_row(loc.row, &mut self.locations);
        self.locations.update(entity, EntityLocation { archetype: target, row });
        Ok(())
    }

    /// Deletes an entity, returning its last values.
    ///
    /// Deleting an entity that is not live does nothing and returns `None`.
    pub fn delete(&mut self, entity: Entity) -> Option<EntityValues> {
        let loc = self.locations.locate(entity)?;
        let archetype = &mut self.archetypes[loc.archetype.index()];
        let values = archetype.table().row(loc.row);
        archetype.delete_row(loc.row, &mut self.locations);
        self.locations.delete(entity);
        values
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Current value of a resource.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<Value> {
        let entity = *self.resources.get(name)?;
        self.get(entity, name)
    }

    /// Replaces a resource's value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` if the resource was not declared.
    pub fn set_resource(&mut self, name: &str, value: Value) -> Result<()> {
        let (key, &entity) = self
            .resources
            .get_key_value(name)
            .ok_or_else(|| Error::unknown_resource(name))?;
        let changes = Changes::new().set(Name::clone(key), value);
        self.update(entity, &changes)
    }

    /// Entity holding a resource.
    #[must_use]
    pub fn resource_entity(&self, name: &str) -> Option<Entity> {
        self.resources.get(name).copied()
    }

    /// Declared resource names in order.
    pub fn resource_names(&self) -> impl Iterator<Item = &Name> {
        self.resources.keys()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("components", &self.components.len())
            .field("archetypes", &self.archetypes.len())
            .field("entities", &self.locations.len())
            .finish_non_exhaustive()
    }
}
