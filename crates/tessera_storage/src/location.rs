//! Entity location table.
//!
//! Maps each entity id to the archetype and row holding its data. Ids of
//! deleted entities go on a free list and are reused most recently freed
//! first before any new id is minted.

use tessera_foundation::Entity;

use crate::archetype::ArchetypeId;

/// Where an entity's row lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// Archetype owning the row.
    pub archetype: ArchetypeId,
    /// Row within the archetype's table.
    pub row: usize,
}

/// Entity id to location map with LIFO id reuse.
#[derive(Clone, Debug, Default)]
pub struct EntityLocationTable {
    /// Slot per id ever minted; `None` while the id is free.
    slots: Vec<Option<EntityLocation>>,
    /// Free ids, most recently freed last.
    free_list: Vec<u32>,
    /// Count of live entities.
    live_count: usize,
}

impl EntityLocationTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with room for `capacity` ids.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// The id the next [`Self::create`] will return.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn peek_next(&self) -> Entity {
        match self.free_list.last() {
            Some(&index) => Entity::new(index),
            None => Entity::new(self.slots.len() as u32),
        }
    }

    /// Allocates an id located at `location`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn create(&mut self, location: EntityLocation) -> Entity {
        self.live_count += 1;
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = Some(location);
            Entity::new(index)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(location));
            Entity::new(index)
        }
    }

    /// Points a live entity at a new location. Returns false if the entity
    /// is not live.
    pub fn update(&mut self, entity: Entity, location: EntityLocation) -> bool {
        match self.slots.get_mut(entity.slot()) {
            Some(slot) if slot.is_some() => {
                *slot = Some(location);
                true
            }
            _ => false,
        }
    }

    /// Frees a live entity's id, returning its last location.
    ///
    /// Deleting an entity that is not live does nothing.
    pub fn delete(&mut self, entity: Entity) -> Option<EntityLocation> {
        let location = self.slots.get_mut(entity.slot())?.take()?;
        self.free_list.push(entity.index());
        self.live_count -= 1;
        Some(location)
    }

    /// Resolves an entity, or `None` if it was never created or is deleted.
    #[must_use]
    pub fn locate(&self, entity: Entity) -> Option<EntityLocation> {
        self.slots.get(entity.slot()).copied().flatten()
    }

    /// Number of live entities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no entity is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Iterates over live entities and their locations in id order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (Entity, EntityLocation)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|loc| (Entity::new(i as u32), loc)))
    }
}
