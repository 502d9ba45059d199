//! Entity handles and creation contexts.
//!
//! An [`Entity`] is a lightweight, copyable handle: a numeric identifier
//! plus the location of the archetype row currently holding its data.
//! Entities are never individually heap-allocated; identity is decoupled
//! from storage location.
//!
//! [`CreationContext`] collects the type-erased component values and tag
//! markers for a new entity. Each entry carries a monomorphized resolver
//! function, so contexts are built without a registry handle in scope and
//! ids are resolved (registering the type if needed) when the entity is
//! created.

use std::any::Any;

use crate::engine::component::ComponentRegistry;
use crate::engine::types::{ArchetypeId, ComponentId, EntityId, RowId, TagId};

/// Where an entity's data lives: an archetype index plus a row within it.
///
/// Indices, not pointers; a location is resolved against the owning
/// `EntityManager` at access time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntityLocation {
    /// Archetype holding the entity's row.
    pub archetype: ArchetypeId,
    /// Row index within that archetype.
    pub row: RowId,
}

/// A lightweight handle identifying a row within some archetype's storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Entity {
    /// Stable numeric identity of the entity.
    pub id: EntityId,
    /// Current storage location.
    pub location: EntityLocation,
}

type ComponentResolver = fn(&ComponentRegistry) -> ComponentId;
type TagResolver = fn(&ComponentRegistry) -> TagId;

/// Component values and tags supplied when creating an entity.
///
/// The set of component types and tags in the context determines the
/// archetype the entity is placed in; the entity will have exactly these
/// components, no partial membership.
#[derive(Default)]
pub struct CreationContext {
    components: Vec<(ComponentResolver, Box<dyn Any + Send>)>,
    tags: Vec<TagResolver>,
}

impl CreationContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component value.
    pub fn with_component<T: 'static + Send + Sync>(mut self, value: T) -> Self {
        self.components
            .push((ComponentRegistry::register_component::<T>, Box::new(value)));
        self
    }

    /// Adds a tag marker.
    pub fn with_tag<T: 'static>(mut self) -> Self {
        self.tags.push(ComponentRegistry::register_tag::<T>);
        self
    }

    /// Returns `true` if no components or tags were supplied.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty() && self.tags.is_empty()
    }

    /// Resolves every entry against `registry`, registering unseen types.
    pub(crate) fn resolve(
        self,
        registry: &ComponentRegistry,
    ) -> (Vec<(ComponentId, Box<dyn Any + Send>)>, Vec<TagId>) {
        let components = self
            .components
            .into_iter()
            .map(|(resolver, value)| (resolver(registry), value))
            .collect();
        let tags = self.tags.into_iter().map(|resolver| resolver(registry)).collect();
        (components, tags)
    }
}
