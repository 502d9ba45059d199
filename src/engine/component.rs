//! Component and tag registry.
//!
//! The registry assigns stable, dense [`ComponentId`] / [`TagId`] values to
//! Rust types and stores the type-erased column factories archetypes use to
//! allocate storage.
//!
//! ## Design
//!
//! - The registry is a caller-constructed object shared by `Arc`, not a
//!   process-wide static. Every `EntityManager` and the `SystemManager`
//!   hold a handle to the same instance.
//! - Registration is idempotent: re-registering a type returns the existing
//!   id.
//! - Reads vastly outnumber writes, so the tables sit behind an `RwLock`.
//!
//! ## Invariants
//!
//! - Ids are unique and stable for the registry's lifetime.
//! - Every registered component has a storage factory.
//! - Id allocation beyond `COMPONENT_CAP` / `TAG_CAP` is fatal.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::mem::{align_of, size_of};
use std::sync::RwLock;

use crate::engine::error::{fatal, EcsError};
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{ComponentId, TagId, COMPONENT_CAP, TAG_CAP};

/// Factory constructing an empty type-erased column for one component type.
type ColumnFactory = fn() -> Box<dyn TypeErasedColumn>;

fn new_column<T: 'static + Send + Sync>() -> Box<dyn TypeErasedColumn> {
    Box::new(Column::<T>::default())
}

/// Describes a registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentDesc {
    /// Dense id assigned by the registry.
    pub component_id: ComponentId,
    /// Rust type name, for diagnostics.
    pub name: &'static str,
    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,
    /// Size of the component type in bytes.
    pub size: usize,
    /// Alignment of the component type in bytes.
    pub align: usize,
}

struct RegistryTables {
    components_by_type: HashMap<TypeId, ComponentId>,
    component_descs: Vec<ComponentDesc>,
    factories: Vec<ColumnFactory>,
    tags_by_type: HashMap<TypeId, TagId>,
    tag_names: Vec<&'static str>,
}

/// Shared mapping between Rust types and dense component/tag ids.
pub struct ComponentRegistry {
    tables: RwLock<RegistryTables>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(RegistryTables {
                components_by_type: HashMap::new(),
                component_descs: Vec::new(),
                factories: Vec::new(),
                tags_by_type: HashMap::new(),
                tag_names: Vec::new(),
            }),
        }
    }

    /// Registers component type `T`, returning its id.
    ///
    /// Idempotent: a type already registered keeps its id. Fatal when the
    /// component capacity is exhausted.
    pub fn register_component<T: 'static + Send + Sync>(&self) -> ComponentId {
        let type_id = TypeId::of::<T>();
        {
            let tables = self.tables.read().unwrap();
            if let Some(&id) = tables.components_by_type.get(&type_id) {
                return id;
            }
        }

        let mut tables = self.tables.write().unwrap();
        // Re-check under the write lock; another thread may have won.
        if let Some(&id) = tables.components_by_type.get(&type_id) {
            return id;
        }

        let next = tables.component_descs.len();
        if next >= COMPONENT_CAP {
            let err = EcsError::CapacityExceeded { kind: "component", cap: COMPONENT_CAP };
            fatal!("{err}");
        }

        let id = next as ComponentId;
        tables.components_by_type.insert(type_id, id);
        tables.component_descs.push(ComponentDesc {
            component_id: id,
            name: type_name::<T>(),
            type_id,
            size: size_of::<T>(),
            align: align_of::<T>(),
        });
        tables.factories.push(new_column::<T>);
        id
    }

    /// Registers tag type `T`, returning its id. Idempotent.
    pub fn register_tag<T: 'static>(&self) -> TagId {
        let type_id = TypeId::of::<T>();
        {
            let tables = self.tables.read().unwrap();
            if let Some(&id) = tables.tags_by_type.get(&type_id) {
                return id;
            }
        }

        let mut tables = self.tables.write().unwrap();
        if let Some(&id) = tables.tags_by_type.get(&type_id) {
            return id;
        }

        let next = tables.tag_names.len();
        if next >= TAG_CAP {
            let err = EcsError::CapacityExceeded { kind: "tag", cap: TAG_CAP };
            fatal!("{err}");
        }

        let id = next as TagId;
        tables.tags_by_type.insert(type_id, id);
        tables.tag_names.push(type_name::<T>());
        id
    }

    /// Returns the id for component type `T`, if registered.
    pub fn component_id_of<T: 'static>(&self) -> Option<ComponentId> {
        self.tables
            .read()
            .unwrap()
            .components_by_type
            .get(&TypeId::of::<T>())
            .copied()
    }

    /// Returns the id for a component `TypeId`, if registered.
    pub fn component_id_of_type_id(&self, type_id: TypeId) -> Option<ComponentId> {
        self.tables
            .read()
            .unwrap()
            .components_by_type
            .get(&type_id)
            .copied()
    }

    /// Returns the id for a tag `TypeId`, if registered.
    pub fn tag_id_of_type_id(&self, type_id: TypeId) -> Option<TagId> {
        self.tables.read().unwrap().tags_by_type.get(&type_id).copied()
    }

    /// Returns the descriptor for a component id, if registered.
    pub fn component_desc(&self, component_id: ComponentId) -> Option<ComponentDesc> {
        self.tables
            .read()
            .unwrap()
            .component_descs
            .get(component_id as usize)
            .copied()
    }

    /// Allocates an empty storage column for `component_id`.
    ///
    /// Fatal when no factory exists: allocating storage for an unregistered
    /// component is a registration-time programming error.
    pub fn make_column(&self, component_id: ComponentId) -> Box<dyn TypeErasedColumn> {
        let tables = self.tables.read().unwrap();
        match tables.factories.get(component_id as usize) {
            Some(factory) => factory(),
            None => {
                let err = EcsError::UnregisteredComponent { component_id };
                fatal!("{err}");
            }
        }
    }

    /// Number of registered component types.
    pub fn component_count(&self) -> usize {
        self.tables.read().unwrap().component_descs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position(#[allow(dead_code)] f32);
    struct Velocity(#[allow(dead_code)] f32);
    struct Renderable;

    #[test]
    fn registration_is_idempotent_and_dense() {
        let registry = ComponentRegistry::new();
        let p0 = registry.register_component::<Position>();
        let v0 = registry.register_component::<Velocity>();
        let p1 = registry.register_component::<Position>();

        assert_eq!(p0, p1);
        assert_ne!(p0, v0);
        assert_eq!(registry.component_count(), 2);

        let t0 = registry.register_tag::<Renderable>();
        let t1 = registry.register_tag::<Renderable>();
        assert_eq!(t0, t1);
    }

    #[test]
    fn factories_produce_matching_columns() {
        let registry = ComponentRegistry::new();
        let id = registry.register_component::<Position>();
        let column = registry.make_column(id);
        assert_eq!(column.element_type_id(), TypeId::of::<Position>());
        assert_eq!(column.len(), 0);
    }

    #[test]
    #[should_panic]
    fn unregistered_column_allocation_is_fatal() {
        let registry = ComponentRegistry::new();
        let _ = registry.make_column(42);
    }
}
