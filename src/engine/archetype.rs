//! Archetype storage buckets.
//!
//! An [`Archetype`] stores every entity sharing one exact
//! (component set, tag set) signature. Component data is columnar: one
//! contiguous typed array per component type, all columns index-aligned so
//! that row `i` of every column belongs to the same entity.
//!
//! ## Invariants
//!
//! - Every entity in an archetype has exactly the components and tags of
//!   the archetype's signature; there is no partial membership.
//! - The signature is immutable after creation.
//! - Storage is append-only: rows are never removed and archetypes are
//!   never deleted during a session. Compaction is not implemented.

use std::any::Any;
use std::collections::HashMap;

use crate::engine::component::ComponentRegistry;
use crate::engine::error::EcsError;
use crate::engine::storage::{Column, TypeErasedColumn};
use crate::engine::types::{
    ArchetypeId, ArchetypeSignature, ComponentId, ComponentMask, EntityId, QuerySignature, RowId,
};

/// A storage bucket for all entities sharing one signature.
pub struct Archetype {
    archetype_id: ArchetypeId,
    signature: ArchetypeSignature,
    /// Columns keyed by component id. Only ids present in the signature
    /// have an entry.
    columns: HashMap<ComponentId, Box<dyn TypeErasedColumn>>,
    /// Row index to entity id, for diagnostics and iteration.
    entities: Vec<EntityId>,
}

impl Archetype {
    /// Creates an empty archetype for `signature`, allocating one column per
    /// component in the signature.
    pub fn new(
        archetype_id: ArchetypeId,
        signature: ArchetypeSignature,
        registry: &ComponentRegistry,
    ) -> Self {
        let mut columns = HashMap::new();
        for component_id in signature.components.iter_ids() {
            columns.insert(component_id, registry.make_column(component_id));
        }
        Self { archetype_id, signature, columns, entities: Vec::new() }
    }

    /// Stable identifier of this archetype.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeId {
        self.archetype_id
    }

    /// The archetype's immutable signature.
    #[inline]
    pub fn signature(&self) -> &ArchetypeSignature {
        &self.signature
    }

    /// Number of live entities stored.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the archetype stores component `component_id`.
    #[inline]
    pub fn has(&self, component_id: ComponentId) -> bool {
        self.signature.components.has(component_id)
    }

    /// Entity id stored at `row`, if in bounds.
    #[inline]
    pub fn entity_at(&self, row: RowId) -> Option<EntityId> {
        self.entities.get(row as usize).copied()
    }

    /// Tests whether this archetype satisfies a query's requirements.
    ///
    /// Pure subset membership on the component and tag masks; independent of
    /// declaration order on either side.
    #[inline]
    pub fn check_requirements_match(&self, requirements: &QuerySignature) -> bool {
        requirements.matches(&self.signature)
    }

    /// Appends one entity row.
    ///
    /// `values` must supply each component of the archetype's signature
    /// exactly once. A missing component, a duplicated component, a
    /// component outside the signature, or a value of the wrong dynamic
    /// type is an error; the archetype is left untouched only when the
    /// error is detected before any column was written, so callers treat
    /// failures as fatal configuration mistakes.
    pub fn push_row(
        &mut self,
        entity_id: EntityId,
        values: Vec<(ComponentId, Box<dyn Any + Send>)>,
    ) -> Result<RowId, EcsError> {
        let mut seen = ComponentMask::default();
        for (component_id, _) in &values {
            if !self.signature.components.has(*component_id) {
                return Err(EcsError::MissingComponent {
                    archetype_id: self.archetype_id,
                    component_id: *component_id,
                });
            }
            if seen.has(*component_id) {
                return Err(EcsError::DuplicateComponent {
                    archetype_id: self.archetype_id,
                    component_id: *component_id,
                });
            }
            seen.set(*component_id);
        }
        if let Some(absent) = self.signature.components.iter_ids().find(|id| !seen.has(*id)) {
            return Err(EcsError::MissingComponent {
                archetype_id: self.archetype_id,
                component_id: absent,
            });
        }

        for (component_id, value) in values {
            let Some(column) = self.columns.get_mut(&component_id) else {
                return Err(EcsError::UnregisteredComponent { component_id });
            };
            column.push_any(component_id, value)?;
        }

        let row = self.entities.len() as RowId;
        self.entities.push(entity_id);
        Ok(row)
    }

    /// Typed shared view over a component column, sized to the live entity
    /// count. `None` when `component_id` is absent from the signature or
    /// `T` does not match the column's element type.
    pub fn column_slice<T: 'static + Send + Sync>(
        &self,
        component_id: ComponentId,
    ) -> Option<&[T]> {
        self.columns
            .get(&component_id)?
            .as_any()
            .downcast_ref::<Column<T>>()
            .map(|column| column.as_slice())
    }

    /// Typed mutable view over a component column.
    pub fn column_slice_mut<T: 'static + Send + Sync>(
        &mut self,
        component_id: ComponentId,
    ) -> Option<&mut [T]> {
        self.columns
            .get_mut(&component_id)?
            .as_any_mut()
            .downcast_mut::<Column<T>>()
            .map(|column| column.as_mut_slice())
    }
}
