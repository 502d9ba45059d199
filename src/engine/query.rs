//! Entity queries and per-archetype execution contexts.
//!
//! An [`EntityQuery`] is a system's declared view over the world: component
//! requirements with an access mode, tag requirements, and the accumulated
//! list of archetypes that satisfy them. Requirements are declared once,
//! during the owning system's `configure_query`, and are immutable
//! afterwards.
//!
//! Matching is incremental and monotonic: on every scheduler pass only the
//! archetypes created since the last checkpoint are tested, and once an
//! archetype joins a query it is never removed. This is correct because
//! archetype signatures are immutable after creation.
//!
//! An [`ExecutionContext`] is the per-archetype cursor a system hands to
//! the task runtime: it identifies one matched archetype by index and
//! materializes typed component views on demand through [`ChunkView`].

use crate::engine::component::ComponentRegistry;
use crate::engine::error::fatal;
use crate::engine::manager::{EngineManagers, EntityManager};
use crate::engine::types::{AccessMode, ArchetypeId, ComponentId, QuerySignature, TagId};

type ComponentResolver = fn(&ComponentRegistry) -> ComponentId;
type TagResolver = fn(&ComponentRegistry) -> TagId;

/// A system's declared component/tag requirements plus the accumulated
/// set of matching archetypes.
#[derive(Default)]
pub struct EntityQuery {
    component_requirements: Vec<(ComponentResolver, AccessMode)>,
    tag_requirements: Vec<TagResolver>,
    signature: QuerySignature,
    resolved: bool,
    /// Matched archetypes as (manager index, archetype id), in discovery
    /// order. Index-aligned with `contexts` for the query's lifetime.
    matched: Vec<(usize, ArchetypeId)>,
    contexts: Vec<ExecutionContext>,
}

impl EntityQuery {
    /// Declares that matched archetypes must store component `T`, accessed
    /// with `mode`.
    ///
    /// Must be called during `configure_query`; declaring requirements
    /// after the query has been resolved is a fatal configuration error.
    pub fn add_component_requirement<T: 'static + Send + Sync>(&mut self, mode: AccessMode) {
        if self.resolved {
            fatal!("query requirements are immutable after configure_query");
        }
        self.component_requirements
            .push((ComponentRegistry::register_component::<T>, mode));
    }

    /// Declares that matched archetypes must carry tag `T`.
    pub fn add_tag_requirement<T: 'static>(&mut self) {
        if self.resolved {
            fatal!("query requirements are immutable after configure_query");
        }
        self.tag_requirements.push(ComponentRegistry::register_tag::<T>);
    }

    /// Returns `true` if no requirements were declared.
    pub fn is_empty(&self) -> bool {
        self.component_requirements.is_empty() && self.tag_requirements.is_empty()
    }

    /// The resolved requirement signature.
    pub fn signature(&self) -> &QuerySignature {
        &self.signature
    }

    /// Resolves declared requirements into dense-id masks, registering
    /// unseen types. Called once by the scheduler at system registration.
    pub(crate) fn resolve(&mut self, registry: &ComponentRegistry) {
        for (resolver, mode) in &self.component_requirements {
            let component_id = resolver(registry);
            match mode {
                AccessMode::ReadOnly => self.signature.read.set(component_id),
                AccessMode::ReadWrite => self.signature.write.set(component_id),
            }
        }
        for resolver in &self.tag_requirements {
            self.signature.tags.set(resolver(registry));
        }
        self.resolved = true;
    }

    /// Tests newly created archetypes and appends matches.
    ///
    /// `fresh` holds (manager index, created archetype ids) pairs snapshot
    /// by the scheduler. An archetype joins the query at most once; the
    /// matched list and the context list stay index-aligned.
    pub(crate) fn update_matches(
        &mut self,
        managers: &EngineManagers,
        fresh: &[(usize, Vec<ArchetypeId>)],
    ) {
        for (manager_index, archetype_ids) in fresh {
            let manager = managers.entity_manager(*manager_index);
            for &archetype_id in archetype_ids {
                let key = (*manager_index, archetype_id);
                if self.matched.contains(&key) {
                    continue;
                }
                if manager.archetype(archetype_id).check_requirements_match(&self.signature) {
                    self.matched.push(key);
                    self.contexts.push(ExecutionContext {
                        manager_index: *manager_index,
                        archetype: archetype_id,
                    });
                }
            }
        }
    }

    /// Matched archetypes in discovery order.
    pub fn archetypes(&self) -> &[(usize, ArchetypeId)] {
        &self.matched
    }

    /// Invokes `f` once per matched execution context, in discovery order.
    ///
    /// No ordering guarantee across archetypes is promised to callers
    /// beyond discovery order being stable for the query's lifetime.
    pub fn for_each_chunk(&self, mut f: impl FnMut(&ExecutionContext)) {
        for context in &self.contexts {
            f(context);
        }
    }
}

/// A per-archetype, per-system cursor: one matched archetype identified by
/// manager and archetype index.
///
/// Copyable so it can be captured by dispatched task closures; views are
/// materialized at access time via [`ChunkView`], never stored as raw
/// pointers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    manager_index: usize,
    archetype: ArchetypeId,
}

impl ExecutionContext {
    /// Index of the owning manager within the `EngineManagers` bundle.
    pub fn manager_index(&self) -> usize {
        self.manager_index
    }

    /// The matched archetype.
    pub fn archetype_id(&self) -> ArchetypeId {
        self.archetype
    }

    /// Materializes a typed view over the matched archetype.
    pub fn view<'a>(&self, manager: &'a EntityManager) -> ChunkView<'a> {
        ChunkView { manager, archetype: self.archetype }
    }

    /// Live entity count of the matched archetype.
    pub fn entity_count(&self, manager: &EntityManager) -> usize {
        manager.archetype(self.archetype).entity_count()
    }
}

/// Typed component views over one archetype's storage.
///
/// Views are sized to the archetype's live entity count at the time they
/// are taken; index `i` corresponds to the `i`-th entity physically stored
/// in the archetype. A view must not be held across a structural mutation
/// that adds entities to the same archetype during the same pass.
pub struct ChunkView<'a> {
    manager: &'a EntityManager,
    archetype: ArchetypeId,
}

impl<'a> ChunkView<'a> {
    /// Total entities in this archetype.
    pub fn len(&self) -> usize {
        self.manager.archetype(self.archetype).entity_count()
    }

    /// Returns `true` if the archetype holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only view over component `T`.
    ///
    /// Fatal when `T` is not part of the archetype's signature.
    pub fn read<T: 'static + Send + Sync>(&self) -> &'a [T] {
        let Some(component_id) = self.manager.registry().component_id_of::<T>() else {
            fatal!("chunk view: component type {} was never registered", std::any::type_name::<T>());
        };
        match self.manager.archetype(self.archetype).column_slice::<T>(component_id) {
            Some(slice) => slice,
            None => fatal!(
                "chunk view: archetype {} does not store {}",
                self.archetype,
                std::any::type_name::<T>()
            ),
        }
    }

    /// Mutable view over component `T`.
    ///
    /// Fatal when `T` is not part of the archetype's signature. Access
    /// modes declared on the owning query are not enforced here.
    ///
    /// # Safety
    ///
    /// The returned slice is an exclusive borrow obtained through shared
    /// interior mutability. For its entire lifetime the caller must
    /// guarantee no other reference into the same column of the same
    /// archetype exists, on any thread. The dependency graph orders whole
    /// systems against each other; within one system, take the mutable
    /// view at most once per column per archetype, or use [`cursor`] when
    /// fanning writes out across dispatched units.
    ///
    /// [`cursor`]: Self::cursor
    pub unsafe fn write<T: 'static + Send + Sync>(&self) -> &'a mut [T] {
        let Some(component_id) = self.manager.registry().component_id_of::<T>() else {
            fatal!("chunk view: component type {} was never registered", std::any::type_name::<T>());
        };
        let archetype = unsafe { self.manager.archetype_mut(self.archetype) };
        match archetype.column_slice_mut::<T>(component_id) {
            Some(slice) => slice,
            None => fatal!(
                "chunk view: archetype {} does not store {}",
                self.archetype,
                std::any::type_name::<T>()
            ),
        }
    }

    /// Raw cursor over component `T`, for dispatched range units.
    ///
    /// A cursor carries no borrow, so it can be captured by the closures a
    /// system hands to the task composer while sibling units work on other
    /// rows of the same column.
    ///
    /// # Safety
    ///
    /// No reference into the column may be live when the cursor is taken,
    /// and the rows later accessed through it must not be touched by any
    /// other cursor or reference until the dispatching group completes.
    /// Taking one cursor per column before dispatch and indexing each unit
    /// at its own `global_index` satisfies both conditions.
    pub unsafe fn cursor<T: 'static + Send + Sync>(&self) -> ColumnCursor<T> {
        let slice = unsafe { self.write::<T>() };
        ColumnCursor { base: slice.as_mut_ptr(), len: slice.len() }
    }
}

/// Unsynchronized per-row access to one component column.
///
/// Produced by [`ChunkView::cursor`]; valid until the archetype's storage
/// is structurally mutated.
pub struct ColumnCursor<T> {
    base: *mut T,
    len: usize,
}

impl<T> Clone for ColumnCursor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ColumnCursor<T> {}

// The cursor is a dumb pointer; the exclusivity contract travels with the
// unsafe accessors below. Rows may be read and written from any worker
// thread, so both component bounds are required.
unsafe impl<T: Send + Sync> Send for ColumnCursor<T> {}
unsafe impl<T: Send + Sync> Sync for ColumnCursor<T> {}

impl<T> ColumnCursor<T> {
    /// Rows addressable through this cursor.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the column holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shared reference to row `index`.
    ///
    /// # Safety
    ///
    /// `index` must be in bounds and the row must not be written through
    /// any other cursor or reference while the returned borrow is live.
    pub unsafe fn get(&self, index: usize) -> &T {
        debug_assert!(index < self.len);
        unsafe { &*self.base.add(index) }
    }

    /// Exclusive reference to row `index`.
    ///
    /// # Safety
    ///
    /// `index` must be in bounds and no other access to the same row may
    /// be live while the returned borrow is. Disjoint rows of one column
    /// may be borrowed concurrently through separate calls.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, index: usize) -> &mut T {
        debug_assert!(index < self.len);
        unsafe { &mut *self.base.add(index) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::entity::CreationContext;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Mass(f32);

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Charge(f32);

    struct Static;

    fn setup() -> (EngineManagers, Arc<EntityManager>) {
        let registry = Arc::new(ComponentRegistry::new());
        let manager = Arc::new(EntityManager::new(registry));
        let mut managers = EngineManagers::new();
        managers.add_entity_manager(manager.clone());
        (managers, manager)
    }

    #[test]
    fn matches_are_incremental_and_monotonic() {
        let (managers, manager) = setup();

        let mut query = EntityQuery::default();
        query.add_component_requirement::<Mass>(AccessMode::ReadOnly);
        query.resolve(manager.registry());

        let _with_mass =
            manager.create_entity(CreationContext::new().with_component(Mass(1.0)));
        let _without =
            manager.create_entity(CreationContext::new().with_component(Charge(0.5)));

        let fresh = vec![(0usize, manager.new_archetypes())];
        query.update_matches(&managers, &fresh);
        assert_eq!(query.archetypes().len(), 1);

        // Re-presenting the same snapshot must not duplicate the match.
        query.update_matches(&managers, &fresh);
        assert_eq!(query.archetypes().len(), 1);
    }

    #[test]
    fn tag_requirements_filter_archetypes() {
        let (managers, manager) = setup();

        let mut query = EntityQuery::default();
        query.add_component_requirement::<Mass>(AccessMode::ReadOnly);
        query.add_tag_requirement::<Static>();
        query.resolve(manager.registry());

        let _untagged =
            manager.create_entity(CreationContext::new().with_component(Mass(1.0)));
        let _tagged = manager.create_entity(
            CreationContext::new().with_component(Mass(2.0)).with_tag::<Static>(),
        );

        let fresh = vec![(0usize, manager.new_archetypes())];
        query.update_matches(&managers, &fresh);
        assert_eq!(query.archetypes().len(), 1);

        let context = {
            let mut found = None;
            query.for_each_chunk(|ctx| found = Some(*ctx));
            found.unwrap()
        };
        let view = context.view(&manager);
        assert_eq!(view.read::<Mass>(), &[Mass(2.0)]);
    }

    #[test]
    fn views_are_index_aligned_with_storage() {
        let (managers, manager) = setup();

        let mut query = EntityQuery::default();
        query.add_component_requirement::<Mass>(AccessMode::ReadWrite);
        query.add_component_requirement::<Charge>(AccessMode::ReadOnly);
        query.resolve(manager.registry());

        for i in 0..4 {
            manager.create_entity(
                CreationContext::new()
                    .with_component(Mass(i as f32))
                    .with_component(Charge(-(i as f32))),
            );
        }

        let fresh = vec![(0usize, manager.new_archetypes())];
        query.update_matches(&managers, &fresh);

        query.for_each_chunk(|ctx| {
            let view = ctx.view(&manager);
            assert_eq!(view.len(), 4);
            // Sole access to both columns inside this closure.
            let masses = unsafe { view.write::<Mass>() };
            let charges = view.read::<Charge>();
            for i in 0..view.len() {
                masses[i].0 += charges[i].0;
            }
        });

        query.for_each_chunk(|ctx| {
            let view = ctx.view(&manager);
            assert_eq!(view.read::<Mass>()[3], Mass(0.0));
        });
    }

    #[test]
    fn cursors_support_disjoint_parallel_writes() {
        use crate::engine::tasks::{TaskComposer, TaskGroup};

        let (managers, manager) = setup();

        let mut query = EntityQuery::default();
        query.add_component_requirement::<Mass>(AccessMode::ReadWrite);
        query.add_component_requirement::<Charge>(AccessMode::ReadOnly);
        query.resolve(manager.registry());

        for i in 0..64 {
            manager.create_entity(
                CreationContext::new()
                    .with_component(Mass(i as f32))
                    .with_component(Charge(2.0)),
            );
        }
        let fresh = vec![(0usize, manager.new_archetypes())];
        query.update_matches(&managers, &fresh);

        let composer = TaskComposer::new(4);
        let group = TaskGroup::new();
        query.for_each_chunk(|ctx| {
            let view = ctx.view(&manager);
            // One cursor per column, taken before dispatch; each unit
            // touches only its own row.
            let masses = unsafe { view.cursor::<Mass>() };
            let charges = unsafe { view.cursor::<Charge>() };
            composer.dispatch(&group, view.len(), 8, move |args| unsafe {
                masses.get_mut(args.global_index).0 += charges.get(args.global_index).0;
            });
        });
        composer.wait(&group);

        query.for_each_chunk(|ctx| {
            let view = ctx.view(&manager);
            let masses = view.read::<Mass>();
            for (i, mass) in masses.iter().enumerate() {
                assert_eq!(*mass, Mass(i as f32 + 2.0));
            }
        });
    }
}
