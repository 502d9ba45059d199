//! Entity and archetype ownership.
//!
//! [`EntityManager`] owns the full archetype set, the directory mapping
//! signatures to archetypes, and the list of archetypes created since the
//! last scheduler checkpoint. It is the only entry point through which
//! entity storage is structurally mutated.
//!
//! ## Concurrency model
//!
//! The manager is internally mutable and uses `UnsafeCell` so shared (`&`)
//! and exclusive access paths can coexist. Safety is enforced by API
//! discipline, not by the borrow checker:
//!
//! - Structural mutations (`create_archetype`, `create_entity`) are
//!   serialized by an internal mutex, so concurrent callers converge on one
//!   archetype per signature and row insertion never interleaves.
//! - Component reads and writes during system execution are **not**
//!   synchronized here. Every path that mutates component data through a
//!   shared reference is an `unsafe fn` whose contract is exclusivity: no
//!   conflicting reference into the same column may be live across the
//!   call. Two systems touching the same component of the same entities
//!   in one pass must be ordered by the system dependency graph; the
//!   declared access modes on queries are documentation, not a runtime
//!   check.
//! - Typed views are resolved from archetype indices at access time and
//!   must not be held across a structural mutation of the same archetype.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::engine::archetype::Archetype;
use crate::engine::component::ComponentRegistry;
use crate::engine::entity::{CreationContext, Entity, EntityLocation};
use crate::engine::error::fatal;
use crate::engine::events::EventManager;
use crate::engine::types::{ArchetypeId, ArchetypeSignature};

struct WorldState {
    archetypes: Vec<Archetype>,
    directory: HashMap<ArchetypeSignature, ArchetypeId>,
    /// Archetypes that received their first-ever entity since the last
    /// scheduler checkpoint. Drained by `SystemManager::execute` after a
    /// full ordered pass.
    last_created: Vec<ArchetypeId>,
}

/// Owns entity identity and chunked component storage keyed by signature.
pub struct EntityManager {
    registry: Arc<ComponentRegistry>,
    inner: UnsafeCell<WorldState>,
    structural: Mutex<()>,
    next_entity: AtomicU64,
}

// Shared access relies on the discipline documented at the module level:
// structural mutation is mutex-serialized and execution-time component
// access is ordered by the scheduler's dependency graph.
unsafe impl Send for EntityManager {}
unsafe impl Sync for EntityManager {}

impl EntityManager {
    /// Creates an empty manager sharing `registry` for type resolution.
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            inner: UnsafeCell::new(WorldState {
                archetypes: Vec::new(),
                directory: HashMap::new(),
                last_created: Vec::new(),
            }),
            structural: Mutex::new(()),
            next_entity: AtomicU64::new(0),
        }
    }

    /// The component registry this manager resolves types against.
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    #[inline]
    fn state(&self) -> &WorldState {
        unsafe { &*self.inner.get() }
    }

    /// Exclusive state access. Callers must hold the structural lock or
    /// otherwise guarantee no aliasing access is live.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    unsafe fn state_mut(&self) -> &mut WorldState {
        unsafe { &mut *self.inner.get() }
    }

    /// Resolves or creates the archetype for `signature`.
    ///
    /// Idempotent: re-requesting an existing signature returns the existing
    /// archetype. Safe under concurrent callers; two systems creating the
    /// same signature simultaneously converge on one archetype.
    pub fn create_archetype(&self, signature: ArchetypeSignature) -> ArchetypeId {
        let _guard = self.structural.lock().unwrap();
        let state = unsafe { self.state_mut() };
        Self::get_or_create_archetype(state, &self.registry, signature)
    }

    fn get_or_create_archetype(
        state: &mut WorldState,
        registry: &ComponentRegistry,
        signature: ArchetypeSignature,
    ) -> ArchetypeId {
        if let Some(&id) = state.directory.get(&signature) {
            return id;
        }
        let id = state.archetypes.len() as ArchetypeId;
        state.directory.insert(signature, id);
        state.archetypes.push(Archetype::new(id, signature, registry));
        id
    }

    /// Creates an entity from the supplied components and tags.
    ///
    /// Resolves (or creates) the matching archetype, appends a row, and
    /// returns a fresh handle. The archetype is recorded for incremental
    /// query discovery when this is its first-ever entity. A component
    /// value of the wrong type or an inconsistent context is a fatal
    /// configuration error.
    pub fn create_entity(&self, context: CreationContext) -> Entity {
        let (components, tags) = context.resolve(&self.registry);

        let mut signature = ArchetypeSignature::default();
        for (component_id, _) in &components {
            signature.components.set(*component_id);
        }
        for tag_id in &tags {
            signature.tags.set(*tag_id);
        }

        let id = self.next_entity.fetch_add(1, Ordering::Relaxed);

        let _guard = self.structural.lock().unwrap();
        let state = unsafe { self.state_mut() };
        let archetype_id = Self::get_or_create_archetype(state, &self.registry, signature);

        let archetype = &mut state.archetypes[archetype_id as usize];
        let row = match archetype.push_row(id, components) {
            Ok(row) => row,
            Err(err) => fatal!("create_entity failed: {err}"),
        };

        if archetype.entity_count() == 1 {
            state.last_created.push(archetype_id);
        }

        Entity { id, location: EntityLocation { archetype: archetype_id, row } }
    }

    /// Returns a reference to the component `T` of `entity`.
    ///
    /// Fatal when `T` is not part of the entity's archetype or was never
    /// registered: both indicate a registration-time programming mistake.
    pub fn get_component<T: 'static + Send + Sync>(&self, entity: Entity) -> &T {
        let Some(component_id) = self.registry.component_id_of::<T>() else {
            fatal!(
                "get_component: component type {} was never registered",
                std::any::type_name::<T>()
            );
        };

        let state = self.state();
        let archetype = &state.archetypes[entity.location.archetype as usize];
        let Some(slice) = archetype.column_slice::<T>(component_id) else {
            fatal!(
                "get_component: archetype {} does not store {}",
                archetype.archetype_id(),
                std::any::type_name::<T>()
            );
        };
        &slice[entity.location.row as usize]
    }

    /// Overwrites the component `T` of `entity` with `value`.
    ///
    /// Fatal when `T` is not part of the entity's archetype.
    ///
    /// # Safety
    ///
    /// This path mutates through shared interior mutability with no
    /// synchronization. The caller must guarantee that no reference into
    /// the same column (from [`Self::get_component`] or a chunk view) is
    /// live across this call, and that no other thread accesses the slot
    /// concurrently. Between systems the dependency graph provides that
    /// ordering.
    pub unsafe fn set_entity_component<T: 'static + Send + Sync>(&self, entity: Entity, value: T) {
        let Some(component_id) = self.registry.component_id_of::<T>() else {
            fatal!(
                "set_entity_component: component type {} was never registered",
                std::any::type_name::<T>()
            );
        };

        let state = unsafe { self.state_mut() };
        let archetype = &mut state.archetypes[entity.location.archetype as usize];
        let Some(slice) = archetype.column_slice_mut::<T>(component_id) else {
            fatal!(
                "set_entity_component: archetype {} does not store {}",
                archetype.archetype_id(),
                std::any::type_name::<T>()
            );
        };
        slice[entity.location.row as usize] = value;
    }

    /// Shared view of one archetype.
    pub fn archetype(&self, archetype_id: ArchetypeId) -> &Archetype {
        &self.state().archetypes[archetype_id as usize]
    }

    /// Mutable view of one archetype, obtained through interior mutability.
    ///
    /// # Safety
    ///
    /// The caller must guarantee no conflicting reference into the same
    /// archetype is live for the returned borrow's duration; see the
    /// module level concurrency notes.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn archetype_mut(&self, archetype_id: ArchetypeId) -> &mut Archetype {
        let state = unsafe { self.state_mut() };
        &mut state.archetypes[archetype_id as usize]
    }

    /// Number of archetypes created so far.
    pub fn archetype_count(&self) -> usize {
        self.state().archetypes.len()
    }

    /// Total live entities across all archetypes.
    pub fn entity_count(&self) -> usize {
        self.state().archetypes.iter().map(Archetype::entity_count).sum()
    }

    /// Returns `true` if archetypes were created since the last checkpoint.
    pub fn has_new_archetypes(&self) -> bool {
        !self.state().last_created.is_empty()
    }

    /// Snapshot of archetypes created since the last checkpoint.
    pub fn new_archetypes(&self) -> Vec<ArchetypeId> {
        self.state().last_created.clone()
    }

    /// Clears the created-archetype list. Called by the scheduler after
    /// every system has had a chance to match against it.
    pub fn clear_new_archetypes(&self) {
        let _guard = self.structural.lock().unwrap();
        let state = unsafe { self.state_mut() };
        state.last_created.clear();
    }
}

/// The collaborator bundle handed to systems during execution: the
/// registered entity managers plus the event bus boundary.
#[derive(Clone, Default)]
pub struct EngineManagers {
    entity_managers: Vec<Arc<EntityManager>>,
    events: Arc<EventManager>,
}

impl EngineManagers {
    /// Creates an empty bundle with a fresh event bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity manager; returns its index within the bundle.
    pub fn add_entity_manager(&mut self, manager: Arc<EntityManager>) -> usize {
        self.entity_managers.push(manager);
        self.entity_managers.len() - 1
    }

    /// Entity manager at `index`.
    pub fn entity_manager(&self, index: usize) -> &Arc<EntityManager> {
        &self.entity_managers[index]
    }

    /// All registered entity managers, in registration order.
    pub fn entity_managers(&self) -> &[Arc<EntityManager>] {
        &self.entity_managers
    }

    /// The event bus boundary.
    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }
}
