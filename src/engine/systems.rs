//! System execution model.
//!
//! A **system** is a unit of logic scheduled by the `SystemManager`. At
//! registration time it is given three configuration hooks, invoked in a
//! fixed order:
//!
//! 1. [`System::subscribe_to_events`] registers event delegates,
//! 2. [`System::configure_execution_order`] declares before/after
//!    constraints against other system types,
//! 3. [`System::configure_query`] declares component and tag
//!    requirements.
//!
//! During a scheduler pass, [`System::execute`] receives a
//! [`SystemContext`] bundling the system's resolved query, the manager
//! set, and the task runtime, and is free to run its work inline or fan
//! it out through the composer.
//!
//! Systems never hold direct world references between passes; all world
//! access flows through the context's chunk views.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::events::EventManager;
use crate::engine::manager::EngineManagers;
use crate::engine::query::{ChunkView, EntityQuery, ExecutionContext};
use crate::engine::tasks::{TaskComposer, TaskGroup};
use crate::engine::types::SystemId;

/// A schedulable unit of logic.
///
/// Systems must be `Send + Sync` so the scheduler may hand their work to
/// worker threads.
pub trait System: Send + Sync + 'static {
    /// Declares the component and tag requirements of this system.
    fn configure_query(&mut self, query: &mut EntityQuery);

    /// Declares ordering constraints against other systems. A system
    /// that declares no constraint is excluded from the execution order
    /// and never runs.
    fn configure_execution_order(&mut self, order: &mut SystemExecutionOrder);

    /// Registers event delegates. Defaults to no subscriptions.
    fn subscribe_to_events(&mut self, events: &EventManager) {
        let _ = events;
    }

    /// Runs one pass of the system's logic.
    fn execute(&mut self, ctx: &mut SystemContext<'_>);
}

/// Everything a system may touch during one execution pass.
pub struct SystemContext<'a> {
    query: &'a EntityQuery,
    managers: &'a EngineManagers,
    composer: &'a Arc<TaskComposer>,
    group: &'a Arc<TaskGroup>,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        query: &'a EntityQuery,
        managers: &'a EngineManagers,
        composer: &'a Arc<TaskComposer>,
        group: &'a Arc<TaskGroup>,
    ) -> Self {
        Self { query, managers, composer, group }
    }

    /// The owning system's resolved query.
    pub fn query(&self) -> &'a EntityQuery {
        self.query
    }

    /// The registered entity managers and their shared event bus.
    pub fn managers(&self) -> &'a EngineManagers {
        self.managers
    }

    /// The shared task runtime; work submitted here against [`group`]
    /// is awaited by the scheduler before the next system runs.
    ///
    /// [`group`]: Self::group
    pub fn composer(&self) -> &'a Arc<TaskComposer> {
        self.composer
    }

    /// The pass-wide completion group.
    pub fn group(&self) -> &'a Arc<TaskGroup> {
        self.group
    }

    /// The event bus, for triggering or enqueueing events mid-pass.
    pub fn events(&self) -> &'a Arc<EventManager> {
        self.managers.events()
    }

    /// Materializes the typed view for one matched archetype.
    pub fn chunk(&self, context: &ExecutionContext) -> ChunkView<'a> {
        context.view(self.managers.entity_manager(context.manager_index()))
    }
}

/// Before/after constraints a system declares against other system
/// types, referenced by their full type names.
#[derive(Default)]
pub struct SystemExecutionOrder {
    before: Vec<&'static str>,
    after: Vec<&'static str>,
}

impl SystemExecutionOrder {
    /// This system runs before `S` in every pass.
    pub fn execute_before<S: System>(&mut self) {
        self.before.push(std::any::type_name::<S>());
    }

    /// This system runs after `S` in every pass.
    pub fn execute_after<S: System>(&mut self) {
        self.after.push(std::any::type_name::<S>());
    }

    /// Name-based variant of [`execute_before`](Self::execute_before);
    /// `name` must be the target's full type name.
    pub fn execute_before_name(&mut self, name: &'static str) {
        self.before.push(name);
    }

    /// Name-based variant of [`execute_after`](Self::execute_after).
    pub fn execute_after_name(&mut self, name: &'static str) {
        self.after.push(name);
    }

    /// Type names this system must precede.
    pub fn before(&self) -> &[&'static str] {
        &self.before
    }

    /// Type names this system must follow.
    pub fn after(&self) -> &[&'static str] {
        &self.after
    }

    /// `true` when no constraint was declared in either direction.
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Dense id assignment for registered system types.
#[derive(Default)]
pub struct SystemRegistry {
    ids_by_type: HashMap<TypeId, SystemId>,
    ids_by_name: HashMap<&'static str, SystemId>,
    names: Vec<&'static str>,
}

impl SystemRegistry {
    /// Returns the dense id for `S`, assigning the next one on first
    /// registration. Registering the same type again returns its
    /// existing id.
    pub fn register<S: System>(&mut self) -> SystemId {
        if let Some(&id) = self.ids_by_type.get(&TypeId::of::<S>()) {
            return id;
        }
        let id = self.names.len() as SystemId;
        let name = std::any::type_name::<S>();
        self.ids_by_type.insert(TypeId::of::<S>(), id);
        self.ids_by_name.insert(name, id);
        self.names.push(name);
        id
    }

    /// The id assigned to `S`, if it was registered.
    pub fn get_system_id<S: System>(&self) -> Option<SystemId> {
        self.ids_by_type.get(&TypeId::of::<S>()).copied()
    }

    /// Full type name of the system registered under `id`.
    pub fn get_system_name(&self, id: SystemId) -> &'static str {
        self.names[id as usize]
    }

    /// Resolves a full type name back to its id.
    pub fn id_by_name(&self, name: &str) -> Option<SystemId> {
        self.ids_by_name.get(name).copied()
    }

    /// Number of registered system types.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` when no system type was registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A [`System`] backed by closures, for logic too small to deserve its
/// own type.
///
/// The struct is generic over its run closure, so every `FnSystem`
/// instance built from a distinct closure is a distinct system type to
/// the registry.
pub struct FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) + Send + Sync + 'static,
{
    name: &'static str,
    configure_query: Box<dyn FnMut(&mut EntityQuery) + Send + Sync>,
    configure_order: Box<dyn FnMut(&mut SystemExecutionOrder) + Send + Sync>,
    run: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) + Send + Sync + 'static,
{
    /// Builds a system from its three hooks; `run` is the per-pass body.
    pub fn new(
        name: &'static str,
        configure_query: impl FnMut(&mut EntityQuery) + Send + Sync + 'static,
        configure_order: impl FnMut(&mut SystemExecutionOrder) + Send + Sync + 'static,
        run: F,
    ) -> Self {
        Self {
            name,
            configure_query: Box::new(configure_query),
            configure_order: Box::new(configure_order),
            run,
        }
    }

    /// Human-readable name, for logs and debugging.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) + Send + Sync + 'static,
{
    fn configure_query(&mut self, query: &mut EntityQuery) {
        (self.configure_query)(query);
    }

    fn configure_execution_order(&mut self, order: &mut SystemExecutionOrder) {
        (self.configure_order)(order);
    }

    fn execute(&mut self, ctx: &mut SystemContext<'_>) {
        (self.run)(ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Movement;
    struct Collision;

    impl System for Movement {
        fn configure_query(&mut self, _query: &mut EntityQuery) {}
        fn configure_execution_order(&mut self, _order: &mut SystemExecutionOrder) {}
        fn execute(&mut self, _ctx: &mut SystemContext<'_>) {}
    }

    impl System for Collision {
        fn configure_query(&mut self, _query: &mut EntityQuery) {}
        fn configure_execution_order(&mut self, _order: &mut SystemExecutionOrder) {}
        fn execute(&mut self, _ctx: &mut SystemContext<'_>) {}
    }

    #[test]
    fn registry_assigns_dense_stable_ids() {
        let mut registry = SystemRegistry::default();
        let movement = registry.register::<Movement>();
        let collision = registry.register::<Collision>();

        assert_eq!(movement, 0);
        assert_eq!(collision, 1);
        assert_eq!(registry.register::<Movement>(), movement);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.get_system_id::<Collision>(), Some(collision));
        assert_eq!(
            registry.id_by_name(std::any::type_name::<Movement>()),
            Some(movement)
        );
        assert_eq!(
            registry.get_system_name(collision),
            std::any::type_name::<Collision>()
        );
    }

    #[test]
    fn ordering_constraints_accumulate_by_type_name() {
        let mut order = SystemExecutionOrder::default();
        assert!(order.is_empty());

        order.execute_before::<Collision>();
        order.execute_after::<Movement>();

        assert_eq!(order.before(), &[std::any::type_name::<Collision>()]);
        assert_eq!(order.after(), &[std::any::type_name::<Movement>()]);
        assert!(!order.is_empty());
    }
}
