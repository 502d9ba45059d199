//! System registration and ordered execution.
//!
//! [`SystemManager`] owns the registered systems, their queries, their
//! ordering declarations, and the derived execution order. It is an
//! ordinary caller-constructed value; an application may run several
//! independent schedulers over disjoint manager sets.
//!
//! Ordering is declarative: each system names the system types it must
//! run before or after, and the manager rebuilds a dependency graph and
//! re-sorts before the first pass after a registration. A system that
//! declares no
//! constraint in either direction is left out of the execution order and
//! never runs; participation in a pass is always an explicit choice.
//!
//! One `execute` call is one pass. The pass snapshots the archetypes
//! created since the previous pass, presents them to every system's
//! query exactly once, runs the systems in order with a shared task
//! group awaited between systems, and finally clears the created lists.

use std::sync::Arc;

use crate::engine::component::ComponentRegistry;
use crate::engine::dag::Dag;
use crate::engine::error::{fatal, EcsError};
use crate::engine::manager::EngineManagers;
use crate::engine::query::EntityQuery;
use crate::engine::systems::{System, SystemContext, SystemExecutionOrder, SystemRegistry};
use crate::engine::tasks::{TaskComposer, TaskGroup};
use crate::engine::types::{ArchetypeId, SystemId};

struct RegisteredSystem {
    system: Box<dyn System>,
    query: EntityQuery,
    order: SystemExecutionOrder,
}

/// Owns registered systems and drives scheduler passes.
pub struct SystemManager {
    registry: Arc<ComponentRegistry>,
    managers: EngineManagers,
    composer: Arc<TaskComposer>,
    type_table: SystemRegistry,
    systems: Vec<RegisteredSystem>,
    execution_order: Vec<SystemId>,
    order_dirty: bool,
}

impl SystemManager {
    /// Creates an empty scheduler over `managers`, resolving component
    /// types against `registry` and running work on `composer`.
    pub fn new(
        registry: Arc<ComponentRegistry>,
        managers: EngineManagers,
        composer: Arc<TaskComposer>,
    ) -> Self {
        Self {
            registry,
            managers,
            composer,
            type_table: SystemRegistry::default(),
            systems: Vec::new(),
            execution_order: Vec::new(),
            order_dirty: false,
        }
    }

    /// The manager set systems execute against.
    pub fn managers(&self) -> &EngineManagers {
        &self.managers
    }

    /// The shared task runtime.
    pub fn composer(&self) -> &Arc<TaskComposer> {
        &self.composer
    }

    /// System ids in the order they will execute. Systems with no
    /// ordering declaration do not appear. Stale until
    /// [`generate_execution_order`](Self::generate_execution_order) or
    /// [`execute`](Self::execute) runs after the latest registration.
    pub fn execution_order(&self) -> &[SystemId] {
        &self.execution_order
    }

    /// Number of registered systems, ordered or not.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Registers `system` and marks the execution order for rebuilding
    /// before the next pass. Ordering declarations may name system types
    /// that register later, as long as they exist by then.
    ///
    /// The configuration hooks run in a fixed order: event
    /// subscriptions, then ordering declarations, then the query. The
    /// query is resolved against the component registry immediately and
    /// seeded with every archetype that already exists, so registration
    /// order relative to entity creation does not change what a system
    /// observes.
    ///
    /// Registering a system type that is already present replaces the
    /// previous instance under the same id.
    pub fn register_system<S: System>(&mut self, mut system: S) {
        let id = self.type_table.register::<S>();
        let name = self.type_table.get_system_name(id);

        system.subscribe_to_events(self.managers.events());

        let mut order = SystemExecutionOrder::default();
        system.configure_execution_order(&mut order);

        let mut query = EntityQuery::default();
        system.configure_query(&mut query);
        query.resolve(&self.registry);

        let existing: Vec<(usize, Vec<ArchetypeId>)> = self
            .managers
            .entity_managers()
            .iter()
            .enumerate()
            .map(|(index, manager)| {
                (index, (0..manager.archetype_count()).map(|a| a as ArchetypeId).collect())
            })
            .collect();
        query.update_matches(&self.managers, &existing);

        let entry = RegisteredSystem { system: Box::new(system), query, order };
        if (id as usize) < self.systems.len() {
            log::debug!("replacing system {name} under id {id}");
            self.systems[id as usize] = entry;
        } else {
            log::debug!("registered system {name} as id {id}");
            self.systems.push(entry);
        }

        self.order_dirty = true;
    }

    /// Rebuilds the dependency graph from every system's declarations
    /// and topologically sorts it. Called automatically by
    /// [`execute`](Self::execute) when registrations happened since the
    /// last rebuild.
    ///
    /// Naming a system type that was never registered is a fatal
    /// configuration error. Contradictory declarations are not detected;
    /// a cycle degrades to an arbitrary but stable relative order.
    pub fn generate_execution_order(&mut self) {
        let mut dag = Dag::new(self.systems.len());
        for (index, entry) in self.systems.iter().enumerate() {
            let name = self.type_table.get_system_name(index as SystemId);
            for &target in entry.order.before() {
                dag.add_edge(index, self.resolve_target(name, target) as usize);
            }
            for &target in entry.order.after() {
                dag.add_edge(self.resolve_target(name, target) as usize, index);
            }
        }

        self.execution_order = dag
            .topological_sort()
            .into_iter()
            .filter(|&index| !self.systems[index].order.is_empty())
            .map(|index| index as SystemId)
            .collect();
        self.order_dirty = false;
    }

    fn resolve_target(&self, declaring: &str, target: &str) -> SystemId {
        match self.type_table.id_by_name(target) {
            Some(id) => id,
            None => {
                let err = EcsError::UnknownSystem { name: target.to_owned() };
                fatal!("system {declaring}: {err}");
            }
        }
    }

    /// Runs one scheduler pass.
    pub fn execute(&mut self) {
        if self.order_dirty {
            self.generate_execution_order();
        }

        let fresh: Vec<(usize, Vec<ArchetypeId>)> = self
            .managers
            .entity_managers()
            .iter()
            .enumerate()
            .filter(|(_, manager)| manager.has_new_archetypes())
            .map(|(index, manager)| (index, manager.new_archetypes()))
            .collect();

        let group = TaskGroup::new();
        for index in 0..self.execution_order.len() {
            let id = self.execution_order[index] as usize;
            let entry = &mut self.systems[id];
            entry.query.update_matches(&self.managers, &fresh);

            let mut ctx =
                SystemContext::new(&entry.query, &self.managers, &self.composer, &group);
            entry.system.execute(&mut ctx);
            self.composer.wait(&group);
        }

        // Each created archetype has now been presented to every query
        // in this pass exactly once.
        for (index, _) in &fresh {
            self.managers.entity_manager(*index).clear_new_archetypes();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::engine::entity::CreationContext;
    use crate::engine::manager::EntityManager;
    use crate::engine::types::AccessMode;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Position(f32);

    fn setup() -> SystemManager {
        let registry = Arc::new(ComponentRegistry::new());
        let manager = Arc::new(EntityManager::new(registry.clone()));
        let mut managers = EngineManagers::new();
        managers.add_entity_manager(manager);
        SystemManager::new(registry, managers, Arc::new(TaskComposer::new(2)))
    }

    type Trace = Arc<Mutex<Vec<&'static str>>>;

    struct First(Option<Trace>);
    struct Second(Option<Trace>);
    struct Third(Option<Trace>);
    struct Unordered(Option<Trace>);

    fn record(trace: &Option<Trace>, label: &'static str) {
        if let Some(trace) = trace {
            trace.lock().unwrap().push(label);
        }
    }

    impl System for First {
        fn configure_query(&mut self, _query: &mut EntityQuery) {}
        fn configure_execution_order(&mut self, order: &mut SystemExecutionOrder) {
            order.execute_before::<Second>();
        }
        fn execute(&mut self, _ctx: &mut SystemContext<'_>) {
            record(&self.0, "first");
        }
    }

    impl System for Second {
        fn configure_query(&mut self, _query: &mut EntityQuery) {}
        fn configure_execution_order(&mut self, order: &mut SystemExecutionOrder) {
            order.execute_before::<Third>();
        }
        fn execute(&mut self, _ctx: &mut SystemContext<'_>) {
            record(&self.0, "second");
        }
    }

    impl System for Third {
        fn configure_query(&mut self, _query: &mut EntityQuery) {}
        fn configure_execution_order(&mut self, order: &mut SystemExecutionOrder) {
            order.execute_after::<First>();
        }
        fn execute(&mut self, _ctx: &mut SystemContext<'_>) {
            record(&self.0, "third");
        }
    }

    impl System for Unordered {
        fn configure_query(&mut self, _query: &mut EntityQuery) {}
        fn configure_execution_order(&mut self, _order: &mut SystemExecutionOrder) {}
        fn execute(&mut self, _ctx: &mut SystemContext<'_>) {
            record(&self.0, "unordered");
        }
    }

    #[test]
    fn declared_constraints_order_the_pass() {
        let mut scheduler = setup();
        let trace: Trace = Arc::default();
        scheduler.register_system(Third(Some(trace.clone())));
        scheduler.register_system(First(Some(trace.clone())));
        scheduler.register_system(Second(Some(trace.clone())));
        scheduler.register_system(Unordered(Some(trace.clone())));

        scheduler.execute();

        assert_eq!(*trace.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn systems_without_constraints_never_run() {
        let mut scheduler = setup();
        scheduler.register_system(Unordered(None));
        scheduler.generate_execution_order();

        assert_eq!(scheduler.system_count(), 1);
        assert!(scheduler.execution_order().is_empty());
    }

    struct OrdersAgainstMissing;

    impl System for OrdersAgainstMissing {
        fn configure_query(&mut self, _query: &mut EntityQuery) {}
        fn configure_execution_order(&mut self, order: &mut SystemExecutionOrder) {
            order.execute_before_name("app::systems::NoSuchSystem");
        }
        fn execute(&mut self, _ctx: &mut SystemContext<'_>) {}
    }

    #[test]
    #[should_panic]
    fn unknown_ordering_target_is_fatal() {
        let mut scheduler = setup();
        scheduler.register_system(OrdersAgainstMissing);
        scheduler.generate_execution_order();
    }

    /// Declares nothing itself; exists so other test systems have a
    /// registered ordering target.
    struct Anchor;

    impl System for Anchor {
        fn configure_query(&mut self, _query: &mut EntityQuery) {}
        fn configure_execution_order(&mut self, _order: &mut SystemExecutionOrder) {}
        fn execute(&mut self, _ctx: &mut SystemContext<'_>) {}
    }

    struct Counting(Arc<AtomicUsize>);

    impl System for Counting {
        fn configure_query(&mut self, query: &mut EntityQuery) {
            query.add_component_requirement::<Position>(AccessMode::ReadOnly);
        }
        fn configure_execution_order(&mut self, order: &mut SystemExecutionOrder) {
            order.execute_after::<Anchor>();
        }
        fn execute(&mut self, ctx: &mut SystemContext<'_>) {
            let mut total = 0;
            ctx.query().for_each_chunk(|chunk| {
                total += ctx.chunk(chunk).read::<Position>().len();
            });
            self.0.fetch_add(total, Ordering::Relaxed);
        }
    }

    #[test]
    fn re_registration_replaces_under_the_same_id() {
        let mut scheduler = setup();
        let before = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));

        scheduler.register_system(Anchor);
        scheduler.register_system(Counting(before.clone()));
        assert_eq!(scheduler.system_count(), 2);

        scheduler.register_system(Counting(after.clone()));
        assert_eq!(scheduler.system_count(), 2);

        scheduler
            .managers()
            .entity_manager(0)
            .create_entity(CreationContext::new().with_component(Position(0.0)));
        scheduler.execute();

        assert_eq!(before.load(Ordering::Relaxed), 0);
        assert_eq!(after.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn fn_systems_schedule_like_any_other() {
        use crate::engine::systems::FnSystem;

        let mut scheduler = setup();
        let seen = Arc::new(AtomicUsize::new(0));

        scheduler.register_system(Anchor);

        let sink = seen.clone();
        scheduler.register_system(FnSystem::new(
            "position-counter",
            |query: &mut EntityQuery| {
                query.add_component_requirement::<Position>(AccessMode::ReadOnly);
            },
            |order: &mut SystemExecutionOrder| {
                order.execute_after::<Anchor>();
            },
            move |ctx: &mut SystemContext<'_>| {
                let mut total = 0;
                ctx.query().for_each_chunk(|chunk| {
                    total += ctx.chunk(chunk).read::<Position>().len();
                });
                sink.fetch_add(total, Ordering::Relaxed);
            },
        ));

        scheduler
            .managers()
            .entity_manager(0)
            .create_entity(CreationContext::new().with_component(Position(2.0)));
        scheduler.execute();

        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn created_archetypes_are_presented_exactly_once() {
        let mut scheduler = setup();
        let seen = Arc::new(AtomicUsize::new(0));

        scheduler.register_system(Anchor);
        scheduler.register_system(Counting(seen.clone()));

        let manager = scheduler.managers().entity_manager(0).clone();
        manager.create_entity(CreationContext::new().with_component(Position(1.0)));

        scheduler.execute();
        assert!(!manager.has_new_archetypes());
        assert_eq!(seen.load(Ordering::Relaxed), 1);

        // Second pass re-reads the same archetype through the query's
        // retained match, not through the created list.
        scheduler.execute();
        assert_eq!(seen.load(Ordering::Relaxed), 2);
    }
}
