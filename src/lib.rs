//! # Strata ECS
//!
//! Archetype-based Entity-Component-System core with a dependency-graph
//! scheduler and a work-stealing task runtime.
//!
//! ## Design Goals
//! - Archetype-based storage for cache efficiency
//! - Deterministic, declarative system ordering
//! - Parallel CPU execution through chunked dispatch
//! - Append-only storage with incremental query discovery

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core ECS types

pub use engine::manager::{
    EngineManagers,
    EntityManager,
};

pub use engine::entity::{
    CreationContext,
    Entity,
    EntityLocation,
};

pub use engine::component::{
    ComponentDesc,
    ComponentRegistry,
};

pub use engine::query::{
    ChunkView,
    ColumnCursor,
    EntityQuery,
    ExecutionContext,
};

pub use engine::systems::{
    FnSystem,
    System,
    SystemContext,
    SystemExecutionOrder,
    SystemRegistry,
};
pub use engine::scheduler::SystemManager;

pub use engine::events::EventManager;

pub use engine::tasks::{
    TaskComposer,
    TaskExecuteArgs,
    TaskGroup,
};

pub use engine::error::EcsError;

pub use engine::types::{
    AccessMode,
    ArchetypeId,
    ArchetypeSignature,
    ComponentId,
    EntityId,
    QuerySignature,
    SystemId,
    TagId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude (Optional but recommended)
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used ECS types.
///
/// Import with:
/// ```rust
/// use strata_ecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AccessMode,
        ChunkView,
        ColumnCursor,
        ComponentRegistry,
        CreationContext,
        EngineManagers,
        Entity,
        EntityManager,
        EntityQuery,
        EventManager,
        ExecutionContext,
        FnSystem,
        System,
        SystemContext,
        SystemExecutionOrder,
        SystemManager,
        TaskComposer,
        TaskExecuteArgs,
        TaskGroup,
    };
}
