//! # Engine Module
//!
//! Internal ECS engine implementation.
//!
//! This module contains all core ECS building blocks such as:
//! - Archetypes and type-erased component storage
//! - Entity and archetype management
//! - Query matching and chunked execution views
//! - System scheduling over a dependency graph
//! - The parallel task runtime
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod component;
pub mod storage;
pub mod entity;
pub mod archetype;
pub mod manager;
pub mod query;
pub mod events;
pub mod systems;
pub mod dag;
pub mod scheduler;
pub mod tasks;
