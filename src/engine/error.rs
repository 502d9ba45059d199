//! Error taxonomy for the ECS core.
//!
//! Three classes of failure exist in this engine:
//!
//! - **Configuration errors** (unknown system name in an ordering
//!   declaration, missing component on an archetype, unregistered component
//!   type): programming mistakes made during registration. These are fatal:
//!   logged at error level and the process panics via [`fatal!`].
//! - **Duplicate registrations** (same event delegate twice, same system
//!   type twice): logged as warnings, the duplicate operation is a no-op,
//!   and execution continues.
//! - **Runtime task failures** (a panic escaping a dispatched unit): caught
//!   at the task boundary, logged with the failing unit's index, and the
//!   process aborts.
//!
//! [`EcsError`] carries the structured failure values used by storage and
//! archetype internals before they reach one of the boundaries above. There
//! is no recoverable-error type threaded through the scheduling APIs and no
//! retries anywhere in this core.

use std::any::TypeId;

use thiserror::Error;

use crate::engine::types::{ArchetypeId, ComponentId};

/// Structured failures produced by storage, registry, and archetype
/// internals.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EcsError {
    /// A value's dynamic type did not match the destination column's
    /// element type.
    #[error("type mismatch writing component {component_id}: expected {expected_name}")]
    TypeMismatch {
        /// Component id of the destination column.
        component_id: ComponentId,
        /// Element type the column stores.
        expected_name: &'static str,
        /// Dynamic type of the rejected value.
        actual: TypeId,
    },

    /// A component required by an archetype's signature was not supplied
    /// during row insertion.
    #[error("missing component {component_id} for archetype {archetype_id}")]
    MissingComponent {
        /// Archetype whose signature was not satisfied.
        archetype_id: ArchetypeId,
        /// Component id absent from the supplied values.
        component_id: ComponentId,
    },

    /// The same component id was supplied more than once during row
    /// insertion.
    #[error("duplicate component {component_id} supplied for archetype {archetype_id}")]
    DuplicateComponent {
        /// Archetype the row was destined for.
        archetype_id: ArchetypeId,
        /// Component id supplied twice.
        component_id: ComponentId,
    },

    /// A component type was used before being registered and no column
    /// factory exists for it.
    #[error("no storage factory registered for component {component_id}")]
    UnregisteredComponent {
        /// Offending component id.
        component_id: ComponentId,
    },

    /// The dense id space for components or tags is exhausted.
    #[error("{kind} capacity exceeded (cap {cap})")]
    CapacityExceeded {
        /// Which id space overflowed (`"component"` or `"tag"`).
        kind: &'static str,
        /// Configured capacity.
        cap: usize,
    },

    /// A system name used in an ordering declaration matched no registered
    /// system.
    #[error("unknown system `{name}` in execution-order declaration")]
    UnknownSystem {
        /// The unresolved system name.
        name: String,
    },
}

/// Logs a configuration error and panics.
///
/// Used at the registration boundaries where the original design aborts the
/// process through its logging facility. Not for runtime task failures,
/// which abort via `std::process::abort` at the task boundary instead.
macro_rules! fatal {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
        panic!($($arg)*);
    }};
}

pub(crate) use fatal;
