//! Typed component columns and type-erased access.
//!
//! Each archetype owns one [`Column<T>`] per component type in its
//! signature: a contiguous, append-only array of component values. Columns
//! are stored behind the [`TypeErasedColumn`] trait so archetypes can hold
//! heterogeneous component storage and recover the typed view by
//! downcasting.
//!
//! ## Invariants
//!
//! - All columns of one archetype have identical lengths at every
//!   synchronization point (row `i` of every column belongs to the same
//!   entity).
//! - Columns only grow; rows are never removed or compacted.
//! - Typed access succeeds only when the requested type matches the
//!   column's element type.

use std::any::{type_name, Any, TypeId};

use crate::engine::error::EcsError;
use crate::engine::types::ComponentId;

/// Contiguous, append-only storage for a single component type.
pub struct Column<T: 'static + Send + Sync> {
    values: Vec<T>,
}

impl<T: 'static + Send + Sync> Default for Column<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T: 'static + Send + Sync> Column<T> {
    /// Appends a value, returning its row index.
    #[inline]
    pub fn push(&mut self, value: T) -> usize {
        self.values.push(value);
        self.values.len() - 1
    }

    /// Returns the full typed slice over stored values.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    /// Returns the full mutable typed slice over stored values.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }
}

/// Dynamically typed interface over a [`Column<T>`].
///
/// Allows archetypes to store heterogeneous columns behind
/// `Box<dyn TypeErasedColumn>` and to push type-erased values during entity
/// creation. Typed slice access goes through `as_any` / `as_any_mut`
/// downcasting.
pub trait TypeErasedColumn: Send + Sync {
    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if no values are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `TypeId` of the element type.
    fn element_type_id(&self) -> TypeId;

    /// Human-readable element type name, for diagnostics.
    fn element_type_name(&self) -> &'static str;

    /// Appends a type-erased value.
    ///
    /// Fails with [`EcsError::TypeMismatch`] when the boxed value's dynamic
    /// type does not match the column's element type.
    fn push_any(
        &mut self,
        component_id: ComponentId,
        value: Box<dyn Any + Send>,
    ) -> Result<(), EcsError>;

    /// Downcast hook for shared access.
    fn as_any(&self) -> &dyn Any;

    /// Downcast hook for mutable access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static + Send + Sync> TypeErasedColumn for Column<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn element_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn push_any(
        &mut self,
        component_id: ComponentId,
        value: Box<dyn Any + Send>,
    ) -> Result<(), EcsError> {
        match value.downcast::<T>() {
            Ok(typed) => {
                self.values.push(*typed);
                Ok(())
            }
            // Deref first: `Box<dyn Any>` is itself `Any`, and calling
            // `type_id` on the box would report the box's type.
            Err(original) => Err(EcsError::TypeMismatch {
                component_id,
                expected_name: type_name::<T>(),
                actual: (*original).type_id(),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
