//! Core identifiers, bitset masks, and signatures.
//!
//! This module defines the numeric identifiers and bit-level layouts shared
//! by every subsystem of the engine: entity handles, archetype signatures,
//! query signatures, and access declarations.
//!
//! ## Design
//!
//! - All ECS concepts are keyed by small, copyable, densely assigned ids.
//! - Component and tag sets are fixed-size bit arrays, so signature
//!   comparison and subset matching are a handful of word operations.
//! - Signatures are order-independent by construction: two archetypes with
//!   the same components and tags produce identical masks regardless of the
//!   order in which they were declared.

/// Unique identifier for a component type.
pub type ComponentId = u16;
/// Unique identifier for a tag type.
pub type TagId = u16;
/// Unique identifier for a registered system.
pub type SystemId = u16;
/// Unique identifier for an archetype within one `EntityManager`.
pub type ArchetypeId = u16;
/// Globally unique entity identifier.
pub type EntityId = u64;
/// Row index within an archetype's storage.
pub type RowId = u32;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 1024;
/// Maximum number of registered tag types.
pub const TAG_CAP: usize = 256;

/// Number of `u64` words required to represent a full component mask.
pub const COMPONENT_WORDS: usize = (COMPONENT_CAP + 63) / 64;
/// Number of `u64` words required to represent a full tag mask.
pub const TAG_WORDS: usize = (TAG_CAP + 63) / 64;

/// Fixed-capacity bitset over dense ids.
///
/// Used for both component sets (`N = COMPONENT_WORDS`) and tag sets
/// (`N = TAG_WORDS`). Supports fast subset checks and iteration over set
/// bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mask<const N: usize> {
    words: [u64; N],
}

impl<const N: usize> Default for Mask<N> {
    fn default() -> Self {
        Self { words: [0u64; N] }
    }
}

impl<const N: usize> Mask<N> {
    /// Sets the bit corresponding to `id`.
    #[inline]
    pub fn set(&mut self, id: u16) {
        let index = (id as usize) / 64;
        let bit = (id as usize) % 64;
        self.words[index] |= 1u64 << bit;
    }

    /// Returns `true` if `id` is present in this mask.
    #[inline]
    pub fn has(&self, id: u16) -> bool {
        let index = (id as usize) / 64;
        let bit = (id as usize) % 64;
        (self.words[index] >> bit) & 1 == 1
    }

    /// Returns `true` if every bit of `other` is also set in `self`.
    #[inline]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| (a & b) == *b)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterates over all ids set in this mask, in ascending order.
    pub fn iter_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let base = word_index * 64;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((base + tz) as u16)
            })
        })
    }
}

/// Bitset over component ids.
pub type ComponentMask = Mask<COMPONENT_WORDS>;
/// Bitset over tag ids.
pub type TagMask = Mask<TAG_WORDS>;

/// The (component set, tag set) pair identifying an archetype.
///
/// Immutable once the archetype is created; two signatures are equal exactly
/// when they describe the same component and tag sets, independent of
/// declaration order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArchetypeSignature {
    /// Components stored by the archetype.
    pub components: ComponentMask,
    /// Tags carried by the archetype.
    pub tags: TagMask,
}

/// How a system accesses a required component.
///
/// Access modes are declarative scheduling metadata. They are not enforced
/// at runtime; ordering between conflicting systems comes from the
/// dependency graph, not from locks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Shared, read-only access.
    ReadOnly,
    /// Exclusive, mutable access.
    ReadWrite,
}

/// Component and tag requirements of an entity query.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuerySignature {
    /// Components the query reads.
    pub read: ComponentMask,
    /// Components the query writes.
    pub write: ComponentMask,
    /// Tags the archetype must carry.
    pub tags: TagMask,
}

impl QuerySignature {
    /// Returns `true` if an archetype with `signature` satisfies this query.
    ///
    /// Pure subset membership on both masks; order-independent.
    #[inline]
    pub fn matches(&self, signature: &ArchetypeSignature) -> bool {
        signature.components.contains_all(&self.read)
            && signature.components.contains_all(&self.write)
            && signature.tags.contains_all(&self.tags)
    }

    /// Returns `true` if the query declares no requirements at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty() && self.write.is_empty() && self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_set_has_and_iter() {
        let mut mask = ComponentMask::default();
        mask.set(0);
        mask.set(63);
        mask.set(64);
        mask.set(513);

        assert!(mask.has(0));
        assert!(mask.has(63));
        assert!(mask.has(64));
        assert!(!mask.has(1));

        let ids: Vec<u16> = mask.iter_ids().collect();
        assert_eq!(ids, vec![0, 63, 64, 513]);
    }

    #[test]
    fn query_matching_is_subset_based() {
        let mut archetype = ArchetypeSignature::default();
        archetype.components.set(1);
        archetype.components.set(2);
        archetype.tags.set(0);

        let mut query = QuerySignature::default();
        query.read.set(1);
        query.write.set(2);
        assert!(query.matches(&archetype));

        query.tags.set(0);
        assert!(query.matches(&archetype));

        query.tags.set(1);
        assert!(!query.matches(&archetype));

        let mut wider = QuerySignature::default();
        wider.read.set(3);
        assert!(!wider.matches(&archetype));
    }

    #[test]
    fn signatures_are_order_independent() {
        let mut a = ArchetypeSignature::default();
        a.components.set(7);
        a.components.set(2);

        let mut b = ArchetypeSignature::default();
        b.components.set(2);
        b.components.set(7);

        assert_eq!(a, b);
    }
}
