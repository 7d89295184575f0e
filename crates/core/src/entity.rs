//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Inventory items are entities: their available quantity changes on every
/// request transition, but the item stays the same item.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
