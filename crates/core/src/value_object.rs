//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity and are compared by their attributes.
/// `Money` is the canonical one here: a ₹15.00 fine equals any other ₹15.00
/// fine. An `Item`, by contrast, is an entity (see [`crate::Entity`]).
///
/// Implementors should be immutable; "changing" one means building a new value
/// (e.g. `Money::times`).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
