//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values: two
/// `Money` amounts of 1250 minor units are the same amount, whereas two clients
/// with the same name are still different clients.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
