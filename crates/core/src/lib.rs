//! `invoicekit-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate traits and the monetary value
//! types every billing module computes with.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod quantity;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId};
pub use money::{format_amount, normalize_currency_code, Money, MINOR_UNITS_PER_MAJOR};
pub use quantity::{Quantity, TaxRate};
pub use value_object::ValueObject;
