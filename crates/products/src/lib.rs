//! Product catalog domain module (event-sourced).
//!
//! Products are the priced goods and services a company puts on invoices. Picking
//! a product on a line item copies its name and default price; the invoice never
//! references live catalog prices afterwards.

pub mod product;

pub use product::{
    ArchiveProduct, CreateProduct, Product, ProductArchived, ProductCommand, ProductCreated,
    ProductDetails, ProductEvent, ProductId, ProductStatus, ProductUpdated, UpdateProduct,
};
