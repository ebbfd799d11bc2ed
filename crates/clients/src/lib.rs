//! Clients domain module (the customers a company bills, event-sourced).
//!
//! Pure, deterministic domain logic: no IO, no HTTP, no storage.

pub mod client;

pub use client::{
    ArchiveClient, Client, ClientArchived, ClientCommand, ClientDetails, ClientEvent, ClientId,
    ClientRegistered, ClientStatus, ClientUpdated, RegisterClient, UpdateClient,
};
