//! Core types, payout rules, and session flow for the EcoSpy recycling kiosk.

/// Sequentially numbered storage for captured frames.
pub mod archive;
/// Bundle of collaborator implementations.
pub mod backend;
/// Allow-list based recyclability check.
pub mod classifier;
/// Kiosk settings.
pub mod config;
/// Reduction of detector output to labels and recyclable counts.
pub mod detection;
/// Crediting payouts and writing history records.
pub mod ledger;
/// In-memory store, camera, and detector for tests and demos.
pub mod memory;
/// Domain models shared by all crates.
pub mod model;
/// Payout calculation against the price catalog.
pub mod payout;
/// Traits describing the external collaborators.
pub mod ports;
/// High-level service facade used by front-ends.
pub mod service;
/// Per-customer state machine.
pub mod session;

pub use model::*;
pub use ports::*;
pub use service::*;
