//! Brickstream - on-demand streaming of bricked multi-resolution volumes
//!
//! A server holds datasets split into bricks per level of detail; clients
//! open a dataset, receive its metadata, and fetch bricks one at a time or
//! as view-ordered batches.

pub mod core;
pub mod layout;
pub mod compression;
pub mod wire;
pub mod store;
pub mod session;
