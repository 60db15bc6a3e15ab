//! # ragbridge core
//!
//! Shared, runtime-free logic for ragbridge: the data model, vector
//! utilities, document ranking, and the storage contract with an in-memory
//! implementation.
//!
//! This crate contains no tokio, sqlx, network, or filesystem I/O.

pub mod embedding;
pub mod models;
pub mod search;
pub mod store;
