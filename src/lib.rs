//! # ragbridge
//!
//! Retrieval-augmented chat over documents collected from pluggable
//! datasources.
//!
//! ```text
//! ┌─────────────┐   ┌───────────┐   ┌──────────┐
//! │ Datasources │──▶│ Collector │──▶│  SQLite  │◀── embed pending
//! │ (cursor)    │   │ (retry)   │   │          │
//! └─────────────┘   └───────────┘   └────┬─────┘
//!                                        │ search
//!                  ┌─────────────────────┤
//!                  ▼                     ▼
//!         ┌──────────────────┐    ┌──────────┐
//!         │ InteractionMgr   │───▶│   LLM    │
//!         │ embed→search→LLM │    │ provider │
//!         └──────────────────┘    └──────────┘
//! ```
//!
//! Embedding and LLM backends are selected at runtime from the stored
//! provider configuration (see [`provider::ProviderFactory`]). Storage is
//! reached only through the traits in [`ragbridge_core::store`], so the
//! in-memory backend can stand in for SQLite in tests.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`metrics`] | Per-datasource collection counters |
//! | [`db`] / [`migrate`] | SQLite pool and schema |
//! | [`sqlite_store`] | SQLite storage backend |
//! | [`datasource`] | Datasource trait and the filesystem datasource |
//! | [`collector`] | Collection worker with bounded retry |
//! | [`provider`] | Embedding/LLM providers and the factory |
//! | [`prompt`] | Prompt template rendering |
//! | [`interaction`] | The chat flow |
//! | [`search`] | Document search |
//! | [`embed_cmd`] | Embedding backfill |
//! | [`server`] | HTTP API |
//! | [`admin`] | Datasource and provider management commands |

pub mod admin;
pub mod collector;
pub mod config;
pub mod datasource;
pub mod db;
pub mod embed_cmd;
pub mod interaction;
pub mod logging;
pub mod metrics;
pub mod migrate;
pub mod prompt;
pub mod provider;
pub mod search;
pub mod server;
pub mod sqlite_store;
