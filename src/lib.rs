//! # docvault
//!
//! Document storage and retrieval for an assistant-style application.
//! Uploaded text is cleaned, split into sentence-aligned chunks, embedded
//! with a deterministic feature-hash embedder and written to a remote vector
//! index. When the index is unreachable the whole cleaned text lands in a
//! local SQLite-backed collection that is searched by keyword instead.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────┐
//!  CLI / HTTP ──▶ │ DocumentStorage  │
//!                 └────────┬─────────┘
//!                primary   │   on failure
//!              ┌───────────┴──────────┐
//!              ▼                      ▼
//!       ┌──────────────┐      ┌──────────────┐
//!       │ RemoteBackend│      │  LocalStore  │
//!       │ chunk+embed  │      │ keyword score│
//!       └──────┬───────┘      └──────┬───────┘
//!              ▼                     ▼
//!       remote vector index    SQLite collection
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema migrations |
//! | [`local_store`] | Keyword-scored local fallback collection |
//! | [`index_client`] | Remote vector index REST client |
//! | [`remote_store`] | Backend adapter over the index client |
//! | [`storage`] | Orchestrator with transparent fallback |
//! | [`server`] | JSON HTTP API |
//! | [`commands`] | `dv` subcommand bodies |
//!
//! Chunking, embedding, the data model and the backend trait live in the
//! `docvault-core` crate.

pub mod commands;
pub mod config;
pub mod db;
pub mod index_client;
pub mod local_store;
pub mod migrate;
pub mod remote_store;
pub mod server;
pub mod storage;
