//! # docvault core
//!
//! Shared, runtime-agnostic logic for docvault: data models, sentence
//! chunking, the hash-based embedder, content cleaning, record preparation,
//! the [`store::DocumentBackend`] capability trait, and the error taxonomy.
//!
//! This crate contains no tokio, HTTP client, SQLite, or filesystem I/O.
//! Concrete remote and local backends live in the `docvault` app crate.

pub mod chunk;
pub mod clean;
pub mod embedding;
pub mod error;
pub mod models;
pub mod records;
pub mod store;
