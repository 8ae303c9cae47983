//! # Scriptorium
//!
//! A scripture text service with hybrid (keyword + semantic) verse search
//! and incremental content streaming.
//!
//! Scriptorium stores versioned scripture (version → book → chapter →
//! verse, one embedding per verse) in SQLite and serves it over an HTTP
//! API: concurrent vector + keyword retrieval fused with Reciprocal Rank
//! Fusion, capability-gated access per version, and bounded-memory
//! streaming of whole versions as SSE frames or raw embedding bytes.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────────┐
//!    search ──────▶│ AccessFilter │──▶ embed ──▶ vector ┐
//!                  └──────┬───────┘            keyword ─┴─▶ RRF ──▶ JSON
//!                         │
//!    version/vectors ─────┴──▶ producer task ──▶ bounded channel ──▶ SSE / bytes
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scriptorium init                          # create database schema
//! scriptorium search "love" --version KJV   # hybrid search from the CLI
//! scriptorium serve                         # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`access`] | Capability checks per version |
//! | [`embedding`] | Embedding client abstraction and vector utilities |
//! | [`retrieval`] | Concurrent vector + keyword candidate queries |
//! | [`fusion`] | Reciprocal Rank Fusion of the two channels |
//! | [`stream`] | Incremental content and vector streaming |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Error taxonomy and HTTP mapping |

pub mod access;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod search_cmd;
pub mod server;
pub mod stream;

#[cfg(test)]
pub(crate) mod testutil;
