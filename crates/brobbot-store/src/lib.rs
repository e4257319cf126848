//! # brobbot-store
//!
//! SQLite brain for brobbot.
//!
//! Emulates a Redis-like data-structure store (scalars, lists, sets,
//! hashes) plus a user registry on top of a single SQLite table. Values
//! are stored as MessagePack or JSON blobs; the structure of a key is
//! inferred from its rows.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Brain (facade: keys, types, reset, close)   │
//! ├──────────────────────────────────────────────┤
//! │  ScalarStore  ListStore  SetStore  HashStore │
//! │  UserRegistry (reserved "users" hash)        │
//! ├──────────────────────────────────────────────┤
//! │  StoreContext (keys, codec, rows)            │
//! │  Sequencer (one exclusive unit at a time)    │
//! ├──────────────────────────────────────────────┤
//! │  Database (rusqlite WAL, spawn_blocking)     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use brobbot_store::{Brain, BrainConfig};
//! use serde_json::json;
//!
//! let brain = Brain::open(&BrainConfig::from_env()?).await?;
//! brain.scalars().set("greeting", json!("hello")).await?;
//! brain.lists().push_right("queue", json!({"job": 1})).await?;
//! let hits = brain.scalars().increment("hits", 1).await?;
//! ```

pub mod brain;
pub mod codec;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod hash;
pub mod keys;
pub mod list;
pub mod rows;
pub mod scalar;
pub mod schema;
pub mod sequencer;
pub mod set;
pub mod users;

// ── re-exports ───────────────────────────────────────────────────────

pub use brain::Brain;
pub use codec::Codec;
pub use config::BrainConfig;
pub use context::StoreContext;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use hash::HashStore;
pub use keys::KeyCodec;
pub use list::{ListStore, Placement};
pub use rows::{KeyType, Row, RowStore, Upserted};
pub use scalar::ScalarStore;
pub use sequencer::{FailurePolicy, Sequencer, SequencerStats};
pub use serde_json::Value;
pub use set::SetStore;
pub use users::{USERS_KEY, User, UserRegistry};
