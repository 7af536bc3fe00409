//! Relational persistence for Kindred.
//!
//! One SQLite database holds users, companions, messages, and knowledge
//! files. Deleting a companion cascades to its messages and knowledge files
//! through foreign keys; vector and cache cleanup happen elsewhere, as
//! explicit steps.

pub mod sqlite;

pub use sqlite::SqliteStore;
