//! Pairwise ranking of library items.
//!
//! A [`Session`] repeatedly shows the user two entities and updates their ratings from the user's
//! choice. Where pairs come from is decided by a [`Matchmaker`] in one of three [`Mode`]s; how
//! ratings move is decided by [`Elo`]. Entities are read from and written to an
//! [`EntityRepository`], which can be the local SQLite [`Db`] or a remote library.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod filter;
pub mod matchmaker;
pub mod rating;
pub mod report;
pub mod repository;
pub mod session;
pub mod stats;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use db::{Db, Library};
pub use entity::{Entity, EntityId, EntityKind, Gender};
pub use error::{Error, Result};
pub use filter::{Filter, Range};
pub use matchmaker::{ComparisonPair, Matchmaker, Mode, RunStatus, TerminalEvent, TerminalKind};
pub use rating::Elo;
pub use repository::{EntityRepository, NoStats, Participation, StatsCollector};
pub use session::{Frontend, Session};
pub use stats::EntityStats;
