//! Read-only SQLite publishing core: a registry of immutable database files,
//! a pool of workers running time-boxed queries, and keyset pagination over
//! filtered tables.

pub mod config;
pub mod db;
pub mod engine;
pub mod export;
pub mod filters;
pub mod pagination;
pub mod registry;
pub mod types;
pub mod worker;

pub use config::{Config, Metadata};
pub use db::{Error, Result, SqlOrigin};
pub use engine::{Engine, RequestArgs};
