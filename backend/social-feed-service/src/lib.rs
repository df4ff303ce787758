//! Social feed service
//!
//! Users publish posts and news, comment, like and follow each other, and
//! receive notifications. Every write that touches more than one record runs
//! as a single atomic unit through [`coordinator::Coordinator`], against either
//! PostgreSQL or the in-process [`store::MemoryStore`].

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod mail;
pub mod media;
pub mod metrics;
pub mod middleware;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};

/// Embedded schema migrations for the PostgreSQL store
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
