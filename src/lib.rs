//! pagekit: SQLite storage and JSON mapping for project wiki pages, their
//! label associations and the page link log.
//!
//! - [`repo`] persists pages, labels and log entries.
//! - [`views`] builds the outbound JSON shapes.
//! - [`db`] owns connections, migrations and the crate error type.

pub mod db;
pub mod models;
pub mod output;
pub mod repo;
pub mod views;

pub use db::PageKitError;
