//! Clipstash Database Layer
//!
//! Persistence for media records: the [`MediaRecordRepository`] seam, its PostgreSQL
//! implementation and an in-memory implementation for tests and database-less runs.

pub mod db;

pub use db::media::{MediaRecordRepository, PgMediaRepository};
pub use db::memory::InMemoryMediaRepository;
pub use db::setup::connect;
pub use db::transaction::TransactionGuard;
