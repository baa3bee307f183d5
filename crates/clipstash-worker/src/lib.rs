//! Background work for Clipstash: the bounded preview worker pool and the periodic
//! sweeper that reclaims abandoned upload sessions and leftover temp files.

pub mod context;
pub mod queue;
pub mod sweeper;

pub use context::PreviewHandler;
pub use queue::{PreviewQueue, QueueError};
pub use sweeper::{SessionSweeper, SweepReport};
