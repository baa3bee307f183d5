pub mod media;
pub mod memory;
pub mod setup;
pub mod transaction;
