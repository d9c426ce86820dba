//! Process-local chat stores and the snapshot fan-out they share.

pub mod memory;
pub mod notify;

pub use memory::InMemoryChatStore;
pub use notify::SnapshotHub;
