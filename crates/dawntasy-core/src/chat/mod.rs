//! Chat persistence port, session cache and live synchronization.

pub mod cache;
pub mod store;
pub mod sync;
pub mod title;

#[cfg(test)]
pub(crate) mod testing;
