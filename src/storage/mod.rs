//! Storage Engine
//!
//! Lock-protected in-memory key-value store.

mod store;

pub use store::Store;
