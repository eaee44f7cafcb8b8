//! Database layer - store access, physical schemas, and compatibility
//! comparison

pub mod schema;
pub mod store;

pub use store::Store;
