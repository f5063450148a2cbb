//! Storage backend implementations.

pub mod mem;
