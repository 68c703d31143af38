//! High-level operations wiring the CLI to the resolver and the cache.

pub mod ops_fetch;
pub mod ops_resolve;
