//! Core data types for hoist: coordinates, module keys, dependencies,
//! exclusions, scopes, and the Maven-compatible version model.

pub mod coordinate;
pub mod version;
