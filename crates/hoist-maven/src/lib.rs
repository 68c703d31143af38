//! Maven repository protocol: project descriptor parsing (XML and flat
//! dialects), maven-metadata version listings, and repository URL layout.

pub mod flat;
pub mod metadata;
pub mod project;
pub mod repository;
