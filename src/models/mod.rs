//! Catalog data models for the storage reorganization engine.
//!
//! These records represent the classification hierarchy, the stored blobs
//! it organizes, and the join rows between the two. They map to database
//! tables via `sqlx::FromRow` and serialize naturally as JSON via `serde`.

pub mod entity;
pub mod link;
pub mod object;
