//! Storage reorganization & context propagation engine.
//!
//! Relocates objects in a store so their keys mirror the catalog's
//! classification hierarchy, and threads precomputed destination paths from
//! the upload orchestrator to the storage provider so concurrent uploads are
//! named correctly before any bytes move. The batch side lives in
//! [`reconcile`]; the request-time side in [`context`],
//! [`services::orchestrator`] and [`services::provider`].

pub mod config;
pub mod context;
pub mod keys;
pub mod models;
pub mod reconcile;
pub mod relocate;
pub mod resolve;
pub mod services;
