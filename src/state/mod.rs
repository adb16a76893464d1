/// State management module
///
/// This module handles the persisted catalog:
/// - Database connection lifecycle and queries (registry.rs)
/// - Row and report types (data.rs)

pub mod data;
pub mod registry;
