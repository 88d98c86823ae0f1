//! Database Stress Test Service Library
//!
//! This library provides the registry of stress test definitions, the
//! executor that runs them against a database, and the HTTP API exposing
//! both.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
