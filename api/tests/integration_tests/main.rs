//! Integration tests for the lakeglass API.
//!
//! These tests drive the router end to end against a scripted warehouse, or a
//! wiremock statement API where the real connector is needed.

mod common;
mod health_tests;
mod query_tests;
mod resources_tests;
mod settings_tests;
