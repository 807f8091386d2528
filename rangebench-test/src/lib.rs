//! Test utilities for rangebench.
//!
//! This crate provides utilities to facilitate integration testing of the benchmark against a
//! real HTTP endpoint. See the modules for all available utilities.

pub mod server;
pub mod tracing;
