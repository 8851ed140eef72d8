#![deny(unsafe_code)]
//! Integration test suite for the metaforge pipeline.
//!
//! The crate body is empty; the end-to-end scenarios live under `tests/e2e`
//! and the property tests under `tests/property`.
