//! Patch Mirror - keeps patch-package files in downstream repositories in line
//! with a canonical local set, by way of pull requests.
//!
//! This library provides the catalog, the pure reconciliation engine, and the
//! GitHub plumbing it runs against; the binary wires them to the command line.

pub mod catalog;
pub mod config;
pub mod driver;
pub mod effects;
pub mod github;
pub mod naming;
pub mod reconcile;
pub mod types;

#[cfg(test)]
pub mod test_utils;
