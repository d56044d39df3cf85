//! BDD harness (cucumber-rs).
//!
//! Scenarios live in `features/` and drive `prism-core` end to end against
//! temporary datasets. This crate keeps them isolated from the production
//! crates.
