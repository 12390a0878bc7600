//! Purpose: Library crate backing the `eplus-probe` CLI and its tests.
//! Exports: `api` (probe entry points, targets, errors) and `core` (implementation).
//! Role: Loads a shared library, calls its init entry point, and reports the outcome.
//! Invariants: All dynamic loading goes through `core::loader`.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
