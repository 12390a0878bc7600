//! Purpose: Define the public Rust API boundary for the probe.
//! Exports: Target/policy types, the probe sequence, and the error model.
//! Role: Stable surface used by the CLI and integration tests.
//! Invariants: Additive-only; loader internals stay behind `core`.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::probe::{
    CALLING_LINE, CLOSING_LINE, EntryPoint, LoadedLibrary, OPENING_LINE, ProbeReport,
    ProbeRequest, ProbeStage, resolving_line, run_probe,
};
pub use crate::core::target::{
    DEFAULT_ENTRY_POINT, LibraryTarget, SearchPolicy, default_lib_file_name, validate_symbol,
};
