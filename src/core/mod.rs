// Core modules implementing target resolution, loading, and the probe sequence.
pub mod error;
pub mod loader;
pub mod probe;
pub mod target;
