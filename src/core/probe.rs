//! Purpose: Run the load -> resolve -> invoke -> release sequence against one library.
//! Exports: `LoadedLibrary`, `EntryPoint`, `ProbeRequest`, `ProbeReport`, `ProbeStage`, `run_probe`.
//! Role: Core of the probe; the CLI only maps its result to stderr and an exit code.
//! Invariants: Each stage runs at most once, in order; the first failure returns.
//! Invariants: Transcript lines are flushed as written so they precede library side effects.
//! Invariants: The library handle is released on every exit path (drop or explicit close).
use std::io::Write;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::{debug, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::loader::open_library;
use crate::core::target::{LibraryTarget, SearchPolicy, validate_symbol};

pub const OPENING_LINE: &str = "Opening eplus shared library...";
pub const CALLING_LINE: &str = "Calling to initialize";
pub const CLOSING_LINE: &str = "Closing library";

pub fn resolving_line(symbol: &str) -> String {
    format!("Getting function {symbol}")
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProbeStage {
    Loading,
    Loaded,
    Resolving,
    Resolved,
    Invoking,
    Released,
}

impl ProbeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Invoking => "invoking",
            Self::Released => "released",
        }
    }
}

type InitFn = unsafe extern "C" fn();

/// An open shared library, exclusively owned. Dropping it releases the handle.
pub struct LoadedLibrary {
    library: Library,
    path: PathBuf,
}

impl LoadedLibrary {
    /// # Safety
    ///
    /// Opening a library runs its initializers; the library must be trusted.
    pub unsafe fn open(target: &LibraryTarget, policy: SearchPolicy) -> Result<Self, Error> {
        let (library, path) = unsafe { open_library(target, policy) }?;
        Ok(Self { library, path })
    }

    /// Path that was handed to the platform loader.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_point<'lib>(&'lib self, symbol: &str) -> Result<EntryPoint<'lib>, Error> {
        validate_symbol(symbol)?;
        // The exported entry point takes no arguments and returns nothing.
        let func: Symbol<'lib, InitFn> =
            unsafe { self.library.get(symbol.as_bytes()) }.map_err(|err| {
                Error::new(ErrorKind::SymbolResolution)
                    .with_message(format!("cannot get function {symbol}"))
                    .with_path(&self.path)
                    .with_symbol(symbol)
                    .with_stage(ProbeStage::Resolving)
                    .with_source(err)
            })?;
        Ok(EntryPoint {
            symbol: symbol.to_string(),
            func,
        })
    }

    pub fn close(self) -> Result<(), Error> {
        let path = self.path;
        self.library.close().map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to release library")
                .with_path(path)
                .with_stage(ProbeStage::Released)
                .with_source(err)
        })
    }
}

/// A resolved function pointer; cannot outlive the library it came from.
pub struct EntryPoint<'lib> {
    symbol: String,
    func: Symbol<'lib, InitFn>,
}

impl EntryPoint<'_> {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// # Safety
    ///
    /// Calls foreign code; the symbol must really be a `void (*)(void)`.
    pub unsafe fn invoke(&self) {
        let func: InitFn = *self.func;
        unsafe { func() };
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeRequest {
    pub target: LibraryTarget,
    pub policy: SearchPolicy,
    pub symbol: String,
}

impl ProbeRequest {
    pub fn new(
        target: LibraryTarget,
        policy: SearchPolicy,
        symbol: impl Into<String>,
    ) -> Result<Self, Error> {
        let symbol = symbol.into();
        validate_symbol(&symbol)?;
        Ok(Self {
            target,
            policy,
            symbol,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProbeReport {
    pub path: PathBuf,
    pub policy: SearchPolicy,
    pub symbol: String,
}

struct Transcript<W: Write> {
    out: W,
}

impl<W: Write> Transcript<W> {
    fn line(&mut self, text: &str) -> Result<(), Error> {
        writeln!(self.out, "{text}")
            .and_then(|()| self.out.flush())
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write probe transcript")
                    .with_source(err)
            })
    }
}

/// Loads the requested library, calls its entry point, and releases it,
/// writing one progress line per step to `out`.
///
/// # Safety
///
/// Runs the library's initializers and the entry point itself; both are
/// arbitrary foreign code the caller must trust.
pub unsafe fn run_probe<W: Write>(request: &ProbeRequest, out: W) -> Result<ProbeReport, Error> {
    let mut transcript = Transcript { out };

    transcript.line(OPENING_LINE)?;
    debug!(
        stage = ProbeStage::Loading.as_str(),
        path = %request.target.path().display(),
        policy = request.policy.as_str(),
        "loading library"
    );
    let library = unsafe { LoadedLibrary::open(&request.target, request.policy) }?;
    debug!(stage = ProbeStage::Loaded.as_str(), path = %library.path().display(), "library loaded");

    transcript.line(&resolving_line(&request.symbol))?;
    debug!(stage = ProbeStage::Resolving.as_str(), symbol = %request.symbol, "resolving entry point");
    {
        let entry = library.entry_point(&request.symbol)?;
        debug!(stage = ProbeStage::Resolved.as_str(), symbol = entry.symbol(), "entry point resolved");

        transcript.line(CALLING_LINE)?;
        debug!(stage = ProbeStage::Invoking.as_str(), "invoking entry point");
        unsafe { entry.invoke() };
    }

    transcript.line(CLOSING_LINE)?;
    let report = ProbeReport {
        path: library.path().to_path_buf(),
        policy: request.policy,
        symbol: request.symbol.clone(),
    };
    if let Err(err) = library.close() {
        warn!(error = %err, "library release failed");
    }
    debug!(stage = ProbeStage::Released.as_str(), "library released");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::{
        OPENING_LINE, ProbeRequest, ProbeStage, Transcript, resolving_line, run_probe,
    };
    use crate::core::error::ErrorKind;
    use crate::core::target::{DEFAULT_ENTRY_POINT, LibraryTarget, SearchPolicy};
    use std::ffi::OsStr;
    use std::io::{self, Write};

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn missing_request(policy: SearchPolicy) -> (tempfile::TempDir, ProbeRequest) {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = LibraryTarget::from_parts(Some(temp.path()), OsStr::new("libabsent.so"))
            .expect("target");
        let request = ProbeRequest::new(target, policy, DEFAULT_ENTRY_POINT).expect("request");
        (temp, request)
    }

    #[test]
    fn load_failure_stops_after_opening_line() {
        for policy in [SearchPolicy::DirectoryScoped, SearchPolicy::Default] {
            let (_temp, request) = missing_request(policy);
            let mut out = Vec::new();
            let err = unsafe { run_probe(&request, &mut out) }.expect_err("load fails");
            assert_eq!(err.kind(), ErrorKind::LoadFailure);
            assert_eq!(err.stage(), Some(ProbeStage::Loading));
            assert_eq!(String::from_utf8(out).expect("utf8"), format!("{OPENING_LINE}\n"));
        }
    }

    #[test]
    fn transcript_write_failure_is_io_error() {
        let (_temp, request) = missing_request(SearchPolicy::Default);
        let err = unsafe { run_probe(&request, BrokenPipe) }.expect_err("io");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn transcript_flushes_each_line() {
        let mut out = Vec::new();
        let mut transcript = Transcript { out: &mut out };
        transcript.line("one").expect("line");
        transcript.line(&resolving_line("f")).expect("line");
        assert_eq!(out, b"one\nGetting function f\n");
    }

    #[test]
    fn request_rejects_bad_symbol() {
        let target = LibraryTarget::from_parts(None, OsStr::new("libx.so")).expect("target");
        let err = ProbeRequest::new(target, SearchPolicy::Default, "").expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn stage_names_are_lowercase() {
        assert_eq!(ProbeStage::Loading.as_str(), "loading");
        assert_eq!(ProbeStage::Released.as_str(), "released");
    }
}
