//! Purpose: Platform loading primitives behind the two search policies.
//! Exports: `open_library` (crate-internal).
//! Role: The only place that calls into the OS dynamic loader to open a library.
//! Invariants: Directory-scoped loads only ever pass an absolute, existing file path.
//! Invariants: Default loads pass the joined target path to the loader unchanged.
//! Notes: On Windows, scoped loads also restrict dependency lookup to the DLL's
//! directory plus System32.
use std::path::{Path, PathBuf};

use libloading::Library;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::probe::ProbeStage;
use crate::core::target::{LibraryTarget, SearchPolicy};

/// Opens `target` under `policy`, returning the handle and the path handed to the loader.
///
/// # Safety
///
/// Loading a library runs its initialization routines; the caller must trust
/// the library at `target`.
pub(crate) unsafe fn open_library(
    target: &LibraryTarget,
    policy: SearchPolicy,
) -> Result<(Library, PathBuf), Error> {
    match policy {
        SearchPolicy::Default => unsafe { open_default(target) },
        SearchPolicy::DirectoryScoped => unsafe { open_scoped(target) },
    }
}

unsafe fn open_default(target: &LibraryTarget) -> Result<(Library, PathBuf), Error> {
    let path = target.path();
    debug!(path = %path.display(), "opening with platform search");
    let library = unsafe { Library::new(&path) }.map_err(|err| load_error(&path, err))?;
    Ok((library, path))
}

unsafe fn open_scoped(target: &LibraryTarget) -> Result<(Library, PathBuf), Error> {
    let dir = scoped_search_dir(target)?;
    let path = dir.join(target.file_name());
    debug!(path = %path.display(), "opening from library directory only");
    if !path.is_file() {
        return Err(Error::new(ErrorKind::LoadFailure)
            .with_message("cannot open library: not found in its directory")
            .with_path(&path)
            .with_stage(ProbeStage::Loading)
            .with_hint(
                "Directory-scoped loading never consults the search path; \
                 check --install-dir or use --search default.",
            ));
    }
    let library = unsafe { open_in_dir(&path) }.map_err(|err| load_error(&path, err))?;
    Ok((library, path))
}

fn scoped_search_dir(target: &LibraryTarget) -> Result<PathBuf, Error> {
    let dir = match target.install_dir() {
        Some(dir) => dir.to_path_buf(),
        None => executable_dir()?,
    };
    dir.canonicalize().map_err(|err| {
        Error::new(ErrorKind::LoadFailure)
            .with_message("cannot open library: install directory is not accessible")
            .with_path(&dir)
            .with_stage(ProbeStage::Loading)
            .with_source(err)
    })
}

fn executable_dir() -> Result<PathBuf, Error> {
    let exe = std::env::current_exe().map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("cannot locate the running executable")
            .with_source(err)
    })?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        Error::new(ErrorKind::Internal)
            .with_message("running executable has no parent directory")
            .with_path(&exe)
    })
}

#[cfg(unix)]
unsafe fn open_in_dir(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};

    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Library::from)
}

#[cfg(windows)]
unsafe fn open_in_dir(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::windows::{
        LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR, LOAD_LIBRARY_SEARCH_SYSTEM32, Library as WindowsLibrary,
    };

    unsafe {
        WindowsLibrary::load_with_flags(
            path,
            LOAD_LIBRARY_SEARCH_DLL_LOAD_DIR | LOAD_LIBRARY_SEARCH_SYSTEM32,
        )
    }
    .map(Library::from)
}

fn load_error(path: &Path, err: libloading::Error) -> Error {
    Error::new(ErrorKind::LoadFailure)
        .with_message("cannot open library")
        .with_path(path)
        .with_stage(ProbeStage::Loading)
        .with_source(err)
}
