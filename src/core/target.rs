//! Purpose: Describe which shared library to probe and how the OS should search for it.
//! Exports: `LibraryTarget`, `SearchPolicy`, `default_lib_file_name`, `validate_symbol`.
//! Role: Pure path/name handling; never touches the filesystem.
//! Invariants: Install dirs are stored without trailing separators ("no-slash").
//! Invariants: Library file names are a single normal path component.
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use crate::core::error::{Error, ErrorKind};

/// Entry point every EnergyPlus API library exports.
pub const DEFAULT_ENTRY_POINT: &str = "initializeFunctionalAPI";

const LIBRARY_STEM: &str = "energyplusapi";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SearchPolicy {
    /// Look for the library (and its dependencies) only in its own directory.
    #[default]
    DirectoryScoped,
    /// Hand the path to the platform loader unchanged.
    Default,
}

impl SearchPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "directory" | "directory-scoped" | "scoped" => Some(Self::DirectoryScoped),
            "default" | "system" => Some(Self::Default),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectoryScoped => "directory",
            Self::Default => "default",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LibraryTarget {
    install_dir: Option<PathBuf>,
    file_name: OsString,
}

impl LibraryTarget {
    /// Builds a target from an install directory and a bare library file name.
    ///
    /// An empty install directory counts as absent, in which case the platform
    /// search (or the executable's directory, when scoped) decides where the
    /// library comes from.
    pub fn from_parts(install_dir: Option<&Path>, file_name: &OsStr) -> Result<Self, Error> {
        validate_file_name(file_name)?;
        Ok(Self {
            install_dir: install_dir.and_then(trim_install_dir),
            file_name: file_name.to_os_string(),
        })
    }

    /// Splits a fully qualified library path into directory and file name.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let file_name = path.file_name().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("library path does not name a file")
                .with_path(path)
        })?;
        let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
        Self::from_parts(parent, file_name)
    }

    pub fn install_dir(&self) -> Option<&Path> {
        self.install_dir.as_deref()
    }

    pub fn file_name(&self) -> &OsStr {
        &self.file_name
    }

    pub fn path(&self) -> PathBuf {
        match &self.install_dir {
            Some(dir) => dir.join(&self.file_name),
            None => PathBuf::from(&self.file_name),
        }
    }
}

/// Platform file name of the EnergyPlus API library, e.g. `libenergyplusapi.so`.
pub fn default_lib_file_name() -> String {
    format!(
        "{}{LIBRARY_STEM}{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

pub fn validate_symbol(symbol: &str) -> Result<(), Error> {
    if symbol.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("entry point name is empty"));
    }
    if symbol.contains('\0') {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("entry point name contains a NUL byte")
            .with_symbol(symbol.replace('\0', "\\0")));
    }
    Ok(())
}

fn validate_file_name(file_name: &OsStr) -> Result<(), Error> {
    if file_name.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("library file name is empty"));
    }
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name == file_name => Ok(()),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!(
                "library file name must not contain path separators: {}",
                file_name.to_string_lossy()
            ))
            .with_hint("Pass the directory with --install-dir, or a full path with --library.")),
    }
}

fn trim_install_dir(dir: &Path) -> Option<PathBuf> {
    if dir.as_os_str().is_empty() {
        return None;
    }
    // Rebuilding from components drops trailing separators but keeps a bare root.
    Some(dir.components().collect())
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_ENTRY_POINT, LibraryTarget, SearchPolicy, default_lib_file_name, validate_symbol,
    };
    use crate::core::error::ErrorKind;
    use std::ffi::OsStr;
    use std::path::{Path, PathBuf};

    #[cfg(unix)]
    #[test]
    fn install_dir_trailing_slash_is_dropped() {
        let target = LibraryTarget::from_parts(
            Some(Path::new("/opt/eplus/")),
            OsStr::new("libenergyplusapi.so.1"),
        )
        .expect("target");
        assert_eq!(target.install_dir(), Some(Path::new("/opt/eplus")));
        assert_eq!(
            target.path(),
            PathBuf::from("/opt/eplus/libenergyplusapi.so.1")
        );
    }

    #[cfg(unix)]
    #[test]
    fn root_install_dir_survives_trimming() {
        let target =
            LibraryTarget::from_parts(Some(Path::new("/")), OsStr::new("libx.so")).expect("target");
        assert_eq!(target.path(), PathBuf::from("/libx.so"));
    }

    #[test]
    fn empty_install_dir_means_bare_name() {
        let target = LibraryTarget::from_parts(Some(Path::new("")), OsStr::new("libx.so"))
            .expect("target");
        assert_eq!(target.install_dir(), None);
        assert_eq!(target.path(), PathBuf::from("libx.so"));
    }

    #[test]
    fn file_name_with_separator_is_usage_error() {
        for name in ["sub/libx.so", "..", ""] {
            let err = LibraryTarget::from_parts(None, OsStr::new(name)).expect_err(name);
            assert_eq!(err.kind(), ErrorKind::Usage, "{name}");
        }
    }

    #[test]
    fn from_path_splits_parent_and_file() {
        let path = Path::new("lib").join("libenergyplusapi.so");
        let target = LibraryTarget::from_path(&path).expect("target");
        assert_eq!(target.install_dir(), Some(Path::new("lib")));
        assert_eq!(target.file_name(), OsStr::new("libenergyplusapi.so"));
        assert_eq!(target.path(), path);

        let bare = LibraryTarget::from_path(Path::new("libx.so")).expect("bare");
        assert_eq!(bare.install_dir(), None);
    }

    #[test]
    fn from_path_without_file_name_is_rejected() {
        let err = LibraryTarget::from_path(Path::new("..")).expect_err("no file name");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn search_policy_parses_aliases() {
        assert_eq!(SearchPolicy::parse("directory"), Some(SearchPolicy::DirectoryScoped));
        assert_eq!(SearchPolicy::parse(" Scoped "), Some(SearchPolicy::DirectoryScoped));
        assert_eq!(SearchPolicy::parse("default"), Some(SearchPolicy::Default));
        assert_eq!(SearchPolicy::parse("system"), Some(SearchPolicy::Default));
        assert_eq!(SearchPolicy::parse("anywhere"), None);
        assert_eq!(SearchPolicy::default(), SearchPolicy::DirectoryScoped);
    }

    #[test]
    fn default_file_name_matches_platform() {
        let name = default_lib_file_name();
        if cfg!(target_os = "windows") {
            assert_eq!(name, "energyplusapi.dll");
        } else if cfg!(target_os = "macos") {
            assert_eq!(name, "libenergyplusapi.dylib");
        } else {
            assert_eq!(name, "libenergyplusapi.so");
        }
    }

    #[test]
    fn symbol_validation() {
        assert!(validate_symbol(DEFAULT_ENTRY_POINT).is_ok());
        assert_eq!(validate_symbol("").unwrap_err().kind(), ErrorKind::Usage);
        assert_eq!(validate_symbol("a\0b").unwrap_err().kind(), ErrorKind::Usage);
    }
}
