//! Purpose: Resolve the probe request from CLI flags, environment, and build-time placeholders.
//! Exports: `SettingsOverrides`, `BakedDefaults`, `resolve_request`, env var names.
//! Role: Single source of precedence rules for the `eplus-probe` binary.
//! Invariants: Precedence is flags > environment > baked placeholders > built-in defaults.
//! Invariants: Empty environment or placeholder values count as unset.

use std::ffi::OsString;
use std::path::PathBuf;

use eplus_probe::api::{
    DEFAULT_ENTRY_POINT, Error, ErrorKind, LibraryTarget, ProbeRequest, SearchPolicy,
    default_lib_file_name,
};

pub(crate) const ENV_INSTALL_DIR: &str = "EPLUS_PROBE_INSTALL_DIR";
pub(crate) const ENV_LIB_FILE_NAME: &str = "EPLUS_PROBE_LIB_FILE_NAME";
pub(crate) const ENV_SEARCH: &str = "EPLUS_PROBE_SEARCH";
pub(crate) const ENV_SYMBOL: &str = "EPLUS_PROBE_SYMBOL";

/// Values substituted into the binary at build time.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BakedDefaults {
    pub(crate) install_dir: Option<&'static str>,
    pub(crate) lib_file_name: Option<&'static str>,
}

impl BakedDefaults {
    pub(crate) fn from_build() -> Self {
        Self {
            install_dir: option_env!("EPLUS_INSTALL_NO_SLASH"),
            lib_file_name: option_env!("LIB_FILE_NAME"),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SettingsOverrides {
    pub(crate) library: Option<PathBuf>,
    pub(crate) install_dir: Option<PathBuf>,
    pub(crate) lib_file_name: Option<OsString>,
    pub(crate) search: Option<SearchPolicy>,
    pub(crate) symbol: Option<String>,
}

pub(crate) fn resolve_request<F>(
    overrides: SettingsOverrides,
    env: F,
    baked: BakedDefaults,
) -> Result<ProbeRequest, Error>
where
    F: Fn(&str) -> Option<OsString>,
{
    let env_value = |key: &str| env(key).filter(|value| !value.is_empty());
    let baked_value = |value: Option<&'static str>| value.filter(|value| !value.is_empty());

    let target = match overrides.library {
        Some(path) => LibraryTarget::from_path(&path)?,
        None => {
            let install_dir = overrides
                .install_dir
                .or_else(|| env_value(ENV_INSTALL_DIR).map(PathBuf::from))
                .or_else(|| baked_value(baked.install_dir).map(PathBuf::from));
            let file_name = overrides
                .lib_file_name
                .or_else(|| env_value(ENV_LIB_FILE_NAME))
                .or_else(|| baked_value(baked.lib_file_name).map(OsString::from))
                .unwrap_or_else(|| OsString::from(default_lib_file_name()));
            LibraryTarget::from_parts(install_dir.as_deref(), &file_name)?
        }
    };

    let policy = match overrides.search {
        Some(policy) => policy,
        None => match env_value(ENV_SEARCH) {
            Some(raw) => parse_env_policy(&raw)?,
            None => SearchPolicy::default(),
        },
    };

    let symbol = overrides
        .symbol
        .or_else(|| env_value(ENV_SYMBOL).map(|value| value.to_string_lossy().into_owned()))
        .unwrap_or_else(|| DEFAULT_ENTRY_POINT.to_string());

    ProbeRequest::new(target, policy, symbol)
}

fn parse_env_policy(raw: &OsString) -> Result<SearchPolicy, Error> {
    let text = raw.to_string_lossy();
    SearchPolicy::parse(&text).ok_or_else(|| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid {ENV_SEARCH} value: {text}"))
            .with_hint("Use `directory` or `default`.")
    })
}
