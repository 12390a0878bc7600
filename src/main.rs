//! Purpose: `eplus-probe` CLI entry point.
//! Role: Binary crate root; resolves settings, runs the probe, maps failures to exit codes.
//! Invariants: stdout carries only the probe transcript.
//! Invariants: Diagnostics and logs go to stderr (text or JSON per `--error-format`).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Parser, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use eplus_probe::api::{Error, ErrorKind, SearchPolicy, run_probe, to_exit_code};

mod probe_settings;

use probe_settings::{BakedDefaults, SettingsOverrides, resolve_request};

const LOG_ENV: &str = "EPLUS_PROBE_LOG";

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

#[derive(Copy, Clone, Debug)]
struct ErrorStyle {
    color: ColorMode,
    format: ErrorFormat,
}

impl Default for ErrorStyle {
    fn default() -> Self {
        Self {
            color: ColorMode::Auto,
            format: ErrorFormat::Text,
        }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, style)) => {
            emit_error(&err, style);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ErrorStyle)> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ErrorStyle::default(),
                    )
                })?;
                return Ok(RunOutcome::with_code(0));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `eplus-probe --help`."),
                    ErrorStyle::default(),
                ));
            }
        },
    };

    let style = ErrorStyle {
        color: cli.color,
        format: cli.error_format,
    };
    init_tracing();

    let overrides = SettingsOverrides {
        library: cli.library,
        install_dir: cli.install_dir,
        lib_file_name: cli.lib_file_name,
        search: cli.search.map(SearchPolicy::from),
        symbol: cli.symbol,
    };
    let env = |key: &str| std::env::var_os(key);
    let request = resolve_request(overrides, env, BakedDefaults::from_build())
        .map_err(|err| (err, style))?;

    let stdout = io::stdout().lock();
    // SAFETY: probing an untrusted library is the point of this binary; it runs as a
    // disposable process whose only job is to load and initialize that library.
    let report = unsafe { run_probe(&request, stdout) }.map_err(|err| (err, style))?;
    debug!(
        path = %report.path.display(),
        policy = report.policy.as_str(),
        symbol = %report.symbol,
        "probe succeeded"
    );
    Ok(RunOutcome::ok())
}

#[derive(Parser)]
#[command(
    name = "eplus-probe",
    version,
    about = "Load an EnergyPlus API shared library and call its init entry point",
    help_template = r#"{about-with-newline}
USAGE
  {usage}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    after_help = r#"EXAMPLES
  $ eplus-probe --install-dir /opt/eplus
  $ eplus-probe --library /opt/eplus/libenergyplusapi.so.1
  $ eplus-probe --search default --lib-file-name libenergyplusapi.so

ENVIRONMENT
  EPLUS_PROBE_INSTALL_DIR, EPLUS_PROBE_LIB_FILE_NAME, EPLUS_PROBE_SEARCH,
  EPLUS_PROBE_SYMBOL supply defaults for the matching flags.
  EPLUS_PROBE_LOG sets the stderr log filter (default: warn).

EXIT STATUS
  0 library loaded and initialized
  1 library failed to load, or entry point not found
  2 usage error"#
)]
struct Cli {
    #[arg(
        long,
        help = "Full path to the shared library",
        value_hint = ValueHint::FilePath,
        conflicts_with_all = ["install_dir", "lib_file_name"]
    )]
    library: Option<PathBuf>,
    #[arg(
        long,
        help = "Directory containing the shared library",
        value_hint = ValueHint::DirPath
    )]
    install_dir: Option<PathBuf>,
    #[arg(long, help = "Shared library file name (default: platform EnergyPlus API name)")]
    lib_file_name: Option<OsString>,
    #[arg(
        long,
        value_enum,
        help = "Library search: directory (library's own directory only) or default (platform search path)"
    )]
    search: Option<SearchCli>,
    #[arg(long, help = "Entry point to call (default: initializeFunctionalAPI)")]
    symbol: Option<String>,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,
    #[arg(
        long,
        default_value = "text",
        value_enum,
        help = "Format of stderr diagnostics: text|json"
    )]
    error_format: ErrorFormat,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ErrorFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SearchCli {
    Directory,
    Default,
}

impl From<SearchCli> for SearchPolicy {
    fn from(value: SearchCli) -> Self {
        match value {
            SearchCli::Directory => SearchPolicy::DirectoryScoped,
            SearchCli::Default => SearchPolicy::Default,
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, style: ErrorStyle) {
    match style.format {
        ErrorFormat::Text => {
            let use_color = style.color.use_color(io::stderr().is_terminal());
            eprintln!("{}", error_text(err, use_color));
        }
        ErrorFormat::Json => {
            let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
                "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}"
                    .to_string()
            });
            eprintln!("{json}");
        }
    }
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::LoadFailure => "cannot open library".to_string(),
        ErrorKind::SymbolResolution => "cannot get function".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(symbol) = err.symbol() {
        inner.insert("symbol".to_string(), json!(symbol));
    }
    if let Some(stage) = err.stage() {
        inner.insert("stage".to_string(), json!(stage.as_str()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(symbol) = err.symbol() {
        lines.push(format!(
            "{} {symbol}",
            colorize_label("symbol:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, ErrorFormat, SearchCli, error_json, error_text};
    use clap::Parser;
    use eplus_probe::api::{Error, ErrorKind, ProbeStage};
    use std::io;

    #[test]
    fn no_arguments_parse() {
        let cli = Cli::try_parse_from(["eplus-probe"]).expect("parse");
        assert!(cli.library.is_none());
        assert!(cli.search.is_none());
        assert_eq!(cli.error_format, ErrorFormat::Text);
    }

    #[test]
    fn library_conflicts_with_parts() {
        let result = Cli::try_parse_from([
            "eplus-probe",
            "--library",
            "/opt/eplus/libenergyplusapi.so",
            "--install-dir",
            "/opt/eplus",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn search_flag_values() {
        let cli = Cli::try_parse_from(["eplus-probe", "--search", "default"]).expect("parse");
        assert_eq!(cli.search, Some(SearchCli::Default));
        assert!(Cli::try_parse_from(["eplus-probe", "--search", "anywhere"]).is_err());
    }

    #[test]
    fn error_text_lists_context_lines() {
        let err = Error::new(ErrorKind::SymbolResolution)
            .with_message("cannot get function initializeFunctionalAPI")
            .with_path("/opt/eplus/libenergyplusapi.so")
            .with_symbol("initializeFunctionalAPI")
            .with_source(io::Error::other("undefined symbol"));
        let text = error_text(&err, false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "error: cannot get function initializeFunctionalAPI",
                "path: /opt/eplus/libenergyplusapi.so",
                "symbol: initializeFunctionalAPI",
                "caused by: undefined symbol",
            ]
        );
    }

    #[test]
    fn error_text_colors_labels_when_enabled() {
        let err = Error::new(ErrorKind::LoadFailure);
        assert_eq!(
            error_text(&err, true),
            "\u{1b}[31merror:\u{1b}[0m cannot open library"
        );
    }

    #[test]
    fn error_json_has_kind_stage_and_causes() {
        let err = Error::new(ErrorKind::LoadFailure)
            .with_message("cannot open library")
            .with_stage(ProbeStage::Loading)
            .with_source(io::Error::other("no such file"));
        let value = error_json(&err);
        let obj = value
            .get("error")
            .and_then(|v| v.as_object())
            .expect("error object");
        assert_eq!(obj.get("kind").and_then(|v| v.as_str()), Some("LoadFailure"));
        assert_eq!(obj.get("stage").and_then(|v| v.as_str()), Some("loading"));
        assert_eq!(obj["causes"][0], "no such file");
        assert!(obj.get("symbol").is_none());
    }
}
