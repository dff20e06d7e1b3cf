use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Targets logged by default: this library and the `therese` binary.
const OWN_TARGETS: [&str; 2] = ["therese_stream", "therese"];
const DEFAULT_LEVEL: &str = "warn";
const DEFAULT_JSON_FILE: &str = "therese.logs.jsonl";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn own_targets_at(level: &str) -> String {
    OWN_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// A bare level (`debug`) applies to our own targets only, so reqwest and
/// hyper stay quiet. Anything with `=` or `,` is a full directive list.
fn filter_directives(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directives) if directives.contains(['=', ',']) => directives.to_string(),
        Some(level) => own_targets_at(level),
        None => own_targets_at(DEFAULT_LEVEL),
    }
}

fn resolve_env_filter(problems: &mut Vec<String>) -> EnvFilter {
    let raw = std::env::var("THERESE_LOG_LEVEL")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok());
    let directives = filter_directives(raw.as_deref());
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        problems.push(format!("invalid log filter {directives:?}: {e}"));
        EnvFilter::new(own_targets_at(DEFAULT_LEVEL))
    })
}

fn json_appender(path: &Path) -> Result<RollingFileAppender, String> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("cannot create log directory {}: {e}", dir.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_FILE);
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|e| format!("cannot open log file {}: {e}", path.display()))
}

/// Installs the process-wide log subscriber once.
///
/// - `THERESE_OBSERVABILITY=0` disables logging entirely.
/// - `THERESE_LOG_LEVEL`, else `RUST_LOG`: a level for this crate and the
///   CLI, or a full filter. Default `warn`, other crates off.
/// - `THERESE_JSON_LOG_PATH`: write JSON lines to that file instead of
///   stderr. Falls back to stderr when the file cannot be opened.
///
/// Console output goes to stderr so it never mixes with streamed text.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let enabled = std::env::var("THERESE_OBSERVABILITY")
            .ok()
            .and_then(|v| parse_bool_env(&v))
            .unwrap_or(true);
        if !enabled {
            return;
        }

        let mut problems = Vec::new();
        let env_filter = resolve_env_filter(&mut problems);
        let appender = std::env::var("THERESE_JSON_LOG_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .and_then(|p| {
                json_appender(Path::new(p.trim()))
                    .map_err(|e| problems.push(e))
                    .ok()
            });

        let installed = match appender {
            Some(writer) => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_writer(writer),
                )
                .try_init(),
            None => tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };
        if installed.is_ok() {
            for problem in problems {
                tracing::warn!("{problem}");
            }
        }
    });
}
