use std::io::Write;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout is reserved for workflow commands.
pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

pub(crate) fn add_mask_command(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| format!("::add-mask::{value}"))
}

/// Registers `values` with the Actions log redactor. Must run before any of
/// them can reach a log line.
pub(crate) fn mask_secrets<'a>(values: impl IntoIterator<Item = &'a str>) {
    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    for command in values.into_iter().filter_map(add_mask_command) {
        let _ = writeln!(stdout, "{command}");
    }
    let _ = stdout.flush();
}
