use std::path::PathBuf;

use clap::Parser;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "tanpopo",
    about = "Applies repository tasks and publishes pull requests from GitHub Actions",
    version
)]
/// Every flag doubles as the environment variable GitHub Actions provides.
pub(crate) struct Cli {
    #[arg(long, env = "GITHUB_EVENT_NAME", help = "Name of the triggering webhook event.")]
    pub(crate) event_name: String,

    #[arg(
        long,
        env = "GITHUB_EVENT_PATH",
        help = "Path of the JSON webhook payload."
    )]
    pub(crate) event_path: PathBuf,

    #[arg(long, env = "GITHUB_REPOSITORY", help = "owner/name of the workflow repository.")]
    pub(crate) repository: String,

    #[arg(long, env = "GITHUB_ACTOR", help = "Login that triggered the run.")]
    pub(crate) actor: String,

    #[arg(long, env = "GITHUB_RUN_ID", help = "Identifier of the workflow run.")]
    pub(crate) run_id: String,

    #[arg(long, env = "GITHUB_SERVER_URL", default_value = "https://github.com")]
    pub(crate) server_url: String,

    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com")]
    pub(crate) api_url: String,

    #[arg(
        long,
        env = "GITHUB_WORKSPACE",
        default_value = ".",
        help = "Checkout that holds the task definitions."
    )]
    pub(crate) workspace: PathBuf,

    #[arg(
        long,
        env = "RUNNER_TEMP",
        help = "Parent directory for per-repository clones. Defaults to the system temp dir."
    )]
    pub(crate) runner_temp: Option<PathBuf>,

    #[arg(
        long,
        env = "INPUT_TOKEN",
        hide_env_values = true,
        help = "Bearer token for the GitHub API and clones."
    )]
    pub(crate) token: String,

    #[arg(
        long,
        env = "BOT_GEMINI_API_KEY",
        hide_env_values = true,
        help = "Gemini API key. Only tasks without task.sh need it."
    )]
    pub(crate) gemini_api_key: Option<String>,

    #[arg(
        long,
        env = "TANPOPO_GEMINI_API_BASE",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub(crate) gemini_api_base: String,

    #[arg(long, env = "TANPOPO_MODEL", default_value = "gemini-2.0-flash")]
    pub(crate) model: String,

    #[arg(long, env = "TANPOPO_TASKS_ROOT", default_value = "tasks")]
    pub(crate) tasks_root: String,

    #[arg(
        long,
        env = "TANPOPO_BOT_NAME",
        default_value = "tanpopo-bot",
        help = "Name written into comment markers."
    )]
    pub(crate) bot_name: String,

    #[arg(
        long,
        env = "TANPOPO_BOT_LOGIN",
        help = "Login whose events are ignored. Resolved from the token when unset."
    )]
    pub(crate) bot_login: Option<String>,

    #[arg(long, env = "TANPOPO_DEFAULT_BRANCH", default_value = "main")]
    pub(crate) default_branch: String,

    #[arg(
        long,
        env = "TANPOPO_MAX_TURNS",
        default_value_t = 50,
        value_parser = parse_positive_usize
    )]
    pub(crate) max_turns: usize,

    #[arg(
        long,
        env = "TANPOPO_AGENT_TIMEOUT_SECONDS",
        default_value_t = 1_800,
        value_parser = parse_positive_u64
    )]
    pub(crate) agent_timeout_seconds: u64,

    #[arg(
        long,
        env = "TANPOPO_EXEC_TIMEOUT_SECONDS",
        default_value_t = 600,
        value_parser = parse_positive_u64
    )]
    pub(crate) exec_timeout_seconds: u64,

    #[arg(
        long,
        env = "TANPOPO_MAX_OUTPUT_BYTES",
        default_value_t = 64 * 1024,
        value_parser = parse_positive_usize
    )]
    pub(crate) max_output_bytes: usize,

    #[arg(
        long,
        env = "TANPOPO_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long,
        env = "TANPOPO_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize
    )]
    pub(crate) retry_max_attempts: usize,

    #[arg(long, env = "TANPOPO_RETRY_BASE_DELAY_MS", default_value_t = 500)]
    pub(crate) retry_base_delay_ms: u64,

    #[arg(long, env = "TANPOPO_COMMIT_NAME", default_value = "github-actions[bot]")]
    pub(crate) commit_name: String,

    #[arg(
        long,
        env = "TANPOPO_COMMIT_EMAIL",
        default_value = "41898282+github-actions[bot]@users.noreply.github.com"
    )]
    pub(crate) commit_email: String,
}
