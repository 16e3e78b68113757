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

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "docwatch",
    about = "Watches document comments and forwards new replies to a tool-using agent",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "DOCWATCH_BIND",
        default_value = "127.0.0.1:8787",
        help = "Socket address for the HTTP gateway"
    )]
    pub(crate) bind: String,

    #[arg(
        long = "doc-api-base",
        env = "DOCWATCH_DOC_API_BASE",
        help = "Base URL of the document comment API"
    )]
    pub(crate) doc_api_base: Option<String>,

    #[arg(
        long = "access-token",
        env = "DOCWATCH_ACCESS_TOKEN",
        hide_env_values = true,
        help = "Bearer token for the document API; falls back to --credential-cache"
    )]
    pub(crate) access_token: Option<String>,

    #[arg(
        long = "credential-cache",
        env = "DOCWATCH_CREDENTIAL_CACHE",
        default_value = ".docwatch/credentials.json",
        help = "Access-token cache file, removed on shutdown"
    )]
    pub(crate) credential_cache: PathBuf,

    #[arg(
        long = "request-timeout-ms",
        env = "DOCWATCH_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "Timeout for document API requests and agent connection setup"
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "DOCWATCH_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Attempts per document API request, including the first"
    )]
    pub(crate) retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "DOCWATCH_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for exponential retry backoff"
    )]
    pub(crate) retry_base_delay_ms: u64,

    #[arg(
        long = "agent-endpoint",
        env = "DOCWATCH_AGENT_ENDPOINT",
        help = "Agent runtime URL accepting run requests and streaming NDJSON progress"
    )]
    pub(crate) agent_endpoint: Option<String>,

    #[arg(
        long = "agent-max-iterations",
        env = "DOCWATCH_AGENT_MAX_ITERATIONS",
        default_value_t = 10,
        value_parser = parse_positive_u32,
        help = "Upper bound on agent reasoning/tool iterations per run"
    )]
    pub(crate) agent_max_iterations: u32,

    #[arg(
        long = "default-interval-ms",
        env = "DOCWATCH_DEFAULT_INTERVAL_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Poll interval for monitors started without an explicit interval"
    )]
    pub(crate) default_interval_ms: u64,

    #[arg(
        long = "monitor",
        env = "DOCWATCH_MONITOR",
        value_delimiter = ',',
        help = "Document id to monitor at startup (repeatable or comma-separated)"
    )]
    pub(crate) monitor: Vec<String>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn unit_cli_defaults_and_repeatable_monitors() {
        let cli = Cli::try_parse_from([
            "docwatch",
            "--monitor",
            "doc-a,doc-b",
            "--monitor",
            "doc-c",
        ])
        .expect("parse cli");
        assert_eq!(cli.bind, "127.0.0.1:8787");
        assert_eq!(cli.agent_max_iterations, 10);
        assert_eq!(cli.default_interval_ms, 30_000);
        assert_eq!(cli.monitor, vec!["doc-a", "doc-b", "doc-c"]);
    }

    #[test]
    fn regression_zero_values_are_rejected_at_parse_time() {
        assert!(Cli::try_parse_from(["docwatch", "--default-interval-ms", "0"]).is_err());
        assert!(Cli::try_parse_from(["docwatch", "--retry-max-attempts", "0"]).is_err());
        assert!(Cli::try_parse_from(["docwatch", "--agent-max-iterations", "0"]).is_err());
    }
}
