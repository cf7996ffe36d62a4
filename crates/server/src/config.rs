// crates/server/src/config.rs
//! Command-line and environment configuration for the `agent-status` binary.

use std::net::SocketAddr;
use std::path::PathBuf;

use agent_status_core::{
    BroadcastConfig, HubConfig, DEFAULT_HISTORY_PAGE_SIZE, DEFAULT_SUBSCRIBER_CAPACITY,
};
use clap::Parser;

use crate::auth::AuthTokens;

/// Job status tracking service
#[derive(Parser, Debug, Clone)]
#[command(name = "agent-status")]
#[command(about = "Track job status updates and stream them to observers")]
#[command(version)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "data.sqlite3")]
    pub database: PathBuf,

    /// Comma-separated CORS origins, or `*` for any origin
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "*")]
    pub allowed_origins: String,

    /// Buffered updates per stream subscriber before drops start
    #[arg(long, env = "SUBSCRIBER_CAPACITY", default_value_t = DEFAULT_SUBSCRIBER_CAPACITY)]
    pub subscriber_capacity: usize,

    /// Rows read per page while a stream replays history
    #[arg(long, env = "HISTORY_PAGE_SIZE", default_value_t = DEFAULT_HISTORY_PAGE_SIZE)]
    pub history_page_size: usize,

    /// Token allowed to create jobs
    #[arg(long, env = "JOB_CREATOR_TOKEN", hide_env_values = true)]
    pub job_creator_token: Option<String>,

    /// Token allowed to push status updates
    #[arg(long, env = "STATUS_REPORTER_TOKEN", hide_env_values = true)]
    pub status_reporter_token: Option<String>,

    /// Token allowed to do both
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,
}

impl Cli {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address {}:{}: {e}", self.host, self.port))
    }

    /// `None` means any origin; otherwise the explicit list.
    pub fn origins(&self) -> Option<Vec<String>> {
        parse_origins(&self.allowed_origins)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            broadcast: BroadcastConfig {
                subscriber_capacity: self.subscriber_capacity.max(1),
            },
            history_page_size: self.history_page_size.max(1),
        }
    }

    pub fn auth_tokens(&self) -> AuthTokens {
        AuthTokens::new(
            self.job_creator_token.clone(),
            self.status_reporter_token.clone(),
            self.admin_token.clone(),
        )
    }
}

fn parse_origins(raw: &str) -> Option<Vec<String>> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        None
    } else {
        Some(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["agent-status"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_explicit_flags() {
        let cli = parse(&[
            "--port",
            "9100",
            "--host",
            "127.0.0.1",
            "--database",
            "/tmp/status.db",
            "--subscriber-capacity",
            "8",
            "--history-page-size",
            "10",
        ]);
        assert_eq!(cli.bind_addr().unwrap().to_string(), "127.0.0.1:9100");
        assert_eq!(cli.database, PathBuf::from("/tmp/status.db"));

        let hub = cli.hub_config();
        assert_eq!(hub.broadcast.subscriber_capacity, 8);
        assert_eq!(hub.history_page_size, 10);
    }

    #[test]
    fn test_zero_sizes_are_clamped() {
        let cli = parse(&["--subscriber-capacity", "0", "--history-page-size", "0"]);
        let hub = cli.hub_config();
        assert_eq!(hub.broadcast.subscriber_capacity, 1);
        assert_eq!(hub.history_page_size, 1);
    }

    #[test]
    fn test_invalid_host_is_an_error() {
        let cli = parse(&["--host", "not a host"]);
        assert!(cli.bind_addr().is_err());
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(parse_origins("*"), None);
        assert_eq!(parse_origins(""), None);
        assert_eq!(parse_origins("https://a.example, *"), None);
        assert_eq!(
            parse_origins("https://a.example, https://b.example"),
            Some(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string()
            ])
        );
    }
}
