//! # CLI Interface
//!
//! Argument parsing for `tricoin-node` via `clap` derive. The binary has
//! one job — serve the chain — so there are no subcommands, just a listen
//! address, a data directory, and logging knobs. Every flag has an
//! environment-variable fallback for container deployments.

use std::path::PathBuf;

use clap::Parser;

use tricoin_protocol::config::{DEFAULT_ADDR, DEFAULT_DB_PATH};

/// The tricoin authoritative node.
///
/// Accepts block submissions from miners over HTTP, validates them against
/// the triple-collision puzzle, and maintains the persistent best-difficulty
/// chain together with the producer leaderboard.
#[derive(Parser, Debug, Clone)]
#[command(name = "tricoin-node", about = "Tricoin authoritative consensus node", version)]
pub struct NodeCli {
    /// HTTP listen address.
    #[arg(long, env = "TRICOIN_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Chain database directory. Created (and genesis mined) on first run.
    #[arg(long, env = "TRICOIN_DATA_DIR", default_value = DEFAULT_DB_PATH)]
    pub data_dir: PathBuf,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "TRICOIN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "TRICOIN_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        NodeCli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = NodeCli::parse_from(["tricoin-node"]);
        assert_eq!(cli.addr, DEFAULT_ADDR);
        assert_eq!(cli.data_dir, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.log_format, "pretty");
    }

    #[test]
    fn custom_arguments() {
        let cli = NodeCli::parse_from([
            "tricoin-node",
            "--addr",
            "127.0.0.1:9090",
            "--data-dir",
            "/tmp/tricoin-test",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ]);
        assert_eq!(cli.addr, "127.0.0.1:9090");
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/tricoin-test"));
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.log_format, "json");
    }
}
