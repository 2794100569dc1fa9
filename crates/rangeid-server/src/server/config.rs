use anyhow::{Context, bail};
use clap::Parser;
use rangeid::{MAX_UPDATE_ATTEMPTS, UpdatePolicy};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runtime configuration for the `rangeid-server` binary.
///
/// All values are parsed from CLI arguments or environment variables, with
/// defaults suitable for a single-node deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rangeid-server",
    version,
    about = "An HTTP service allocating range-bound IDs from per-application ledgers"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Directory holding one ledger file per application.
    ///
    /// When unset, ledgers are kept in memory and lost on shutdown.
    ///
    /// Environment variable: `DATA_DIR`
    #[arg(long, env = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Number of conditional writes attempted per request before it fails
    /// with a conflict.
    ///
    /// Every attempt re-reads the ledger immediately, without backoff.
    ///
    /// Environment variable: `MAX_UPDATE_ATTEMPTS`
    #[arg(long, env = "MAX_UPDATE_ATTEMPTS", default_value_t = MAX_UPDATE_ATTEMPTS)]
    pub max_update_attempts: u32,

    /// Maximum number of ranges accepted in a single request.
    ///
    /// Environment variable: `MAX_RANGES`
    #[arg(long, env = "MAX_RANGES", default_value_t = 1024)]
    pub max_ranges: usize,

    /// Serve probes (`GET /v2/getNext`) from the latest known ledger snapshot
    /// instead of reading the store.
    ///
    /// Environment variable: `CACHE_SNAPSHOTS`
    #[arg(long, env = "CACHE_SNAPSHOTS", default_value_t = true, action = clap::ArgAction::Set)]
    pub cache_snapshots: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: SocketAddr,
    pub data_dir: Option<PathBuf>,
    pub policy: UpdatePolicy,
    pub max_ranges: usize,
    pub cache_snapshots: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_update_attempts == 0 {
            bail!("MAX_UPDATE_ATTEMPTS must be greater than 0");
        }

        if args.max_ranges == 0 {
            bail!("MAX_RANGES must be greater than 0");
        }

        let server_addr = args
            .server_addr
            .parse()
            .with_context(|| format!("SERVER_ADDR ({}) is not a socket address", args.server_addr))?;

        Ok(Self {
            server_addr,
            data_dir: args.data_dir,
            policy: UpdatePolicy::with_max_attempts(args.max_update_attempts),
            max_ranges: args.max_ranges,
            cache_snapshots: args.cache_snapshots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("rangeid-server").chain(args.iter().copied()))?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn explicit_flags_are_validated() {
        let config = parse(&[
            "--server-addr",
            "127.0.0.1:9000",
            "--data-dir",
            "/var/lib/rangeid",
            "--max-update-attempts",
            "7",
            "--max-ranges",
            "16",
            "--cache-snapshots",
            "false",
        ])
        .unwrap();

        assert_eq!(config.server_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/rangeid")));
        assert_eq!(config.policy.max_attempts, 7);
        assert_eq!(config.max_ranges, 16);
        assert!(!config.cache_snapshots);
    }

    #[test]
    fn rejects_zero_attempts() {
        let err = parse(&["--max-update-attempts", "0"]).unwrap_err();
        assert!(err.to_string().contains("MAX_UPDATE_ATTEMPTS"));
    }

    #[test]
    fn rejects_unparsable_address() {
        let err = parse(&["--server-addr", "localhost"]).unwrap_err();
        assert!(err.to_string().contains("SERVER_ADDR"));
    }
}
