//! CLI configuration module
//!
//! Validated settings derived from the command line.

use std::time::Duration;

use crate::cli::args::CliArgs;
use crate::error::{Result, TorrentError};
use crate::peer::SessionOptions;
use crate::storage::{DownloadOptions, BLOCK_SIZE};

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct Config {
    /// Port announced to the tracker
    pub port: u16,
    /// TCP connect deadline
    pub connect_timeout: Duration,
    /// Per read/write deadline
    pub io_timeout: Duration,
    /// Connections per (peer, piece)
    pub attempts: usize,
    /// Concurrent piece fetches
    pub workers: usize,
    /// Tracker refreshes without progress before giving up
    pub max_refreshes: usize,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        Self {
            port: args.port,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            io_timeout: Duration::from_secs(args.io_timeout),
            attempts: args.attempts,
            workers: args.workers,
            max_refreshes: args.max_refreshes,
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port"));
        }
        if self.connect_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field(
                "connect timeout must be at least one second",
                "connect_timeout",
            ));
        }
        if self.io_timeout.is_zero() {
            return Err(TorrentError::config_error_with_field(
                "I/O timeout must be at least one second",
                "io_timeout",
            ));
        }
        if self.attempts == 0 {
            return Err(TorrentError::config_error_with_field("attempts must be at least 1", "attempts"));
        }
        if self.workers == 0 {
            return Err(TorrentError::config_error_with_field("workers must be at least 1", "workers"));
        }
        if self.verbose && self.quiet {
            return Err(TorrentError::config_error_with_field(
                "--verbose and --quiet are mutually exclusive",
                "verbose",
            ));
        }
        Ok(())
    }

    /// Limits for each peer session
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            max_attempts: self.attempts,
            block_size: BLOCK_SIZE,
            extensions: false,
        }
    }

    /// Orchestrator settings
    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            workers: self.workers,
            max_refreshes: self.max_refreshes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(extra: &[&str]) -> Config {
        let mut argv = vec!["bittorrent-client", "info", "x.torrent"];
        argv.extend_from_slice(extra);
        Config::from_args(&CliArgs::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_config_from_args() {
        let config = config(&["--port", "6882", "--io-timeout", "5", "--workers", "2"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 6882);

        let session = config.session_options();
        assert_eq!(session.io_timeout, Duration::from_secs(5));
        assert_eq!(session.connect_timeout, Duration::from_secs(10));
        assert_eq!(session.max_attempts, 3);
        assert!(!session.extensions);
        assert_eq!(config.download_options().workers, 2);
    }

    #[test]
    fn test_invalid_values() {
        for extra in [
            ["--port", "0"],
            ["--attempts", "0"],
            ["--workers", "0"],
            ["--io-timeout", "0"],
            ["--connect-timeout", "0"],
        ] {
            let err = config(&extra).validate().unwrap_err();
            assert!(matches!(err, TorrentError::ConfigError { .. }), "{:?}", extra);
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(config(&["-v", "-q"]).validate().is_err());
    }
}
