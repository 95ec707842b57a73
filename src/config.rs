//! Configuration management for the miner
//!
//! Supports configuration via command line arguments, environment variables,
//! and configuration files (YAML/JSON). Values given on the command line or
//! through the environment take precedence over the file; the file takes
//! precedence over built-in defaults.

use crate::encoding::CandidateEncoding;
use crate::logging::{LogFormat, LogLevel};
use crate::types::{BlockDescriptor, Difficulty};
use crate::worker::SearchOptions;
use crate::{Error, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete configuration for the miner
#[derive(Debug, Clone, PartialEq, Parser, Serialize, Deserialize)]
#[command(
    name = "pow-miner",
    version = env!("CARGO_PKG_VERSION"),
    about = "Proof-of-work nonce searcher",
    long_about = "Searches for the smallest nonce whose SHA-256 digest over a block \
                  descriptor starts with the requested number of zero hex digits"
)]
pub struct Config {
    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE", env = "POW_MINER_CONFIG")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Block number
    #[arg(short = 'b', long, default_value = "849001")]
    #[serde(default = "default_block_number")]
    pub block_number: u64,

    /// Transactions payload, hashed verbatim
    #[arg(short = 't', long, default_value = DEFAULT_TRANSACTIONS)]
    #[serde(default = "default_transactions")]
    pub transactions: String,

    /// Previous block hash, hashed verbatim
    #[arg(short = 'p', long, default_value = DEFAULT_PREVIOUS_HASH)]
    #[serde(default = "default_previous_hash")]
    pub previous_hash: String,

    /// Required number of leading zero hex digits (0-64)
    #[arg(short = 'd', long, default_value = "5", env = "POW_MINER_DIFFICULTY")]
    #[serde(default = "default_difficulty")]
    pub difficulty: u64,

    /// Number of worker threads (0 = one per CPU)
    #[arg(short = 'c', long, default_value = "0", env = "POW_MINER_THREADS")]
    #[serde(default)]
    pub threads: usize,

    /// Give up after this long, e.g. "30s" or "2m"
    #[arg(long, value_name = "DURATION", env = "POW_MINER_TIMEOUT")]
    #[serde(default)]
    pub timeout: Option<String>,

    /// Interval between progress reports
    #[arg(long, value_name = "DURATION", default_value = "5s")]
    #[serde(default = "default_progress_interval")]
    pub progress_interval: String,

    /// Largest nonce to try
    #[arg(long)]
    #[serde(default)]
    pub max_nonce: Option<u64>,

    /// Candidate byte layout
    #[arg(short = 'e', long, value_enum, default_value = "concatenated")]
    #[serde(default)]
    pub encoding: CandidateEncoding,

    /// Print the result as JSON on stdout
    #[arg(long)]
    #[serde(default)]
    pub json: bool,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "info", env = "POW_MINER_LOG_LEVEL")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "plain")]
    #[serde(default)]
    pub log_format: LogFormat,
}

const DEFAULT_TRANSACTIONS: &str = "Alice mengirim 1 BTC ke Bob, Charlie mengirim 0.5 BTC ke David";
const DEFAULT_PREVIOUS_HASH: &str =
    "00000000000000000002a7b450b73f8a0c24a64e1b0f69f0b1f1d1e2e3d4f5g6";

impl Config {
    /// Load configuration from the process arguments and environment,
    /// merging in the config file if one is given
    pub async fn load() -> Result<Self> {
        let matches = Self::command().get_matches();
        Self::from_matches(matches).await
    }

    /// Like [`Config::load`], for an explicit argument list
    pub async fn load_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command()
            .try_get_matches_from(args)
            .map_err(|e| Error::config(e.to_string()))?;
        Self::from_matches(matches).await
    }

    async fn from_matches(matches: ArgMatches) -> Result<Self> {
        let mut config =
            Self::from_arg_matches(&matches).map_err(|e| Error::config(e.to_string()))?;

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config, &matches);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            // Default to YAML
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Take file values for every option the user did not set explicitly
    fn merge_with_file(mut self, file: Self, matches: &ArgMatches) -> Self {
        let explicit = |id: &str| {
            matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        };

        if !explicit("block_number") {
            self.block_number = file.block_number;
        }
        if !explicit("transactions") {
            self.transactions = file.transactions;
        }
        if !explicit("previous_hash") {
            self.previous_hash = file.previous_hash;
        }
        if !explicit("difficulty") {
            self.difficulty = file.difficulty;
        }
        if !explicit("threads") {
            self.threads = file.threads;
        }
        if !explicit("timeout") {
            self.timeout = file.timeout;
        }
        if !explicit("progress_interval") {
            self.progress_interval = file.progress_interval;
        }
        if !explicit("max_nonce") {
            self.max_nonce = file.max_nonce;
        }
        if !explicit("encoding") {
            self.encoding = file.encoding;
        }
        if !explicit("json") {
            self.json = file.json;
        }
        if !explicit("log_level") {
            self.log_level = file.log_level;
        }
        if !explicit("log_format") {
            self.log_format = file.log_format;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Difficulty::new(self.difficulty)?;

        if let Some(timeout) = self.timeout_duration()? {
            if timeout.is_zero() {
                return Err(Error::config("Timeout must be greater than 0"));
            }
        }

        if self.progress_interval_duration()?.is_zero() {
            return Err(Error::config("Progress interval must be greater than 0"));
        }

        Ok(())
    }

    /// Get the block descriptor to mine
    pub fn block(&self) -> Result<BlockDescriptor> {
        BlockDescriptor::new(
            self.block_number,
            self.transactions.as_str(),
            self.previous_hash.as_str(),
            self.difficulty,
        )
    }

    /// Get search options
    pub fn search_options(&self) -> Result<SearchOptions> {
        let mut options = SearchOptions::default()
            .with_workers(self.threads)
            .with_progress_interval(self.progress_interval_duration()?)
            .with_encoding(self.encoding);
        if let Some(timeout) = self.timeout_duration()? {
            options = options.with_timeout(timeout);
        }
        if let Some(max_nonce) = self.max_nonce {
            options = options.with_max_nonce(max_nonce);
        }
        Ok(options)
    }

    /// Get timeout duration
    pub fn timeout_duration(&self) -> Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|value| parse_duration("timeout", value))
            .transpose()
    }

    /// Get progress interval duration
    pub fn progress_interval_duration(&self) -> Result<Duration> {
        parse_duration("progress interval", &self.progress_interval)
    }
}

fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| Error::config(format!("Invalid {} '{}': {}", name, value, e)))
}

// Default value functions for serde
fn default_block_number() -> u64 { 849001 }
fn default_transactions() -> String { DEFAULT_TRANSACTIONS.to_string() }
fn default_previous_hash() -> String { DEFAULT_PREVIOUS_HASH.to_string() }
fn default_difficulty() -> u64 { 5 }
fn default_progress_interval() -> String { "5s".to_string() }
fn default_log_level() -> LogLevel { LogLevel::Info }

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::try_parse_from(["pow-miner"]).unwrap();

        assert_eq!(config.block_number, 849001);
        assert_eq!(config.transactions, DEFAULT_TRANSACTIONS);
        assert_eq!(config.previous_hash, DEFAULT_PREVIOUS_HASH);
        assert_eq!(config.difficulty, 5);
        assert_eq!(config.threads, 0);
        assert_eq!(config.timeout, None);
        assert_eq!(config.encoding, CandidateEncoding::Concatenated);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Plain);
        assert!(!config.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_search_options_from_flags() {
        let config = Config::try_parse_from([
            "pow-miner",
            "--threads", "3",
            "--timeout", "1m 30s",
            "--progress-interval", "250ms",
            "--max-nonce", "1000",
            "--encoding", "length-prefixed",
        ])
        .unwrap();

        let options = config.search_options().unwrap();
        assert_eq!(options.workers, 3);
        assert_eq!(options.timeout, Some(Duration::from_secs(90)));
        assert_eq!(options.progress_interval, Duration::from_millis(250));
        assert_eq!(options.max_nonce.value(), 1000);
        assert_eq!(options.encoding, CandidateEncoding::LengthPrefixed);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = Config::try_parse_from(["pow-miner", "--difficulty", "65"]).unwrap();
        assert_matches!(config.validate(), Err(Error::InvalidDifficulty { difficulty: 65, .. }));

        let config = Config::try_parse_from(["pow-miner", "--timeout", "soon"]).unwrap();
        assert_matches!(config.validate(), Err(Error::Config { .. }));

        let config = Config::try_parse_from(["pow-miner", "--progress-interval", "0s"]).unwrap();
        assert_matches!(config.validate(), Err(Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let file = temp_config(
            ".yaml",
            r#"
block_number: 1
transactions: "A->B:1"
previous_hash: "0000000000000000000000000000000000000000000000000000000000000000"
difficulty: 1
threads: 4
timeout: 10s
"#,
        );

        let config = Config::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.block_number, 1);
        assert_eq!(config.transactions, "A->B:1");
        assert_eq!(config.difficulty, 1);
        assert_eq!(config.threads, 4);
        assert_eq!(config.timeout_duration().unwrap(), Some(Duration::from_secs(10)));
        // Unset fields fall back to defaults.
        assert_eq!(config.progress_interval, "5s");
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[tokio::test]
    async fn test_config_from_json() {
        let file = temp_config(".json", r#"{"difficulty": 2, "encoding": "length-prefixed"}"#);

        let config = Config::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.encoding, CandidateEncoding::LengthPrefixed);
        assert_eq!(config.block_number, 849001);
    }

    #[tokio::test]
    async fn test_command_line_overrides_file() {
        let file = temp_config(".yaml", "difficulty: 2\nthreads: 4\nblock_number: 7\n");
        let path = file.path().to_string_lossy().into_owned();

        let config = Config::load_from_args([
            "pow-miner",
            "--config-file",
            path.as_str(),
            "--difficulty",
            "3",
        ])
        .await
        .unwrap();

        assert_eq!(config.difficulty, 3);
        assert_eq!(config.threads, 4);
        assert_eq!(config.block_number, 7);
    }

    #[tokio::test]
    async fn test_invalid_file_difficulty_is_rejected() {
        let file = temp_config(".yaml", "difficulty: 65\n");
        let path = file.path().to_string_lossy().into_owned();

        let err = Config::load_from_args(["pow-miner", "--config-file", path.as_str()])
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidDifficulty { difficulty: 65, .. });
    }

    #[test]
    fn test_block_from_config() {
        let args = ["pow-miner", "-b", "1", "-t", "A->B:1", "-d", "1"];
        let config = Config::try_parse_from(args).unwrap();
        let block = config.block().unwrap();
        assert_eq!(block.block_number(), 1);
        assert_eq!(block.transactions(), "A->B:1");
        assert_eq!(block.previous_hash(), DEFAULT_PREVIOUS_HASH);
        assert_eq!(block.difficulty().zeros(), 1);
    }
}
