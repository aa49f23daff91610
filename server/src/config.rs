use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// Command line options for the server.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Override bind address (host:port).
    #[arg(long)]
    pub bind: Option<String>,
    /// Override server port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Directory holding the database file.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Insert sample users and circles into an empty database.
    #[arg(long)]
    pub seed: bool,
}

/// Runtime configuration for the server resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub bind: String,
    /// Base directory for the SQLite database.
    pub data_dir: PathBuf,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
    /// Pause before answering a failed sign-in.
    pub signin_delay: Duration,
    /// Lifetime of issued sign-in tokens.
    pub token_ttl: time::Duration,
    /// Seed sample data on startup when the directory is empty.
    pub seed_sample_data: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    auth: FileAuth,
    #[serde(default)]
    data: FileData,
}

#[derive(Deserialize)]
struct FileServer {
    #[serde(default = "default_port")]
    port: u16,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

#[derive(Deserialize)]
struct FileAuth {
    #[serde(default = "default_signin_delay_ms")]
    signin_delay_ms: u64,
    #[serde(default = "default_token_ttl_hours")]
    token_ttl_hours: i64,
}

#[derive(Deserialize, Default)]
struct FileData {
    #[serde(default)]
    seed: bool,
}

fn default_port() -> u16 {
    8787
}

fn default_logging() -> bool {
    true
}

fn default_signin_delay_ms() -> u64 {
    1000
}

fn default_token_ttl_hours() -> i64 {
    24
}

impl Default for FileServer {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Default for FileAuth {
    fn default() -> Self {
        Self {
            signin_delay_ms: default_signin_delay_ms(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("CIRCLES_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/circles.toml"));

        let file_cfg: FileConfig = match fs::read(&config_path) {
            Ok(bytes) => {
                let contents = String::from_utf8_lossy(&bytes);
                toml::from_str(&contents).context("invalid config file")?
            }
            Err(_) => FileConfig::default(),
        };
        let mut port = file_cfg.server.port;
        let mut logging = file_cfg.logging.enabled;
        let mut seed = file_cfg.data.seed;

        // environment overrides
        if let Ok(p) = std::env::var("CIRCLES_PORT") {
            if let Ok(p) = p.parse::<u16>() {
                port = p;
            }
        }
        if let Ok(l) = std::env::var("CIRCLES_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }
        if let Ok(s) = std::env::var("CIRCLES_SEED") {
            if let Ok(s) = s.parse::<bool>() {
                seed = s;
            }
        }

        // CLI overrides
        if let Some(p) = cli.port {
            port = p;
        }
        if let Some(l) = cli.logging {
            logging = l;
        }
        if cli.seed {
            seed = true;
        }

        if !(1024..=65535).contains(&port) {
            anyhow::bail!("invalid_port");
        }
        if file_cfg.auth.token_ttl_hours <= 0 {
            anyhow::bail!("invalid_token_ttl");
        }

        let bind = if let Some(b) = &cli.bind {
            b.clone()
        } else if let Ok(b) = std::env::var("BIND") {
            b
        } else {
            format!("127.0.0.1:{}", port)
        };

        let data_dir = cli
            .data_dir
            .clone()
            .or_else(|| std::env::var("DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        Ok(Self {
            bind,
            data_dir,
            logging_enabled: logging,
            signin_delay: Duration::from_millis(file_cfg.auth.signin_delay_ms),
            token_ttl: time::Duration::hours(file_cfg.auth.token_ttl_hours),
            seed_sample_data: seed,
        })
    }

    /// Configuration suitable for tests: everything default, data in `data_dir`.
    pub fn for_data_dir(bind: String, data_dir: PathBuf) -> Self {
        Self {
            bind,
            data_dir,
            logging_enabled: false,
            signin_delay: Duration::from_millis(default_signin_delay_ms()),
            token_ttl: time::Duration::hours(default_token_ttl_hours()),
            seed_sample_data: false,
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("circles.db")
    }
}

/// Determine the default data directory for the server.
pub fn default_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".local/share/circles");
        p
    } else {
        PathBuf::from("./circles_data")
    }
}
