use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// Command line options for the server.
#[derive(Parser, Debug, Default)]
pub struct Cli {
    /// Override bind address (host:port).
    #[arg(long)]
    pub bind: Option<String>,
    /// Override server port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Override SQLite database path.
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// Address to bind the HTTP server to.
    pub bind: String,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Seconds of heartbeat silence before a user counts as offline.
    pub online_threshold_secs: i64,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: FileServer,
    #[serde(default)]
    storage: FileStorage,
    #[serde(default)]
    presence: FilePresence,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize)]
struct FileServer {
    #[serde(default = "default_port")]
    port: u16,
}

#[derive(Deserialize, Default)]
struct FileStorage {
    #[serde(default)]
    db_path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct FilePresence {
    #[serde(default = "default_online_threshold")]
    online_threshold_secs: i64,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

fn default_port() -> u16 {
    8788
}

fn default_online_threshold() -> i64 {
    300
}

fn default_logging() -> bool {
    true
}

impl Default for FileServer {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for FilePresence {
    fn default() -> Self {
        Self {
            online_threshold_secs: default_online_threshold(),
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

impl Config {
    /// Resolve configuration with precedence CLI -> env -> file -> defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut port = default_port();
        let mut logging = default_logging();
        let mut online_threshold = default_online_threshold();
        let mut db_path: Option<PathBuf> = None;

        let config_path = cli
            .config
            .clone()
            .or_else(|| {
                std::env::var("COMMUNITY_CHAT_CONFIG")
                    .ok()
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from("config/community_chat.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents).context("invalid config file")?;
            port = file_cfg.server.port;
            logging = file_cfg.logging.enabled;
            online_threshold = file_cfg.presence.online_threshold_secs;
            db_path = file_cfg.storage.db_path;
        }

        // environment overrides
        if let Ok(p) = std::env::var("COMMUNITY_CHAT_PORT") {
            if let Ok(p) = p.parse::<u16>() {
                port = p;
            }
        }
        if let Ok(l) = std::env::var("COMMUNITY_CHAT_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }
        if let Ok(d) = std::env::var("COMMUNITY_CHAT_DB") {
            db_path = Some(PathBuf::from(d));
        }

        // CLI overrides
        if let Some(p) = cli.port {
            port = p;
        }
        if let Some(l) = cli.logging {
            logging = l;
        }
        if let Some(d) = &cli.db {
            db_path = Some(d.clone());
        }

        if !(1024..=65535).contains(&port) {
            anyhow::bail!("invalid_port");
        }
        if online_threshold <= 0 {
            anyhow::bail!("invalid_online_threshold");
        }

        let bind = if let Some(b) = &cli.bind {
            b.clone()
        } else if let Ok(b) = std::env::var("BIND") {
            b
        } else {
            format!("127.0.0.1:{}", port)
        };

        Ok(Self {
            bind,
            db_path: db_path.unwrap_or_else(default_db_path),
            online_threshold_secs: online_threshold,
            logging_enabled: logging,
        })
    }
}

/// Default database location under the user's data directory.
pub fn default_db_path() -> PathBuf {
    if let Ok(dir) = std::env::var("DATA_DIR") {
        PathBuf::from(dir).join("community_chat.db")
    } else if let Ok(home) = std::env::var("HOME") {
        let mut p = PathBuf::from(home);
        p.push(".local/share/community_chat/community_chat.db");
        p
    } else {
        PathBuf::from("./community_chat.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn clear_env() {
        std::env::remove_var("COMMUNITY_CHAT_PORT");
        std::env::remove_var("COMMUNITY_CHAT_LOGGING");
        std::env::remove_var("COMMUNITY_CHAT_DB");
    }

    #[test]
    #[serial]
    fn valid_config_parses() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            "[server]\nport=5555\n[logging]\nenabled=false\n[presence]\nonline_threshold_secs=60\n",
        )
        .unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:5555");
        assert!(!cfg.logging_enabled);
        assert_eq!(cfg.online_threshold_secs, 60);
    }

    #[test]
    #[serial]
    fn invalid_port_fails() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[server]\nport=80\n").unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        assert!(Config::load(&cli).is_err());
    }

    #[test]
    #[serial]
    fn missing_keys_use_defaults() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "").unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:8788");
        assert_eq!(cfg.online_threshold_secs, 300);
        assert!(cfg.logging_enabled);
    }

    #[test]
    #[serial]
    fn precedence_cli_env_file() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[server]\nport=1111\n").unwrap();
        std::env::set_var("COMMUNITY_CHAT_PORT", "2222");
        let cli = Cli {
            config: Some(path.clone()),
            port: Some(3333),
            ..Default::default()
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:3333");
        std::env::remove_var("COMMUNITY_CHAT_PORT");

        // without the CLI override the env value wins over the file
        std::env::set_var("COMMUNITY_CHAT_PORT", "2222");
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:2222");
        clear_env();
    }

    #[test]
    #[serial]
    fn db_path_override() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[storage]\ndb_path=\"/tmp/a.db\"\n").unwrap();
        let cli = Cli {
            config: Some(path),
            db: Some(PathBuf::from("/tmp/b.db")),
            ..Default::default()
        };
        let cfg = Config::load(&cli).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/b.db"));
    }
}
