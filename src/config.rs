//! Mirror configuration.
//!
//! Loaded from `--config <path>` or `~/.mmnm/config.toml`. Only the `[ftp]`
//! section is required; everything else has defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jiff::SignedDuration;
use serde::Deserialize;

use crate::model::Faction;

/// Mirror configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub ftp: FtpConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Where downloaded save files are cached. Defaults to `~/.mmnm/cache`.
    pub cache_dir: Option<PathBuf>,

    /// `SQLite` identity and crew store. Defaults to `~/.mmnm/mirror.sqlite`.
    pub database: Option<PathBuf>,

    /// Devil fruit catalog. The bundled catalog is used when unset.
    pub catalog: Option<PathBuf>,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub logs: LogsConfig,

    #[serde(default)]
    pub factions: FactionRoleConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FtpConfig {
    pub host: String,
    #[serde(default = "default_ftp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Remote paths, relative to the FTP login directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ServerConfig {
    pub world: String,
    pub logs: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            world: "world".to_string(),
            logs: "logs".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn player_data_dir(&self) -> String {
        format!("{}/playerdata", self.world)
    }

    pub fn stats_dir(&self) -> String {
        format!("{}/stats", self.world)
    }

    pub fn world_data_file(&self) -> String {
        format!("{}/data/mineminenomi.dat", self.world)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IdentityConfig {
    /// Base URL of the profile endpoint; the simple-form UUID is appended.
    pub base_url: String,

    /// Age after which a cached name is refreshed.
    pub ttl_hours: i64,

    /// When set, a cached name older than this is not served even if the
    /// identity service is down.
    pub max_stale_hours: Option<i64>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sessionserver.mojang.com/session/minecraft/profile".to_string(),
            ttl_hours: 24,
            max_stale_hours: None,
        }
    }
}

impl IdentityConfig {
    pub fn ttl(&self) -> SignedDuration {
        SignedDuration::from_hours(self.ttl_hours)
    }

    pub fn max_stale(&self) -> Option<SignedDuration> {
        self.max_stale_hours.map(SignedDuration::from_hours)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IngestConfig {
    pub interval_secs: u64,

    /// A player unseen for longer than this is inactive.
    pub inactive_after_hours: i64,

    /// How long an unreachable player's previous record is kept.
    pub grace_hours: i64,

    /// How long a logout-with-fruit suppresses fruit accounting.
    pub quarantine_hours: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            inactive_after_hours: 72,
            grace_hours: 120,
            quarantine_hours: 72,
        }
    }
}

impl IngestConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn inactive_after(&self) -> SignedDuration {
        SignedDuration::from_hours(self.inactive_after_hours)
    }

    pub fn grace(&self) -> SignedDuration {
        SignedDuration::from_hours(self.grace_hours)
    }

    pub fn quarantine(&self) -> SignedDuration {
        SignedDuration::from_hours(self.quarantine_hours)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LogsConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
        }
    }
}

impl LogsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Chat role ids granted per faction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FactionRoleConfig {
    pub pirate: Option<u64>,
    pub marine: Option<u64>,
    pub revolutionary: Option<u64>,
    pub bounty_hunter: Option<u64>,
}

impl FactionRoleConfig {
    pub fn role_for(&self, faction: Faction) -> Option<u64> {
        match faction {
            Faction::Pirate => self.pirate,
            Faction::Marine => self.marine,
            Faction::Revolutionary => self.revolutionary,
            Faction::BountyHunter => self.bounty_hunter,
        }
    }

    /// Every configured role id.
    pub fn all(&self) -> Vec<u64> {
        [
            self.pirate,
            self.marine,
            self.revolutionary,
            self.bounty_hunter,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn default_ftp_port() -> u16 {
    21
}

impl Config {
    /// Load config from `path`, or from `~/.mmnm/config.toml` when `None`.
    /// Returns an error if the file is missing or invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path().ok_or("could not determine home directory")?,
        };

        if !path.exists() {
            return Err(format!(
                "no config file found at {}\n\
                 Create one with at minimum:\n\n\
                 [ftp]\n\
                 host = \"mc.example.com\"\n\
                 username = \"mirror\"\n\
                 password = \"...\"",
                path.display()
            ));
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;

        Self::parse(&contents).map_err(|e| format!("invalid config at {}: {e}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;

        if config.ftp.host.is_empty() {
            return Err("ftp.host is empty".to_string());
        }
        if config.ingest.interval_secs == 0 {
            return Err("ingest.interval-secs must be positive".to_string());
        }
        if config.logs.enabled && config.logs.interval_secs == 0 {
            return Err("logs.interval-secs must be positive".to_string());
        }

        Ok(config)
    }

    /// The config file path: `~/.mmnm/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        home().map(|h| h.join("config.toml"))
    }

    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| home().map(|h| h.join("cache")))
    }

    pub fn database(&self) -> Option<PathBuf> {
        self.database
            .clone()
            .or_else(|| home().map(|h| h.join("mirror.sqlite")))
    }
}

fn home() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".mmnm"))
}
