use dealflow_deals::default_follow_up_fields;
use dealflow_extract::ExtractorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const CONFIG_FILE_NAME: &str = "dealflow.toml";

pub const ENV_EMAIL: &str = "DEALFLOW_EMAIL";
pub const ENV_PASSCODE: &str = "DEALFLOW_PASSCODE";
pub const ENV_DATA_DIR: &str = "DEALFLOW_DATA_DIR";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Configuration shared by every dealflow tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DealflowConfig {
    // Paths
    pub home: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    /// One subdirectory per account receives that account's PDFs
    pub accounts_dir: PathBuf,
    pub counter_file: PathBuf,
    pub records_file: PathBuf,

    // Deal intake
    /// Deals waiting on a reply before the oldest is forgotten
    pub pending_capacity: usize,
    pub follow_up_fields: Vec<String>,

    /// Used when RUST_LOG is unset
    pub log_filter: String,

    pub extractor: ExtractorConfig,
}

/// `~/.dealflow`, or a directory under the system temp dir when there is no home
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".dealflow")
}

pub fn default_config_path() -> PathBuf {
    default_home().join("config").join(CONFIG_FILE_NAME)
}

impl Default for DealflowConfig {
    fn default() -> Self {
        Self::rooted_at(default_home())
    }
}

impl DealflowConfig {
    /// Defaults with every path laid out under `home`
    pub fn rooted_at(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let data_dir = home.join("data");
        Self {
            config_dir: home.join("config"),
            accounts_dir: home.join("accounts"),
            counter_file: data_dir.join("deal_counter.txt"),
            records_file: data_dir.join("deals.csv"),
            data_dir,
            pending_capacity: 256,
            follow_up_fields: default_follow_up_fields(),
            log_filter: "info".to_string(),
            extractor: ExtractorConfig::default().with_temp_dir(home.join("work")),
            home,
        }
    }

    /// Load the config at the default location, creating it when absent.
    /// Environment overrides are applied afterwards and never written back.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_or_create(&default_config_path())?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Read `path`, or write the defaults there first
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }
        let config = Self::default();
        config.save_to(path)?;
        info!("Wrote default config to {}", path.display());
        Ok(config)
    }

    /// Save to `config_dir/dealflow.toml`
    pub fn save(&self) -> Result<()> {
        self.save_to(&self.config_dir.join(CONFIG_FILE_NAME))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Ensure all directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        let mut dirs = vec![
            self.home.clone(),
            self.config_dir.clone(),
            self.data_dir.clone(),
            self.accounts_dir.clone(),
            self.extractor.temp_dir.clone(),
        ];
        dirs.extend(self.counter_file.parent().map(Path::to_path_buf));
        dirs.extend(self.records_file.parent().map(Path::to_path_buf));

        for dir in dirs {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `DEALFLOW_*` overrides read through `lookup`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(email) = get(ENV_EMAIL) {
            self.extractor.email = email;
        }
        if let Some(passcode) = get(ENV_PASSCODE) {
            self.extractor.passcode = passcode;
        }
        if let Some(data_dir) = get(ENV_DATA_DIR) {
            self.rebase_data_dir(PathBuf::from(data_dir));
        }
    }

    /// Move the data dir, carrying along files that lived inside it
    fn rebase_data_dir(&mut self, data_dir: PathBuf) {
        for file in [&mut self.counter_file, &mut self.records_file] {
            if let Ok(relative) = file.strip_prefix(&self.data_dir) {
                *file = data_dir.join(relative);
            }
        }
        self.data_dir = data_dir;
    }
}

/// Load (or create) the config, apply environment overrides and create the
/// directory layout. `path` defaults to `~/.dealflow/config/dealflow.toml`.
pub fn init_environment(path: Option<&Path>) -> Result<DealflowConfig> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    let mut config = DealflowConfig::load_or_create(&path)?;
    config.apply_env();
    config.ensure_directories()?;
    info!("Dealflow home is {}", config.home.display());
    Ok(config)
}
