use std::{
    env::{self, VarError},
    fs::File,
    path::{Path, PathBuf},
};

use platform_dirs::AppDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::Error,
    resolver::ResolverConfig,
    util::{mkdir_if_not_exists, unix_now},
};

const APP_NAME: &str = "Tabs";
const CONFIG_FILENAME: &str = "config.json";
const PROXY_ENV_VAR: &str = "HTTPS_PROXY";
const API_URL_ENV_VAR: &str = "TABS_API_URL";

pub const DEFAULT_API_URL: &str = "https://api.ultimate-guitar.com/api/v1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub device_id: String,
    pub worker_threads: usize,
    pub max_retries: u32,
    /// Show the stored copy of a tab when refreshing it fails.
    pub fallback_to_cached: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            device_id: String::new(),
            worker_threads: 4,
            max_retries: 3,
            fallback_to_cached: false,
            cache_dir: None,
        }
    }
}

impl Config {
    fn app_dirs() -> Option<AppDirs> {
        const USE_XDG_ON_MACOS: bool = false;

        AppDirs::new(Some(APP_NAME), USE_XDG_ON_MACOS)
    }

    pub fn config_dir() -> Option<PathBuf> {
        Self::app_dirs().map(|dirs| dirs.config_dir)
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join(CONFIG_FILENAME))
    }

    /// Store location, either configured or the platform cache directory.
    pub fn store_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| Self::app_dirs().map(|dirs| dirs.cache_dir))
    }

    /// Loads the config file, falling back to defaults when there is none.
    /// A file that exists but cannot be parsed is an error.
    pub fn load() -> Result<Config, Error> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Config, Error> {
        log::info!("loading config: {:?}", path);
        let file = File::open(path)?;
        serde_json::from_reader(file)
            .map_err(|err| Error::ConfigError(format!("{}: {err}", path.display())))
    }

    pub fn save(&self) -> Result<(), Error> {
        let dir = Self::config_dir()
            .ok_or_else(|| Error::ConfigError("no config directory".into()))?;
        mkdir_if_not_exists(&dir)?;
        self.save_to(&dir.join(CONFIG_FILENAME))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Error> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(url) = read_env(API_URL_ENV_VAR) {
            self.api_url = url;
        }
    }

    pub fn api_url(&self) -> Result<Url, Error> {
        let url = Url::parse(&self.api_url)
            .map_err(|err| Error::ConfigError(format!("api_url {:?}: {err}", self.api_url)))?;
        if url.cannot_be_a_base() {
            return Err(Error::ConfigError(format!(
                "api_url {:?} cannot be a base URL",
                self.api_url
            )));
        }
        Ok(url)
    }

    /// Stable client identifier sent with catalog requests.  Generated from
    /// the process and time when not configured.
    pub fn device_id(&self) -> String {
        if self.device_id.is_empty() {
            format!(
                "{:016x}",
                (std::process::id() as u64) << 32 ^ unix_now() as u64
            )
        } else {
            self.device_id.clone()
        }
    }

    pub fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            workers: self.worker_threads,
            fallback_to_cached: self.fallback_to_cached,
        }
    }

    pub fn proxy() -> Option<String> {
        read_env(PROXY_ENV_VAR)
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).map_or_else(
        |err| match err {
            VarError::NotPresent => None,
            VarError::NotUnicode(_) => {
                log::error!("{name} is not a valid unicode");
                None
            }
        },
        Some,
    )
}
