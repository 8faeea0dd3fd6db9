use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_AI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug)]
pub enum ConfigError {
    /// A value the requested feature depends on is not configured.
    Missing(&'static str),
    Invalid { key: String, value: String },
    UnknownKey(String),
    NoConfigDir,
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(
                f,
                "'{key}' is not configured. Run 'onboard set {key} <value>' or set the matching ONBOARD_* variable."
            ),
            ConfigError::Invalid { key, value } => {
                write!(f, "invalid value '{value}' for '{key}'")
            }
            ConfigError::UnknownKey(key) => write!(f, "unknown configuration key '{key}'"),
            ConfigError::NoConfigDir => write!(f, "could not determine the configuration directory"),
            ConfigError::Io(err) => write!(f, "config file error: {err}"),
            ConfigError::Parse(err) => write!(f, "failed to parse config: {err}"),
            ConfigError::Serialize(err) => write!(f, "failed to write config: {err}"),
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Base URL of the object storage API.
    pub url: Option<String>,
    pub bucket: Option<String>,
    /// Lifetime of generated download links. Zero is treated as unset.
    pub signed_url_ttl_secs: Option<u64>,
}

impl StorageConfig {
    pub fn url(&self) -> Result<&str, ConfigError> {
        non_empty(self.url.as_deref()).ok_or(ConfigError::Missing("storage-url"))
    }

    pub fn bucket(&self) -> Result<&str, ConfigError> {
        non_empty(self.bucket.as_deref()).ok_or(ConfigError::Missing("storage-bucket"))
    }

    pub fn signed_url_ttl(&self) -> Result<Duration, ConfigError> {
        match self.signed_url_ttl_secs {
            Some(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::Missing("signed-url-ttl")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// REST backend for sessions, progress and quizzes.
    pub api_base_url: Option<String>,
    /// OpenAI-compatible text generation endpoint.
    pub ai_base_url: Option<String>,
    pub model: Option<String>,
    /// Name used for backend sessions and to address the user in chat.
    pub user_name: Option<String>,
    /// Replaces the built-in exercises.
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    pub fn load() -> Result<Config, ConfigError> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(ConfigError::Io)?;
            toml::from_str(&contents).map_err(ConfigError::Parse)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(config_path, contents).map_err(ConfigError::Io)
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("org", "onboard", "onboard")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Environment variables win over the file. `lookup` is `std::env::var`
    /// in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |target: &mut Option<String>, name: &str| {
            if let Some(value) = lookup(name).filter(|v| !v.trim().is_empty()) {
                *target = Some(value);
            }
        };
        set(&mut self.api_base_url, "ONBOARD_API_BASE_URL");
        set(&mut self.ai_base_url, "ONBOARD_AI_BASE_URL");
        set(&mut self.model, "ONBOARD_MODEL");
        set(&mut self.user_name, "ONBOARD_USER_NAME");
        set(&mut self.storage.url, "ONBOARD_STORAGE_URL");
        set(&mut self.storage.bucket, "ONBOARD_STORAGE_BUCKET");

        if let Some(path) = lookup("ONBOARD_CATALOG") {
            self.catalog_path = Some(PathBuf::from(path));
        }
        // An unparsable TTL is dropped so signed URLs fail closed.
        if let Some(ttl) = lookup("ONBOARD_SIGNED_URL_TTL") {
            self.storage.signed_url_ttl_secs = ttl.trim().parse().ok();
        }
    }

    pub fn ai_base_url(&self) -> &str {
        non_empty(self.ai_base_url.as_deref()).unwrap_or(DEFAULT_AI_BASE_URL)
    }

    pub fn model(&self) -> &str {
        non_empty(self.model.as_deref()).unwrap_or(DEFAULT_MODEL)
    }

    pub fn api_base_url(&self) -> Result<&str, ConfigError> {
        non_empty(self.api_base_url.as_deref()).ok_or(ConfigError::Missing("api-base-url"))
    }

    /// The generation API key only ever comes from the environment.
    pub fn ai_api_key<F>(lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("ONBOARD_AI_API_KEY")
            .or_else(|| lookup("OPENAI_API_KEY"))
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("ONBOARD_AI_API_KEY"))
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim().to_string();
        match key {
            "api-base-url" => self.api_base_url = Some(value),
            "ai-base-url" => self.ai_base_url = Some(value),
            "model" => self.model = Some(value),
            "user-name" => self.user_name = Some(value),
            "catalog" => self.catalog_path = Some(PathBuf::from(value)),
            "storage-url" => self.storage.url = Some(value),
            "storage-bucket" => self.storage.bucket = Some(value),
            "signed-url-ttl" => {
                let secs: u64 = value.parse().map_err(|_| ConfigError::Invalid {
                    key: key.to_string(),
                    value: value.clone(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key: key.to_string(),
                        value,
                    });
                }
                self.storage.signed_url_ttl_secs = Some(secs);
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn unset(&mut self, key: &str) -> Result<(), ConfigError> {
        match key {
            "api-base-url" => self.api_base_url = None,
            "ai-base-url" => self.ai_base_url = None,
            "model" => self.model = None,
            "user-name" => self.user_name = None,
            "catalog" => self.catalog_path = None,
            "storage-url" => self.storage.url = None,
            "storage-bucket" => self.storage.bucket = None,
            "signed-url-ttl" => self.storage.signed_url_ttl_secs = None,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn print_all(&self) {
        fn show(value: Option<&str>) -> &str {
            value.unwrap_or("(unset)")
        }
        println!("Current configuration:");
        println!("  api-base-url: {}", show(self.api_base_url.as_deref()));
        println!("  ai-base-url: {}", self.ai_base_url());
        println!("  model: {}", self.model());
        println!("  user-name: {}", show(self.user_name.as_deref()));
        match &self.catalog_path {
            Some(path) => println!("  catalog: {}", path.display()),
            None => println!("  catalog: (built-in)"),
        }
        println!("  storage-url: {}", show(self.storage.url.as_deref()));
        println!("  storage-bucket: {}", show(self.storage.bucket.as_deref()));
        match self.storage.signed_url_ttl_secs {
            Some(secs) => println!("  signed-url-ttl: {secs}s"),
            None => println!("  signed-url-ttl: (unset)"),
        }
    }
}
