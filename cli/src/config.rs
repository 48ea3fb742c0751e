use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use nutri_core::calendar::DEFAULT_TIMEZONE;
use nutri_core::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use nutri_core::models::Household;

pub const API_KEY_ENV: &str = "NUTRI_API_KEY";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// No Gemini key in `[ai].api_key` and no `NUTRI_API_KEY` in the environment.
    #[error(
        "No AI API key configured. Set [ai].api_key in {} or the NUTRI_API_KEY environment variable",
        .config_path.display()
    )]
    MissingCredential { config_path: PathBuf },
    #[error("Unknown timezone '{0}'. Use an IANA name such as America/Sao_Paulo")]
    InvalidTimezone(String),
    #[error("Invalid household: {0}")]
    InvalidHousehold(String),
    #[error("Invalid config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not determine home directory")]
    NoHomeDir,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    household: HouseholdSection,
    ai: AiSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HouseholdSection {
    users: Option<Vec<String>>,
    timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AiSection {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub config_path: PathBuf,
    pub household: Household,
    pub timezone: Tz,
    pub ai: AiConfig,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let proj_dirs = ProjectDirs::from("", "", "nutri").ok_or(ConfigError::NoHomeDir)?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir).map_err(|source| ConfigError::Io {
            path: data_dir.clone(),
            source,
        })?;

        let config_path = proj_dirs.config_dir().join("config.toml");
        let contents = match std::fs::read_to_string(&config_path) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(ConfigError::Io {
                    path: config_path,
                    source,
                });
            }
        };
        let env_key = std::env::var(API_KEY_ENV).ok();

        let config = Self::from_parts(data_dir, config_path, contents.as_deref(), env_key)?;
        tracing::debug!(
            db = %config.db_path.display(),
            timezone = %config.timezone,
            users = ?config.household.users(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Build a config from the file contents (if any) and the environment key.
    pub fn from_parts(
        data_dir: PathBuf,
        config_path: PathBuf,
        contents: Option<&str>,
        env_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let file: ConfigFile = match contents {
            Some(s) => toml::from_str(s).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?,
            None => ConfigFile::default(),
        };

        let household = match file.household.users {
            Some(users) => Household::new(users)
                .map_err(|e| ConfigError::InvalidHousehold(format!("{e:#}")))?,
            None => Household::default(),
        };

        let timezone = match file.household.timezone {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(name.clone()))?,
            None => DEFAULT_TIMEZONE,
        };

        let api_key = env_key
            .or(file.ai.api_key)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let ai = AiConfig {
            api_key,
            model: file.ai.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: file
                .ai
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout_secs: file.ai.timeout_secs.unwrap_or(DEFAULT_AI_TIMEOUT_SECS).max(1),
        };

        Ok(Config {
            db_path: data_dir.join("nutri.db"),
            data_dir,
            config_path,
            household,
            timezone,
            ai,
        })
    }

    /// The Gemini key, or `ConfigError::MissingCredential`.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.ai
            .api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingCredential {
                config_path: self.config_path.clone(),
            })
    }

    /// Load the server key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first `serve`).
    pub fn load_or_create_server_key(&self) -> anyhow::Result<(String, bool)> {
        load_or_create_key(&self.data_dir.join("server_key"))
    }
}

fn load_or_create_key(path: &Path) -> anyhow::Result<(String, bool)> {
    use rand::Rng;
    use std::fmt::Write;

    if path.exists() {
        let key = std::fs::read_to_string(path).context("Failed to read server key file")?;
        let key = key.trim().to_string();
        if !key.is_empty() {
            return Ok((key, false));
        }
    }

    let bytes: [u8; 32] = rand::rng().random();
    let key = bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        });
    std::fs::write(path, &key).context("Failed to write server key file")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to set server key file permissions")?;
    }
    tracing::info!(path = %path.display(), "generated server key");
    Ok((key, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(contents: Option<&str>, env_key: Option<&str>) -> Result<Config, ConfigError> {
        Config::from_parts(
            PathBuf::from("/data/nutri"),
            PathBuf::from("/config/nutri/config.toml"),
            contents,
            env_key.map(str::to_string),
        )
    }

    #[test]
    fn test_defaults_without_file() {
        let config = parts(None, None).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/nutri/nutri.db"));
        assert_eq!(config.household.users(), ["Thiago", "Marcela"]);
        assert_eq!(config.timezone, chrono_tz::America::Sao_Paulo);
        assert_eq!(config.ai.model, DEFAULT_MODEL);
        assert_eq!(config.ai.timeout_secs, 30);
        assert!(config.ai.api_key.is_none());
    }

    #[test]
    fn test_missing_credential() {
        let config = parts(None, None).unwrap();
        let err = config.require_api_key().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
        let message = err.to_string();
        assert!(message.contains("NUTRI_API_KEY"));
        assert!(message.contains("/config/nutri/config.toml"));
    }

    #[test]
    fn test_file_values() {
        let config = parts(
            Some(
                r#"
                [household]
                users = ["Ana", "Bia", "Caio"]
                timezone = "Europe/Lisbon"

                [ai]
                api_key = "file-key"
                model = "gemini-2.5-flash"
                timeout_secs = 5
                "#,
            ),
            None,
        )
        .unwrap();
        assert_eq!(config.household.users().len(), 3);
        assert_eq!(config.timezone, chrono_tz::Europe::Lisbon);
        assert_eq!(config.require_api_key().unwrap(), "file-key");
        assert_eq!(config.ai.model, "gemini-2.5-flash");
        assert_eq!(config.ai.timeout_secs, 5);
        assert_eq!(config.ai.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_env_key_overrides_file() {
        let config = parts(Some("[ai]\napi_key = \"file-key\"\n"), Some("env-key")).unwrap();
        assert_eq!(config.require_api_key().unwrap(), "env-key");
    }

    #[test]
    fn test_blank_key_is_missing() {
        let config = parts(Some("[ai]\napi_key = \"  \"\n"), None).unwrap();
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_invalid_timezone() {
        let err = parts(Some("[household]\ntimezone = \"Mars/Olympus\"\n"), None)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidTimezone(ref tz) if tz == "Mars/Olympus"));
    }

    #[test]
    fn test_invalid_household() {
        let err = parts(Some("[household]\nusers = []\n"), None).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidHousehold(_)));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let err = parts(Some("[ai]\napi_kye = \"typo\"\n"), None).err().unwrap();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_server_key_is_created_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_key");
        let (key, created) = load_or_create_key(&path).unwrap();
        assert!(created);
        assert_eq!(key.len(), 64);
        let (again, created) = load_or_create_key(&path).unwrap();
        assert!(!created);
        assert_eq!(again, key);
    }
}
