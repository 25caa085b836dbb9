use crate::database::PasswordPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub tmdb_language: String,
    pub tmdb_timeout: Duration,
    /// Raw key material for signing the session cookie; a random key is
    /// generated per process when unset.
    pub session_key: Option<Vec<u8>>,
    pub admin_username: String,
    pub passwords: PasswordPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok().filter(|value| !value.is_empty()))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let or = |name, default: &str| lookup(name).unwrap_or_else(|| default.to_owned());

        let tmdb_api_key = lookup("TMDB_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing("TMDB_API_KEY"))?;

        let session_key = match lookup("SESSION_KEY") {
            Some(key) if key.len() < 64 => {
                return Err(ConfigError::Invalid {
                    name: "SESSION_KEY",
                    value: format!("{} bytes, at least 64 required", key.len()),
                })
            }
            key => key.map(String::into_bytes),
        };

        let plaintext = parse::<bool>("PLAINTEXT_PASSWORDS", lookup("PLAINTEXT_PASSWORDS"))?
            .unwrap_or(false);
        let passwords = if plaintext {
            PasswordPolicy::Plaintext
        } else {
            let cost = parse::<u32>("BCRYPT_COST", lookup("BCRYPT_COST"))?
                .unwrap_or(bcrypt::DEFAULT_COST);
            if !(4..=31).contains(&cost) {
                return Err(ConfigError::Invalid {
                    name: "BCRYPT_COST",
                    value: cost.to_string(),
                });
            }
            PasswordPolicy::Bcrypt(cost)
        };

        Ok(Config {
            host: or("HOST", "127.0.0.1"),
            port: parse("PORT", lookup("PORT"))?.unwrap_or(8080),
            data_dir: PathBuf::from(or("DATA_DIR", "data")),
            tmdb_api_key,
            tmdb_base_url: or("TMDB_BASE_URL", "https://api.themoviedb.org/3"),
            tmdb_language: or("TMDB_LANGUAGE", "es-ES"),
            tmdb_timeout: Duration::from_secs(
                parse("TMDB_TIMEOUT_SECS", lookup("TMDB_TIMEOUT_SECS"))?.unwrap_or(10),
            ),
            session_key,
            admin_username: or("ADMIN_USERNAME", "admin"),
            passwords,
        })
    }
}

fn parse<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&'static str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<&'static str, String> =
            vars.iter().map(|(k, v)| (*k, v.to_string())).collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_api_key_is_set() {
        let config = config(&[("TMDB_API_KEY", "key")]).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.tmdb_language, "es-ES");
        assert_eq!(config.tmdb_timeout, Duration::from_secs(10));
        assert_eq!(config.admin_username, "admin");
        assert_eq!(config.passwords, PasswordPolicy::Bcrypt(bcrypt::DEFAULT_COST));
        assert!(config.session_key.is_none());
    }

    #[test]
    fn api_key_is_required() {
        assert_eq!(config(&[]).unwrap_err(), ConfigError::Missing("TMDB_API_KEY"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("TMDB_API_KEY", "k"), ("PORT", "eighty")]),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("TMDB_API_KEY", "k"), ("SESSION_KEY", "short")]),
            Err(ConfigError::Invalid { name: "SESSION_KEY", .. })
        ));
        assert!(matches!(
            config(&[("TMDB_API_KEY", "k"), ("BCRYPT_COST", "2")]),
            Err(ConfigError::Invalid { name: "BCRYPT_COST", .. })
        ));
    }

    #[test]
    fn plaintext_mode_overrides_bcrypt() {
        let config = config(&[("TMDB_API_KEY", "k"), ("PLAINTEXT_PASSWORDS", "true")]).unwrap();
        assert_eq!(config.passwords, PasswordPolicy::Plaintext);
    }
}
