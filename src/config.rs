use crate::error::ConfigError;
use actix_web::cookie::Key;
use sha2::{Digest, Sha512};
use std::env;
use std::path::PathBuf;

pub struct Config {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub secret_key: Option<String>,
    pub templates_dir: PathBuf,
    pub bcrypt_cost: u32,
    pub secure_cookies: bool,
}

impl Config {
    /// Reads `KINOTICKET_*` variables, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let bcrypt_cost = match lookup("KINOTICKET_BCRYPT_COST") {
            Some(value) => parse_cost(&value)?,
            None => bcrypt::DEFAULT_COST,
        };
        let secure_cookies = match lookup("KINOTICKET_SECURE_COOKIES") {
            Some(value) => parse_flag("KINOTICKET_SECURE_COOKIES", &value)?,
            None => false,
        };
        Ok(Config {
            bind_addr: lookup("KINOTICKET_BIND").unwrap_or_else(|| "127.0.0.1:8080".to_owned()),
            database_path: lookup("KINOTICKET_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("site.db")),
            secret_key: lookup("KINOTICKET_SECRET").filter(|secret| !secret.is_empty()),
            templates_dir: lookup("KINOTICKET_TEMPLATES")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))),
            bcrypt_cost,
            secure_cookies,
        })
    }

    /// Cookie signing key. Without a configured secret the key only lives as
    /// long as the process, so sessions do not survive a restart.
    pub fn session_key(&self) -> Key {
        match &self.secret_key {
            Some(secret) => Key::from(Sha512::digest(secret.as_bytes()).as_slice()),
            None => {
                log::warn!("KINOTICKET_SECRET is not set, using a random session key");
                Key::generate()
            }
        }
    }

    pub fn templates_glob(&self) -> String {
        format!("{}/**/*", self.templates_dir.display())
    }
}

fn parse_cost(value: &str) -> Result<u32, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name: "KINOTICKET_BCRYPT_COST",
        value: value.to_owned(),
        reason: reason.to_owned(),
    };
    let cost = value
        .trim()
        .parse::<u32>()
        .map_err(|err| invalid(&err.to_string()))?;
    if !(4..=31).contains(&cost) {
        return Err(invalid("must be between 4 and 31"));
    }
    Ok(cost)
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_owned(),
            reason: "expected true or false".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, PathBuf::from("site.db"));
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(config.secret_key.is_none());
        assert!(!config.secure_cookies);
        assert!(config.templates_glob().ends_with("templates/**/*"));
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("KINOTICKET_BIND", "0.0.0.0:9000"),
            ("KINOTICKET_BCRYPT_COST", "4"),
            ("KINOTICKET_SECURE_COOKIES", "yes"),
            ("KINOTICKET_SECRET", "supersecretkey"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.bcrypt_cost, 4);
        assert!(config.secure_cookies);
        assert_eq!(config.session_key().master(), config.session_key().master());
    }

    #[test]
    fn invalid_cost() {
        assert!(config(&[("KINOTICKET_BCRYPT_COST", "3")]).is_err());
        assert!(config(&[("KINOTICKET_BCRYPT_COST", "many")]).is_err());
        assert!(config(&[("KINOTICKET_SECURE_COOKIES", "maybe")]).is_err());
    }
}
