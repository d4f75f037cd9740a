use std::{fs, io::ErrorKind, path::Path};

use anyhow::{anyhow, Context};
use serde::Deserialize;
use shared::domain::DEFAULT_CONFIGURATION_NAME;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub configuration_name: String,
    pub userinfo_endpoint: Option<String>,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            configuration_name: DEFAULT_CONFIGURATION_NAME.into(),
            userinfo_endpoint: None,
            access_token: None,
            timeout_secs: 10,
        }
    }
}

impl Settings {
    pub fn userinfo_endpoint(&self) -> anyhow::Result<Url> {
        let raw = self
            .userinfo_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| anyhow!("no userinfo endpoint configured"))?;
        Url::parse(raw).with_context(|| format!("invalid userinfo endpoint '{raw}'"))
    }

    /// Empty tokens count as signed out.
    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file at `path` (if present), then environment
/// variables. Later layers win.
pub fn load_settings_with_env(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => Settings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    };

    if let Some(v) = env_value(&env, "OIDC_USER_CONFIGURATION_NAME", "APP__CONFIGURATION_NAME") {
        settings.configuration_name = v;
    }
    if let Some(v) = env_value(&env, "OIDC_USER_USERINFO_ENDPOINT", "APP__USERINFO_ENDPOINT") {
        settings.userinfo_endpoint = Some(v);
    }
    if let Some(v) = env_value(&env, "OIDC_USER_ACCESS_TOKEN", "APP__ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }
    if let Some(v) = env_value(&env, "OIDC_USER_TIMEOUT_SECS", "APP__TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.timeout_secs = parsed;
        }
    }

    Ok(settings)
}

/// `APP__*` aliases take precedence over the plain names.
fn env_value(env: &impl Fn(&str) -> Option<String>, key: &str, alias: &str) -> Option<String> {
    env(alias).or_else(|| env(key))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
