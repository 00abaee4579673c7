use anyhow::{Context, Result};
use std::env;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub thinking_budget: u32,
    pub port: u16,
}

impl Config {
    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .context("GEMINI_API_KEY must be set")?;
        let api_base = lookup("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let thinking_budget = match lookup("GEMINI_THINKING_BUDGET") {
            Some(v) => v.parse().with_context(|| format!("invalid GEMINI_THINKING_BUDGET `{v}`"))?,
            None => crate::generation::GenerationClient::DEFAULT_THINKING_BUDGET,
        };
        let port = match lookup("PORT") {
            Some(v) => v.parse().with_context(|| format!("invalid PORT `{v}`"))?,
            None => DEFAULT_PORT,
        };
        Ok(Self { api_key, api_base, model, thinking_budget, port })
    }

    /// First few characters of the key, for logs.
    pub fn masked_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(6).collect();
        format!("{prefix}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[("GEMINI_API_KEY", "AIzaSyExample1234")]).unwrap();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.model, "gemini-3-pro-preview");
        assert_eq!(config.thinking_budget, 1024);
        assert_eq!(config.port, 8080);
        assert_eq!(config.masked_key(), "AIzaSy...");
    }

    #[test]
    fn key_is_required() {
        let err = load(&[("PORT", "9000")]).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        assert!(load(&[("GEMINI_API_KEY", "  ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_MODEL", "gemini-2.5-flash"),
            ("GEMINI_THINKING_BUDGET", "0"),
            ("PORT", "3001"),
        ])
        .unwrap();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.thinking_budget, 0);
        assert_eq!(config.port, 3001);
        assert!(load(&[("GEMINI_API_KEY", "k"), ("PORT", "http")]).is_err());
    }
}
