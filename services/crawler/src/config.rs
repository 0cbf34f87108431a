//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Tokens are loaded from the GITHUB_TOKENS env var (comma separated) or
//! from tokens_file, never stored in the TOML directly to avoid leaking
//! secrets. The database URL likewise prefers the DATABASE_URL env var.

use std::path::{Path, PathBuf};

use common::Secret;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub github: GithubConfig,
    pub sink: SinkConfig,
}

/// Crawl source settings
#[derive(Debug, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Organizations to crawl
    pub orgs: Vec<String>,
    /// Skip forked repositories when listing
    #[serde(default)]
    pub skip_forks: bool,
    #[serde(skip)]
    pub tokens: Vec<Secret<String>>,
    /// Path to a file with one token per line (alternative to GITHUB_TOKENS)
    #[serde(default)]
    pub tokens_file: Option<PathBuf>,
}

/// Snapshot sink settings
#[derive(Debug, Deserialize)]
pub struct SinkConfig {
    /// PostgreSQL URL; when absent the console sink is used
    #[serde(default)]
    pub database_url: Option<String>,
    /// Version tag for this run's rows
    pub version: u64,
    /// Garbage-collect other versions after a successful publish
    #[serde(default)]
    pub cleanup: bool,
}

fn default_api_url() -> String {
    "https://api.github.com".to_owned()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables.
    ///
    /// Token resolution order:
    /// 1. GITHUB_TOKENS env var (comma separated)
    /// 2. tokens_file path from config (one per line)
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.github.orgs.is_empty() {
            return Err(common::Error::Config(
                "github.orgs must list at least one organization".into(),
            ));
        }

        if !config.github.api_url.starts_with("http://")
            && !config.github.api_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "api_url must start with http:// or https://, got: {}",
                config.github.api_url
            )));
        }

        // Resolve tokens: env var takes precedence over file
        if let Ok(raw) = std::env::var("GITHUB_TOKENS") {
            config.github.tokens = split_tokens(&raw);
        } else if let Some(ref tokens_file) = config.github.tokens_file {
            let raw = std::fs::read_to_string(tokens_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read tokens_file {}: {e}",
                    tokens_file.display()
                ))
            })?;
            config.github.tokens = raw
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(|l| Secret::new(l.to_owned()))
                .collect();
        }

        if config.github.tokens.is_empty() {
            return Err(common::Error::Config(
                "no tokens configured: set GITHUB_TOKENS or github.tokens_file".into(),
            ));
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                config.sink.database_url = Some(url);
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("gh-crawler.toml")
    }
}

fn split_tokens(raw: &str) -> Vec<Secret<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| Secret::new(t.to_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables,
    /// preventing data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[github]
orgs = ["acme"]

[sink]
version = 3
"#
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_valid_config_with_env_tokens() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { set_env("GITHUB_TOKENS", "ghp_one, ghp_two") };
        unsafe { remove_env("DATABASE_URL") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.orgs, vec!["acme"]);
        assert!(!config.github.skip_forks);
        assert_eq!(config.github.tokens.len(), 2);
        assert_eq!(config.github.tokens[0].expose(), "ghp_one");
        assert_eq!(config.sink.version, 3);
        assert!(!config.sink.cleanup);
        assert!(config.sink.database_url.is_none());

        unsafe { remove_env("GITHUB_TOKENS") };
    }

    #[test]
    fn load_missing_file_fails() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_invalid_toml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn tokens_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tokens_path = dir.path().join("tokens");
        std::fs::write(&tokens_path, "ghp_file_a\n\n  ghp_file_b  \n").unwrap();

        let toml_content = format!(
            r#"
[github]
orgs = ["acme"]
tokens_file = "{}"

[sink]
version = 1
"#,
            tokens_path.display()
        );
        let path = write_config(&dir, &toml_content);

        unsafe { remove_env("GITHUB_TOKENS") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.github.tokens.len(), 2);
        assert_eq!(config.github.tokens[1].expose(), "ghp_file_b");
    }

    #[test]
    fn env_tokens_override_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tokens_path = dir.path().join("tokens");
        std::fs::write(&tokens_path, "ghp_from_file\n").unwrap();

        let toml_content = format!(
            r#"
[github]
orgs = ["acme"]
tokens_file = "{}"

[sink]
version = 1
"#,
            tokens_path.display()
        );
        let path = write_config(&dir, &toml_content);

        unsafe { set_env("GITHUB_TOKENS", "ghp_from_env") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.github.tokens.len(), 1);
        assert_eq!(config.github.tokens[0].expose(), "ghp_from_env");
        unsafe { remove_env("GITHUB_TOKENS") };
    }

    #[test]
    fn no_tokens_anywhere_fails() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, valid_toml());

        unsafe { remove_env("GITHUB_TOKENS") };
        let err = Config::load(&path).unwrap_err();
        assert!(
            err.to_string().contains("no tokens configured"),
            "got: {err}"
        );
    }

    #[test]
    fn empty_orgs_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[github]
orgs = []

[sink]
version = 1
"#,
        );
        unsafe { set_env("GITHUB_TOKENS", "ghp_x") };
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("orgs"), "got: {err}");
        unsafe { remove_env("GITHUB_TOKENS") };
    }

    #[test]
    fn invalid_api_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[github]
api_url = "api.github.com"
orgs = ["acme"]

[sink]
version = 1
"#,
        );
        unsafe { set_env("GITHUB_TOKENS", "ghp_x") };
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("api_url"), "got: {err}");
        unsafe { remove_env("GITHUB_TOKENS") };
    }

    #[test]
    fn database_url_env_overrides_toml() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[github]
orgs = ["acme"]

[sink]
database_url = "postgres://toml/db"
version = 1
"#,
        );
        unsafe { set_env("GITHUB_TOKENS", "ghp_x") };
        unsafe { set_env("DATABASE_URL", "postgres://env/db") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.sink.database_url.as_deref(), Some("postgres://env/db"));
        unsafe { remove_env("DATABASE_URL") };
        unsafe { remove_env("GITHUB_TOKENS") };
    }

    #[test]
    fn resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("gh-crawler.toml"));
    }

    #[test]
    fn split_tokens_skips_empty_entries() {
        let tokens = split_tokens("a,,b, ,c");
        let exposed: Vec<&String> = tokens.iter().map(|t| t.expose()).collect();
        assert_eq!(exposed, ["a", "b", "c"]);
    }
}
