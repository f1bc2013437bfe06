//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.rbridge.toml` files. Every field has a default, so an empty file (or no
//! file at all) yields the stock setup: orchestration layer on port 5000,
//! R Plumber backend on port 8000.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".rbridge.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings for the orchestration layer.
    #[serde(default)]
    pub server: ServerConfig,

    /// R backend launch and proxy settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Gemini API settings.
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Orchestration-layer HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Directory with the browser client assets, served under `/static`.
    /// Relative paths resolve against the working directory.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Maximum accepted request body size for uploads.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            static_dir: default_static_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    5000
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024 // 50MB
}

/// R backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Launch the backend as a child process. When false, an externally
    /// managed backend is expected at `host:port`.
    #[serde(default = "default_true")]
    pub launch: bool,

    /// Host the backend listens on.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the backend listens on.
    #[serde(default = "default_backend_port")]
    pub port: u16,

    /// Interpreter name resolved through `PATH`.
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Fixed install locations probed in order when `PATH` lookup fails.
    #[serde(default = "default_candidate_paths")]
    pub candidate_paths: Vec<String>,

    /// Parent directory scanned for versioned installs.
    #[serde(default = "default_install_root")]
    pub install_root: String,

    /// Prefix of versioned install directories under `install_root`.
    #[serde(default = "default_install_prefix")]
    pub install_prefix: String,

    /// Executable path inside each versioned install directory
    /// (`/`-separated).
    #[serde(default = "default_relative_executable")]
    pub relative_executable: String,

    /// Local R package library, relative to the working directory.
    #[serde(default = "default_lib_dir")]
    pub lib_dir: String,

    /// Environment variable holding R's library search path.
    #[serde(default = "default_lib_env_var")]
    pub lib_env_var: String,

    /// Plumber route-definition file, relative to the working directory.
    #[serde(default = "default_route_file")]
    pub route_file: String,

    /// Seconds to wait after launch before checking the child is alive.
    #[serde(default = "default_startup_wait")]
    pub startup_wait_secs: u64,

    /// Backend path probed by `/health`.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Health probe timeout in milliseconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Timeout for forwarding an upload to the backend, in seconds.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            launch: true,
            host: default_host(),
            port: default_backend_port(),
            executable: default_executable(),
            candidate_paths: default_candidate_paths(),
            install_root: default_install_root(),
            install_prefix: default_install_prefix(),
            relative_executable: default_relative_executable(),
            lib_dir: default_lib_dir(),
            lib_env_var: default_lib_env_var(),
            route_file: default_route_file(),
            startup_wait_secs: default_startup_wait(),
            probe_path: default_probe_path(),
            probe_timeout_ms: default_probe_timeout(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

impl BackendConfig {
    /// Base URL of the backend, derived from host and port.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// The relative executable path as a platform path.
    pub fn relative_executable_path(&self) -> PathBuf {
        self.relative_executable
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect()
    }
}

fn default_true() -> bool {
    true
}

fn default_backend_port() -> u16 {
    8000
}

fn default_executable() -> String {
    "Rscript".to_string()
}

fn default_candidate_paths() -> Vec<String> {
    vec![
        r"C:\Program Files\R\R-4.4.1\bin\x64\Rscript.exe",
        r"C:\Program Files\R\R-4.4.0\bin\x64\Rscript.exe",
        r"C:\Program Files\R\R-4.3.3\bin\x64\Rscript.exe",
        r"C:\Program Files\R\R-4.5.2\bin\x64\Rscript.exe",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_install_root() -> String {
    r"C:\Program Files\R".to_string()
}

fn default_install_prefix() -> String {
    "R-".to_string()
}

fn default_relative_executable() -> String {
    "bin/x64/Rscript.exe".to_string()
}

fn default_lib_dir() -> String {
    "R_libs".to_string()
}

fn default_lib_env_var() -> String {
    "R_LIBS".to_string()
}

fn default_route_file() -> String {
    "api.R".to_string()
}

fn default_startup_wait() -> u64 {
    3
}

fn default_probe_path() -> String {
    // Plumber has no built-in health route; any response from /plot proves it is up.
    "/plot".to_string()
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_upload_timeout() -> u64 {
    300
}

/// Gemini API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key. Normally supplied through `GOOGLE_API_KEY` rather than the file.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Model used for insights and direct chat.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_gemini_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_gemini_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_gemini_url(),
            timeout_seconds: default_gemini_timeout(),
        }
    }
}

impl GeminiConfig {
    /// The configured key, treating an empty string as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_gemini_timeout() -> u64 {
    60
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location inside `dir`.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default(dir: &Path) -> Result<Option<Self>> {
        let default_path = dir.join(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(&default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(port) = args.backend_port {
            self.backend.port = port;
        }
        if args.no_backend {
            self.backend.launch = false;
        }
        if let Some(ref key) = args.api_key {
            self.gemini.api_key = Some(key.clone());
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Args;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.backend.port, 8000);
        assert_eq!(config.backend.base_url(), "http://127.0.0.1:8000");
        assert_eq!(config.backend.lib_env_var, "R_LIBS");
        assert_eq!(config.backend.candidate_paths.len(), 4);
        assert!(config.gemini.api_key().is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
[server]
port = 5050

[backend]
port = 8123
route_file = "plumber.R"
candidate_paths = ["/opt/R/bin/Rscript"]

[gemini]
model = "gemini-2.0-flash"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.backend.port, 8123);
        assert_eq!(config.backend.route_file, "plumber.R");
        assert_eq!(config.backend.candidate_paths, vec!["/opt/R/bin/Rscript"]);
        assert_eq!(config.backend.lib_dir, "R_libs");
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.gemini.timeout_seconds, 60);
    }

    #[test]
    fn test_relative_executable_path() {
        let config = BackendConfig::default();
        let expected: PathBuf = ["bin", "x64", "Rscript.exe"].iter().collect();
        assert_eq!(config.relative_executable_path(), expected);
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let mut config = GeminiConfig::default();
        config.api_key = Some("  ".to_string());
        assert!(config.api_key().is_none());

        config.api_key = Some("secret".to_string());
        assert_eq!(config.api_key(), Some("secret"));
    }

    #[test]
    fn test_default_toml_omits_api_key() {
        let mut config = Config::default();
        config.gemini.api_key = Some("secret".to_string());
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(!toml_str.contains("secret"));

        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[backend]"));
        assert!(toml_str.contains("[gemini]"));
    }

    #[test]
    fn test_load_default_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_default(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[server]\nport = 6000\n").unwrap();
        let config = Config::load_default(dir.path()).unwrap().unwrap();
        assert_eq!(config.server.port, 6000);

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[server\n").unwrap();
        assert!(Config::load_default(dir.path()).is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let args = Args::parse_from([
            "rbridge",
            "--port",
            "5100",
            "--no-backend",
            "--api-key",
            "from-cli",
        ]);

        let mut config = Config::default();
        config.backend.port = 8100;
        config.merge_with_args(&args);

        assert_eq!(config.server.port, 5100);
        assert_eq!(config.backend.port, 8100);
        assert!(!config.backend.launch);
        assert_eq!(config.gemini.api_key(), Some("from-cli"));
    }
}
