//! Configuration management for nestweb
//!
//! Supports:
//! - TOML config file at XDG locations
//! - Environment variable overrides
//! - Command-line argument overrides

use std::env;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use env_logger::fmt::WriteStyle;
use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::refresh::RefreshSettings;
use crate::{nest, rpi};

const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Runtime context containing resolved configuration
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub global: GlobalOpts,
    pub config: AppConfig,
    config_path: PathBuf,
}

impl RuntimeContext {
    pub fn new(global: &GlobalOpts) -> Result<Self> {
        let config_path = resolve_config_path(global.config.as_ref())?;
        let config = load_config(&config_path, global)?;

        Ok(Self {
            global: global.clone(),
            config,
            config_path,
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn init_logging(&self) -> Result<()> {
        if self.global.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let mut builder = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(&self.config.logging.level),
        );

        if let Some(level) = self.cli_log_level() {
            builder.filter_level(level);
        }

        let force_color = env::var_os("FORCE_COLOR").is_some();
        let disable_color = self.global.no_color
            || env::var_os("NO_COLOR").is_some()
            || (!force_color && !std::io::stderr().is_terminal());

        if disable_color {
            builder.write_style(WriteStyle::Never);
        } else if force_color {
            builder.write_style(WriteStyle::Always);
        } else {
            builder.write_style(WriteStyle::Auto);
        }

        builder.try_init().or_else(|err| {
            if self.global.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    /// Level requested on the command line, if any
    fn cli_log_level(&self) -> Option<LevelFilter> {
        if self.global.trace {
            Some(LevelFilter::Trace)
        } else if self.global.debug {
            Some(LevelFilter::Debug)
        } else {
            match self.global.verbose {
                0 => None,
                1 => Some(LevelFilter::Info),
                2 => Some(LevelFilter::Debug),
                _ => Some(LevelFilter::Trace),
            }
        }
    }

    /// Effective Nest gateway URL, if the integration is configured
    pub fn nest_url(&self) -> Option<&str> {
        self.global
            .nest_url
            .as_deref()
            .or(self.config.nest.base_url.as_deref())
    }

    pub fn nest_token(&self) -> Option<&str> {
        self.global
            .nest_token
            .as_deref()
            .or(self.config.nest.token.as_deref())
    }

    /// Effective sensor address, if the integration is configured
    pub fn net_loc(&self) -> Option<&str> {
        self.global
            .net_loc
            .as_deref()
            .or(self.config.rpi_sensor.net_loc.as_deref())
    }

    /// Get the effective request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.global.timeout.unwrap_or(self.config.http.timeout))
    }

    /// Check if SSL verification should be skipped
    pub fn insecure(&self) -> bool {
        self.global.insecure || self.config.http.insecure
    }

    pub fn nest_settings(&self) -> RefreshSettings {
        RefreshSettings::from_secs(
            "nest",
            self.config.nest.refresh_interval,
            nest::DEFAULT_REFRESH_INTERVAL,
        )
    }

    pub fn rpi_settings(&self) -> RefreshSettings {
        RefreshSettings::from_secs(
            "rpi_sensor",
            self.config.rpi_sensor.refresh_interval,
            rpi::DEFAULT_REFRESH_INTERVAL,
        )
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll.scan_interval.max(1))
    }

    /// Get the effective output format
    pub fn output_format(&self) -> OutputFormat {
        if self.global.json {
            return OutputFormat::Json;
        }
        self.global
            .output_format
            .unwrap_or(match self.config.output.format.as_str() {
                "json" => OutputFormat::Json,
                "yaml" => OutputFormat::Yaml,
                "table" => OutputFormat::Table,
                _ => OutputFormat::Auto,
            })
    }

    /// Check if output should be in table format
    pub fn is_table_output(&self) -> bool {
        match self.output_format() {
            OutputFormat::Table => true,
            OutputFormat::Auto => std::io::stdout().is_terminal(),
            _ => false,
        }
    }
}

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nest: NestConfig,
    pub rpi_sensor: RpiSensorConfig,
    pub http: HttpConfig,
    pub poll: PollConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NestConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
    /// Structure names to include; every structure seen at setup when unset
    pub structure: Option<Vec<String>>,
    pub refresh_interval: u64,
}

impl Default for NestConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            structure: None,
            refresh_interval: nest::DEFAULT_REFRESH_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpiSensorConfig {
    pub net_loc: Option<String>,
    pub refresh_interval: u64,
}

impl Default for RpiSensorConfig {
    fn default() -> Self {
        Self {
            net_loc: None,
            refresh_interval: rpi::DEFAULT_REFRESH_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout: u64,
    pub insecure: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: 10,
            insecure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub scan_interval: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { scan_interval: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: String,
    pub no_headers: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "auto".to_string(),
            no_headers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

fn resolve_config_path(override_path: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        let expanded = expand_path(path)?;
        if expanded.is_dir() {
            return Ok(expanded.join("config.toml"));
        }
        return Ok(expanded);
    }

    Ok(default_config_dir()?.join("config.toml"))
}

fn load_config(config_path: &Path, global: &GlobalOpts) -> Result<AppConfig> {
    // Create default config if it doesn't exist
    if !config_path.exists() {
        write_default_config(config_path)?;
    }

    let config = Config::builder()
        // Set defaults
        .set_default("nest.refresh_interval", nest::DEFAULT_REFRESH_INTERVAL as i64)?
        .set_default("rpi_sensor.refresh_interval", rpi::DEFAULT_REFRESH_INTERVAL as i64)?
        .set_default("http.timeout", 10_i64)?
        .set_default("http.insecure", false)?
        .set_default("poll.scan_interval", 30_i64)?
        .set_default("output.format", "auto")?
        .set_default("output.no_headers", false)?
        .set_default("logging.level", "warn")?
        // Load from file
        .add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        )
        // Environment variable overrides (NESTWEB__SECTION__KEY, e.g. NESTWEB__RPI_SENSOR__NET_LOC)
        .add_source(
            Environment::with_prefix("NESTWEB")
                .try_parsing(true)
                .separator("__"),
        )
        .build()
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let mut app_config: AppConfig = config.try_deserialize()?;

    // Apply CLI overrides
    if global.no_headers {
        app_config.output.no_headers = true;
    }

    Ok(app_config)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {}", parent.display()))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config")?;

    let content = format!(
        "# nestweb configuration\n\
        # File: {}\n\
        #\n\
        # Integrations are enabled by setting nest.base_url and rpi_sensor.net_loc.\n\
        # nest.structure = [\"Home\"] limits Nest to the named structures.\n\
        #\n\
        # Environment variables:\n\
        #   NEST_URL, NEST_TOKEN, RPI_NET_LOC - integration settings\n\
        #   NESTWEB__*  - Override any config value (e.g., NESTWEB__LOGGING__LEVEL=debug)\n\
        \n\
        {toml}",
        path.display()
    );

    fs::write(path, content).with_context(|| format!("writing config to {}", path.display()))
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        let expanded = shellexpand::full(text).context("expanding path")?;
        Ok(PathBuf::from(expanded.to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn default_config_dir() -> Result<PathBuf> {
    // Check XDG_CONFIG_HOME first
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    // Use platform-specific config directory
    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    // Fallback to ~/.config
    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    fn global_for(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["nestweb"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["config", "path"]);
        Cli::parse_from(argv).global
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nest.refresh_interval, 180);
        assert_eq!(config.rpi_sensor.refresh_interval, 30);
        assert!(config.nest.structure.is_none());
        assert_eq!(config.http.timeout, 10);
        assert_eq!(config.poll.scan_interval, 30);
        assert_eq!(config.output.format, "auto");
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[nest]"));
        assert!(toml.contains("[rpi_sensor]"));
        assert!(toml.contains("[http]"));
        assert!(toml.contains("[poll]"));
        assert!(toml.contains("[logging]"));
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = load_config(&path, &global_for(&[])).unwrap();
        assert!(path.exists());
        assert_eq!(config.nest.refresh_interval, 180);
        assert!(config.rpi_sensor.net_loc.is_none());
    }

    #[test]
    fn test_file_values_and_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[nest]
base_url = "http://gateway.local/api"
structure = ["Home", "Cabin"]
refresh_interval = 2

[rpi_sensor]
net_loc = "192.168.0.20:8000"
refresh_interval = 60
"#,
        )
        .unwrap();

        let global = global_for(&["--net-loc", "pi.local:9000", "--timeout", "3"]);
        let config = load_config(&path, &global).unwrap();
        let ctx = RuntimeContext {
            global,
            config,
            config_path: path,
        };

        assert_eq!(ctx.nest_url(), Some("http://gateway.local/api"));
        assert_eq!(
            ctx.config.nest.structure,
            Some(vec!["Home".to_string(), "Cabin".to_string()])
        );
        assert_eq!(ctx.net_loc(), Some("pi.local:9000"));
        assert_eq!(ctx.timeout(), Duration::from_secs(3));
        assert_eq!(ctx.rpi_settings().refresh_interval, Duration::from_secs(60));
        // Below the floor: falls back to the default.
        assert_eq!(ctx.nest_settings().refresh_interval, Duration::from_secs(180));
    }

    #[test]
    fn test_json_flag_wins() {
        let ctx = RuntimeContext {
            global: global_for(&["--json"]),
            config: AppConfig::default(),
            config_path: PathBuf::from("config.toml"),
        };
        assert_eq!(ctx.output_format(), OutputFormat::Json);
        assert!(!ctx.is_table_output());
    }
}
