use std::env;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::controller::StaleResponsePolicy;
use crate::domain::Range;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5001";

const APP_DIR: &str = "chronos_dashboard";
const CONFIG_FILE: &str = "config.toml";
const LOG_FILE: &str = "dashboard.log";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read config {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse config {path}: {source}")]
	TomlDecode {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
	pub server_url: Option<String>,
	pub default_range: Range,
	pub stale_responses: StaleResponsePolicy,
	pub log_file: Option<PathBuf>,
}

pub fn resolve_config_path(cli_path: Option<PathBuf>) -> Option<PathBuf> {
	if let Some(path) = cli_path {
		return Some(path);
	}

	if let Some(path) = non_empty(env::var_os("CHRONOS_DASHBOARD_CONFIG")) {
		return Some(PathBuf::from(path));
	}

	config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
}

pub fn load_config(path: &Path) -> Result<DashboardConfig, ConfigError> {
	let raw = match fs::read_to_string(path) {
		Ok(raw) => raw,
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DashboardConfig::default()),
		Err(source) => {
			return Err(ConfigError::Io {
				path: path.to_path_buf(),
				source,
			});
		}
	};

	toml::from_str(&raw).map_err(|source| ConfigError::TomlDecode {
		path: path.to_path_buf(),
		source,
	})
}

/// `--server`, then `$CHRONOS_DASHBOARD_URL`, then the config file.
pub fn pick_server_url(
	cli: Option<String>,
	env_value: Option<String>,
	config: &DashboardConfig,
) -> String {
	[cli, env_value, config.server_url.clone()]
		.into_iter()
		.flatten()
		.map(|url| url.trim().to_string())
		.find(|url| !url.is_empty())
		.unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

pub fn server_url_from_env() -> Option<String> {
	env::var("CHRONOS_DASHBOARD_URL").ok()
}

pub fn default_log_path(config: &DashboardConfig) -> PathBuf {
	config
		.log_file
		.clone()
		.unwrap_or_else(|| state_dir().join(LOG_FILE))
}

pub fn state_dir() -> PathBuf {
	if let Some(path) = non_empty(env::var_os("CHRONOS_STATE_DIR")) {
		return PathBuf::from(path);
	}

	#[cfg(target_os = "windows")]
	{
		if let Some(path) = env::var_os("LOCALAPPDATA") {
			return PathBuf::from(path).join(APP_DIR);
		}
	}

	if let Some(path) = non_empty(env::var_os("XDG_STATE_HOME")) {
		return PathBuf::from(path).join(APP_DIR);
	}

	if let Some(path) = env::var_os("HOME") {
		return PathBuf::from(path).join(".local").join("state").join(APP_DIR);
	}

	PathBuf::from(".chronos_dashboard")
}

fn config_dir() -> Option<PathBuf> {
	#[cfg(target_os = "windows")]
	{
		if let Some(path) = env::var_os("APPDATA") {
			return Some(PathBuf::from(path));
		}
	}

	if let Some(path) = non_empty(env::var_os("XDG_CONFIG_HOME")) {
		return Some(PathBuf::from(path));
	}

	env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
}

fn non_empty(value: Option<OsString>) -> Option<OsString> {
	value.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
	use std::fs;
	use std::path::PathBuf;

	use crate::controller::StaleResponsePolicy;
	use crate::domain::Range;

	use super::{
		ConfigError, DEFAULT_SERVER_URL, DashboardConfig, default_log_path, load_config,
		pick_server_url, resolve_config_path,
	};

	#[test]
	fn missing_file_means_defaults() {
		let dir = tempfile::tempdir().expect("temp dir");
		let config = load_config(&dir.path().join("absent.toml")).expect("missing config is fine");

		assert_eq!(config, DashboardConfig::default());
		assert_eq!(config.default_range, Range::Today);
		assert_eq!(config.stale_responses, StaleResponsePolicy::Apply);
	}

	#[test]
	fn reads_every_key() {
		let dir = tempfile::tempdir().expect("temp dir");
		let path = dir.path().join("config.toml");
		fs::write(
			&path,
			"server_url = \"http://tracker.local:8080\"\ndefault_range = \"month\"\nstale_responses = \"discard\"\nlog_file = \"/tmp/dash.log\"\n",
		)
		.expect("write config");

		let config = load_config(&path).expect("config should parse");
		assert_eq!(config.server_url.as_deref(), Some("http://tracker.local:8080"));
		assert_eq!(config.default_range, Range::Month);
		assert_eq!(config.stale_responses, StaleResponsePolicy::Discard);
		assert_eq!(default_log_path(&config), PathBuf::from("/tmp/dash.log"));
	}

	#[test]
	fn reports_bad_toml_with_its_path() {
		let dir = tempfile::tempdir().expect("temp dir");
		let path = dir.path().join("config.toml");
		fs::write(&path, "default_range = \"fortnight\"\n").expect("write config");

		let err = load_config(&path).expect_err("unknown range should fail");
		assert!(matches!(err, ConfigError::TomlDecode { .. }));
		assert!(err.to_string().contains("config.toml"));
	}

	#[test]
	fn server_url_precedence() {
		let config = DashboardConfig {
			server_url: Some("http://from-file:5001".to_string()),
			..DashboardConfig::default()
		};

		assert_eq!(
			pick_server_url(
				Some("http://cli:1".to_string()),
				Some("http://env:2".to_string()),
				&config
			),
			"http://cli:1"
		);
		assert_eq!(
			pick_server_url(None, Some("http://env:2".to_string()), &config),
			"http://env:2"
		);
		assert_eq!(
			pick_server_url(None, Some("  ".to_string()), &config),
			"http://from-file:5001"
		);
		assert_eq!(
			pick_server_url(None, None, &DashboardConfig::default()),
			DEFAULT_SERVER_URL
		);
	}

	#[test]
	fn explicit_config_path_wins() {
		let path = PathBuf::from("/etc/chronos/dashboard.toml");
		assert_eq!(resolve_config_path(Some(path.clone())), Some(path));
	}
}
