//! Application configuration.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file
//! (explicit path or `<config dir>/amdl/config.toml`), `AMDL_*` environment
//! variables, then CLI flags applied by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_parser::DEFAULT_CATALOG_HOST;
use catalog_parser::platforms::apple_music::{
    AppleMusicConfig, DEFAULT_API_BASE, DEFAULT_WEB_BASE, DEFAULT_WEBPLAYBACK_URL,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::SongCodec;
use crate::engine::ToolPaths;
use crate::pipeline::PipelineSettings;
use crate::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const APP_DIR_NAME: &str = "amdl";
const ENV_PREFIX: &str = "AMDL_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub codec: SongCodec,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub max_concurrent: usize,
    pub dedupe_in_flight: bool,
    pub catalog: CatalogSettings,
    pub license: LicenseSettings,
    pub tools: ToolSettings,
    pub timeouts: TimeoutSettings,
    pub logging: LogSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            codec: SongCodec::default(),
            output_dir: PathBuf::from("downloads"),
            temp_dir: std::env::temp_dir().join(APP_DIR_NAME),
            max_concurrent: 4,
            dedupe_in_flight: false,
            catalog: CatalogSettings::default(),
            license: LicenseSettings::default(),
            tools: ToolSettings::default(),
            timeouts: TimeoutSettings::default(),
            logging: LogSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub host: String,
    pub api_base: String,
    pub web_base: String,
    pub webplayback_url: String,
    pub storefront: String,
    pub language: String,
    /// Netscape cookies file holding the `media-user-token`.
    pub cookies_path: Option<PathBuf>,
    pub developer_token: Option<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        let upstream = AppleMusicConfig::default();
        Self {
            host: DEFAULT_CATALOG_HOST.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            web_base: DEFAULT_WEB_BASE.to_string(),
            webplayback_url: DEFAULT_WEBPLAYBACK_URL.to_string(),
            storefront: upstream.storefront,
            language: upstream.language,
            cookies_path: None,
            developer_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseSettings {
    pub endpoint: Option<String>,
    pub token: Option<String>,
}

/// Tool locations; unset entries fall back to `MP4DECRYPT_PATH`/`FFMPEG_PATH` or `$PATH`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub mp4decrypt: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

/// Timeouts in seconds. Zero disables the limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub request_secs: u64,
    pub fetch_secs: u64,
    pub key_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            request_secs: 30,
            fetch_secs: 600,
            key_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: PathBuf,
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            filter: None,
        }
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

/// `<config dir>/amdl/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl AppConfig {
    /// Load the file layer then apply `AMDL_*` overrides from the process environment.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("reading config {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("invalid config: {e}")))
    }

    /// Apply `AMDL_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
        };

        if let Some(v) = get("CODEC") {
            self.codec = v.parse().map_err(Error::config)?;
        }
        if let Some(v) = get("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("TEMP_DIR") {
            self.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = get("MAX_CONCURRENT") {
            self.max_concurrent = parse_number("MAX_CONCURRENT", &v)?;
        }
        if let Some(v) = get("DEDUPE_IN_FLIGHT") {
            self.dedupe_in_flight = parse_bool("DEDUPE_IN_FLIGHT", &v)?;
        }

        if let Some(v) = get("CATALOG_HOST") {
            self.catalog.host = v;
        }
        if let Some(v) = get("STOREFRONT") {
            self.catalog.storefront = v;
        }
        if let Some(v) = get("LANGUAGE") {
            self.catalog.language = v;
        }
        if let Some(v) = get("COOKIES_PATH") {
            self.catalog.cookies_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("DEVELOPER_TOKEN") {
            self.catalog.developer_token = Some(v);
        }

        if let Some(v) = get("LICENSE_ENDPOINT") {
            self.license.endpoint = Some(v);
        }
        if let Some(v) = get("LICENSE_TOKEN") {
            self.license.token = Some(v);
        }

        if let Some(v) = get("MP4DECRYPT") {
            self.tools.mp4decrypt = Some(PathBuf::from(v));
        }
        if let Some(v) = get("FFMPEG") {
            self.tools.ffmpeg = Some(PathBuf::from(v));
        }

        if let Some(v) = get("FETCH_TIMEOUT") {
            self.timeouts.fetch_secs = parse_number("FETCH_TIMEOUT", &v)?;
        }
        if let Some(v) = get("KEY_TIMEOUT") {
            self.timeouts.key_secs = parse_number("KEY_TIMEOUT", &v)?;
        }

        if let Some(v) = get("LOG_DIR") {
            self.logging.dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_FILTER") {
            self.logging.filter = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::config("max_concurrent must be at least 1"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::config("output_dir must not be empty"));
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err(Error::config("temp_dir must not be empty"));
        }
        if self.catalog.host.trim().is_empty() {
            return Err(Error::config("catalog.host must not be empty"));
        }
        if let Some(endpoint) = &self.license.endpoint {
            url::Url::parse(endpoint)
                .map_err(|e| Error::config(format!("license.endpoint: {e}")))?;
        }
        if let Some(filter) = &self.logging.filter {
            crate::logging::parse_filter(filter)?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        secs(self.timeouts.request_secs)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let mut settings =
            PipelineSettings::new(self.codec, &self.output_dir, &self.temp_dir);
        settings.fetch_timeout = secs(self.timeouts.fetch_secs);
        settings.key_timeout = secs(self.timeouts.key_secs);
        settings.dedupe_in_flight = self.dedupe_in_flight;
        settings
    }

    pub fn tool_paths(&self) -> ToolPaths {
        let defaults = ToolPaths::default();
        ToolPaths {
            mp4decrypt: self.tools.mp4decrypt.clone().unwrap_or(defaults.mp4decrypt),
            ffmpeg: self.tools.ffmpeg.clone().unwrap_or(defaults.ffmpeg),
        }
    }

    pub fn apple_music_config(&self) -> AppleMusicConfig {
        AppleMusicConfig {
            api_base: self.catalog.api_base.clone(),
            web_base: self.catalog.web_base.clone(),
            webplayback_url: self.catalog.webplayback_url.clone(),
            storefront: self.catalog.storefront.clone(),
            language: self.catalog.language.clone(),
            developer_token: self.catalog.developer_token.clone(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{ENV_PREFIX}{name}: expected a number, got {value:?}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(format!(
            "{ENV_PREFIX}{name}: expected a boolean, got {value:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.codec, SongCodec::Aac);
        assert_eq!(config.catalog.host, DEFAULT_CATALOG_HOST);
        assert!(!config.dedupe_in_flight);
    }

    #[test]
    fn parses_all_sections() {
        let config = AppConfig::from_toml(
            r#"
            codec = "aac-legacy"
            output_dir = "/music"
            temp_dir = "/tmp/amdl-test"
            max_concurrent = 2
            dedupe_in_flight = true

            [catalog]
            host = "music.example"
            storefront = "gb"
            cookies_path = "cookies.txt"

            [license]
            endpoint = "http://127.0.0.1:9000/license"
            token = "secret"

            [tools]
            mp4decrypt = "/opt/bento4/mp4decrypt"

            [timeouts]
            fetch_secs = 0
            key_secs = 5

            [logging]
            dir = "/var/log/amdl"
            filter = "amdl=debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.codec, SongCodec::AacLegacy);
        assert_eq!(config.output_dir, PathBuf::from("/music"));
        assert_eq!(config.max_concurrent, 2);
        assert!(config.dedupe_in_flight);
        assert_eq!(config.catalog.host, "music.example");
        assert_eq!(config.catalog.storefront, "gb");
        assert_eq!(config.catalog.language, "en-US");
        assert_eq!(config.license.token.as_deref(), Some("secret"));
        assert_eq!(
            config.tool_paths().mp4decrypt,
            PathBuf::from("/opt/bento4/mp4decrypt")
        );
        assert_eq!(config.logging.filter.as_deref(), Some("amdl=debug"));

        let settings = config.pipeline_settings();
        assert_eq!(settings.fetch_timeout, None);
        assert_eq!(settings.key_timeout, Some(Duration::from_secs(5)));
        assert!(settings.dedupe_in_flight);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_codec_is_rejected() {
        let err = AppConfig::from_toml(r#"codec = "mp3""#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::from_toml(r#"codec = "alac""#).unwrap();
        config
            .apply_env_overrides(env(&[
                ("AMDL_CODEC", "aac_he"),
                ("AMDL_OUTPUT_DIR", "/srv/music"),
                ("AMDL_MAX_CONCURRENT", "8"),
                ("AMDL_DEDUPE_IN_FLIGHT", "yes"),
                ("AMDL_LICENSE_ENDPOINT", "https://keys.example/v1"),
                ("AMDL_STOREFRONT", ""),
            ]))
            .unwrap();

        assert_eq!(config.codec, SongCodec::AacHe);
        assert_eq!(config.output_dir, PathBuf::from("/srv/music"));
        assert_eq!(config.max_concurrent, 8);
        assert!(config.dedupe_in_flight);
        assert_eq!(
            config.license.endpoint.as_deref(),
            Some("https://keys.example/v1")
        );
        // Blank values are ignored.
        assert_eq!(config.catalog.storefront, "us");
    }

    #[test]
    fn bad_env_values_are_config_errors() {
        let mut config = AppConfig::default();
        assert!(
            config
                .apply_env_overrides(env(&[("AMDL_MAX_CONCURRENT", "many")]))
                .is_err()
        );
        assert!(
            config
                .apply_env_overrides(env(&[("AMDL_DEDUPE_IN_FLIGHT", "maybe")]))
                .is_err()
        );
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = AppConfig::default();
        config.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.license.endpoint = Some("not a url".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_log_filter_fails_validation() {
        let mut config = AppConfig::default();
        config.logging.filter = Some("amdl=notalevel".into());
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "{err:?}");

        config.logging.filter = Some("amdl=debug".into());
        config.validate().unwrap();
    }

    #[test]
    fn reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "max_concurrent = 3\n").unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.max_concurrent, 3);

        let missing = AppConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(Error::Configuration(_))));
    }

    #[test]
    fn apple_music_config_carries_catalog_section() {
        let mut config = AppConfig::default();
        config.catalog.api_base = "http://127.0.0.1:1".into();
        config.catalog.developer_token = Some("tok".into());
        let upstream = config.apple_music_config();
        assert_eq!(upstream.api_base, "http://127.0.0.1:1");
        assert_eq!(upstream.developer_token.as_deref(), Some("tok"));
    }
}
