//! Layered configuration for recast.
//!
//! Values are resolved in order, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. A TOML file (explicit path, or `recast.toml` in the platform config
//!    directory when using [`Config::discover`])
//! 3. Environment variables prefixed with `RECAST_`, using `__` to separate
//!    nested keys (`RECAST_ARCHIVE__COMPRESSION_LEVEL=9`)
//!
//! # Example
//!
//! ```toml
//! [conversion]
//! format = "png"
//! quality = 0.8
//! concurrency = 2
//!
//! [archive]
//! compression_level = 9
//! file_name = "holiday.zip"
//!
//! [progress]
//! reset_delay_ms = 400
//!
//! [resources]
//! backend = "local"
//! path = "/var/tmp/recast"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format as _, Serialized, Toml};
use recast_codec::{DEFAULT_QUALITY, Format};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "RECAST_";
const FILE_NAME: &str = "recast.toml";
/// Highest level accepted by the deflate encoder.
pub const MAX_COMPRESSION_LEVEL: u8 = 9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub conversion: ConversionConfig,
    pub archive: ArchiveConfig,
    pub progress: ProgressConfig,
    pub resources: ResourcesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Initial target format of a new session.
    pub format: Format,
    /// Encoder quality in `[0, 1]`. Affects WebP and JPEG output; PNG ignores it.
    pub quality: f32,
    /// Maximum number of encodes in flight during a batch.
    pub concurrency: usize,
}
impl Default for ConversionConfig {
    fn default() -> Self {
        Self { format: Format::default(), quality: DEFAULT_QUALITY, concurrency: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Deflate level, `0..=9`.
    pub compression_level: u8,
    /// Suggested file name for the downloaded archive.
    pub file_name: String,
}
impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { compression_level: 6, file_name: "converted-images.zip".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// How long a finished batch keeps reporting its final progress before it
    /// is reset to zero.
    pub reset_delay_ms: u64,
}
impl Default for ProgressConfig {
    fn default() -> Self {
        Self { reset_delay_ms: 400 }
    }
}
impl ProgressConfig {
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}

/// Where converted bytes are held.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ResourcesConfig {
    #[default]
    Memory,
    Local { path: PathBuf },
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment.
    ///
    /// An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration from the platform config directory, if a file is
    /// present there, otherwise from defaults and the environment only.
    pub fn discover() -> Result<Self> {
        match Self::default_path().filter(|path| path.is_file()) {
            Some(path) => Self::load(Some(&path)),
            None => Self::load(None),
        }
    }

    /// `recast.toml` inside the platform-specific config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "recast").map(|dirs| dirs.config_dir().join(FILE_NAME))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a session misbehave.
    pub fn validate(&self) -> Result<()> {
        let quality = self.conversion.quality;
        if !(0.0..=1.0).contains(&quality) {
            exn::bail!(ErrorKind::Invalid(format!("conversion.quality must be within [0, 1], got {quality}")));
        }
        if self.conversion.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("conversion.concurrency must be at least 1".to_string()));
        }
        if self.archive.compression_level > MAX_COMPRESSION_LEVEL {
            exn::bail!(ErrorKind::Invalid(format!(
                "archive.compression_level must be at most {MAX_COMPRESSION_LEVEL}, got {}",
                self.archive.compression_level
            )));
        }
        if let ResourcesConfig::Local { path } = &self.resources
            && !path.is_absolute()
        {
            exn::bail!(ErrorKind::Invalid(format!("resources.path must be absolute, got {}", path.display())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.conversion.format, Format::Webp);
        assert_eq!(config.conversion.quality, 0.9);
        assert_eq!(config.conversion.concurrency, 1);
        assert_eq!(config.archive.compression_level, 6);
        assert_eq!(config.archive.file_name, "converted-images.zip");
        assert_eq!(config.progress.reset_delay(), Duration::from_millis(400));
        assert_eq!(config.resources, ResourcesConfig::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_file() {
        Jail::expect_with(|_jail| {
            assert_eq!(Config::load(None).unwrap(), Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_load_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "recast.toml",
                r#"
                [conversion]
                format = "jpeg"
                quality = 0.5

                [archive]
                compression_level = 9

                [resources]
                backend = "local"
                path = "/var/tmp/recast"
                "#,
            )?;
            let config = Config::load(Some(Path::new("recast.toml"))).unwrap();
            assert_eq!(config.conversion.format, Format::Jpg);
            assert_eq!(config.conversion.quality, 0.5);
            assert_eq!(config.conversion.concurrency, 1);
            assert_eq!(config.archive.compression_level, 9);
            assert_eq!(config.archive.file_name, "converted-images.zip");
            assert_eq!(config.resources, ResourcesConfig::Local { path: PathBuf::from("/var/tmp/recast") });
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("recast.toml", "[conversion]\nconcurrency = 2\nformat = \"png\"\n")?;
            jail.set_env("RECAST_CONVERSION__CONCURRENCY", "4");
            jail.set_env("RECAST_PROGRESS__RESET_DELAY_MS", "0");
            let config = Config::load(Some(Path::new("recast.toml"))).unwrap();
            assert_eq!(config.conversion.concurrency, 4);
            assert_eq!(config.conversion.format, Format::Png);
            assert_eq!(config.progress.reset_delay(), Duration::ZERO);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&temp_dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("recast.toml");
        std::fs::write(&path, "[conversion]\nformat = \"gif\"\n").unwrap();
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Parse));
    }

    #[rstest]
    #[case::quality_high(|c: &mut Config| c.conversion.quality = 1.5)]
    #[case::quality_negative(|c: &mut Config| c.conversion.quality = -0.1)]
    #[case::quality_nan(|c: &mut Config| c.conversion.quality = f32::NAN)]
    #[case::no_concurrency(|c: &mut Config| c.conversion.concurrency = 0)]
    #[case::level(|c: &mut Config| c.archive.compression_level = 10)]
    #[case::relative_spill(|c: &mut Config| c.resources = ResourcesConfig::Local { path: PathBuf::from("spill") })]
    fn test_validate_rejects(#[case] mutate: fn(&mut Config)) {
        let mut config = Config::default();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[rstest]
    #[case::lowest(0.0, 0)]
    #[case::highest(1.0, 9)]
    fn test_validate_accepts_bounds(#[case] quality: f32, #[case] level: u8) {
        let mut config = Config::default();
        config.conversion.quality = quality;
        config.archive.compression_level = level;
        assert!(config.validate().is_ok());
    }
}
