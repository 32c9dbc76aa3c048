//! Orchestrator settings.
//!
//! Settings cover how nodes are built rather than what a cluster contains:
//! the host configuration directory, time zone handling, privileges, the
//! management label and readiness timing. Everything has a default, so an
//! empty TOML document is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClusterError, Result};

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "CLUSTERDOCK_CONFIG_DIR";

/// Default management label key.
pub const DEFAULT_LABEL_KEY: &str = "org.clusterdock";

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Host directory holding clusterdock state such as the shared `localtime`.
    pub config_dir: PathBuf,
    /// Bind-mount `<config_dir>/localtime` over `/etc/localtime` in every node.
    /// When off, nodes get a `TZ` variable derived from the host instead.
    pub localtime_mount: bool,
    /// Run node containers privileged.
    pub privileged: bool,
    /// Driver for cluster networks.
    pub network_driver: String,
    /// Label key marking networks and containers as managed.
    pub label_key: String,
    /// Shell used to run commands on nodes.
    pub shell: String,
    /// Image of the helper container that edits the host's `/etc/hosts`.
    pub etc_hosts_image: String,
    /// Seconds to wait for each readiness condition.
    pub readiness_timeout_secs: u64,
    /// Seconds between readiness checks.
    pub poll_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            localtime_mount: true,
            privileged: false,
            network_driver: "bridge".to_string(),
            label_key: DEFAULT_LABEL_KEY.to_string(),
            shell: "/bin/sh".to_string(),
            etc_hosts_image: "alpine:latest".to_string(),
            readiness_timeout_secs: 30,
            poll_interval_secs: 1,
        }
    }
}

fn default_config_dir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(".clusterdock"), |home| home.join(".clusterdock"))
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClusterError::Config(format!(
                "failed to read settings file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut settings: Self = toml::from_str(content)
            .map_err(|e| ClusterError::Config(format!("invalid TOML: {e}")))?;

        settings.config_dir = expand_home(&settings.config_dir);
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` when given, otherwise use defaults, then apply the
    /// [`CONFIG_DIR_ENV`] override.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(settings.with_config_dir_override(std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from)))
    }

    /// Replace the configuration directory when `dir` is set.
    #[must_use]
    pub fn with_config_dir_override(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.config_dir = expand_home(&dir);
        }
        self
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.shell.is_empty() {
            return Err(ClusterError::Config("shell cannot be empty".to_string()));
        }

        if self.label_key.is_empty() {
            return Err(ClusterError::Config("label_key cannot be empty".to_string()));
        }

        if self.network_driver.is_empty() {
            return Err(ClusterError::Config(
                "network_driver cannot be empty".to_string(),
            ));
        }

        if self.etc_hosts_image.is_empty() {
            return Err(ClusterError::Config(
                "etc_hosts_image cannot be empty".to_string(),
            ));
        }

        if self.readiness_timeout_secs == 0 {
            return Err(ClusterError::Config(
                "readiness_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(ClusterError::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Timeout applied to each readiness wait.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Pause between readiness checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Host file bind-mounted over `/etc/localtime`.
    #[must_use]
    pub fn localtime_path(&self) -> PathBuf {
        self.config_dir.join("localtime")
    }

    /// Create the configuration directory and, when mounting localtime,
    /// seed it with a copy of the host's `/etc/localtime`.
    pub fn prepare_config_dir(&self) -> Result<()> {
        self.prepare_config_dir_from(Path::new("/etc/localtime"))
    }

    /// Like [`Settings::prepare_config_dir`], copying localtime from `source`.
    ///
    /// An existing copy is left alone. A missing `source` is logged and skipped.
    pub fn prepare_config_dir_from(&self, source: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        if !self.localtime_mount {
            return Ok(());
        }

        let target = self.localtime_path();
        if target.exists() {
            return Ok(());
        }
        if !source.exists() {
            warn!(source = %source.display(), "no localtime to share with nodes");
            return Ok(());
        }

        std::fs::copy(source, &target)?;
        debug!(target = %target.display(), "copied host localtime");
        Ok(())
    }
}

/// Time zone name from the target of a `/etc/localtime` symlink, e.g.
/// `/usr/share/zoneinfo/Europe/Berlin` gives `Europe/Berlin`.
pub fn timezone_from_link(target: &Path) -> Option<String> {
    let target = target.to_str()?;
    let (_, zone) = target.split_once("zoneinfo/")?;
    (!zone.is_empty()).then(|| zone.to_string())
}

/// Time zone of the host, read from the `/etc/localtime` symlink.
///
/// # Errors
///
/// Returns an error if the link cannot be read or does not point into a
/// zoneinfo tree.
pub fn host_timezone() -> Result<String> {
    let target = std::fs::read_link("/etc/localtime")?;
    timezone_from_link(&target).ok_or_else(|| {
        ClusterError::Config(format!(
            "cannot derive a time zone from /etc/localtime -> {}",
            target.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_settings(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("failed to write temp file");
        file
    }

    #[test]
    fn test_empty_document_gives_defaults() {
        let settings = Settings::from_toml("").expect("empty settings are valid");
        assert!(settings.localtime_mount);
        assert!(!settings.privileged);
        assert_eq!(settings.network_driver, "bridge");
        assert_eq!(settings.label_key, "org.clusterdock");
        assert_eq!(settings.shell, "/bin/sh");
        assert_eq!(settings.etc_hosts_image, "alpine:latest");
        assert_eq!(settings.readiness_timeout(), Duration::from_secs(30));
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert!(settings.config_dir.ends_with(".clusterdock"));
    }

    #[test]
    fn test_parse_full_settings() {
        let toml = r#"
            config_dir = "/srv/clusterdock"
            localtime_mount = false
            privileged = true
            shell = "/bin/bash"
            readiness_timeout_secs = 90
        "#;

        let settings = Settings::from_toml(toml).expect("should parse");
        assert_eq!(settings.config_dir, PathBuf::from("/srv/clusterdock"));
        assert!(!settings.localtime_mount);
        assert!(settings.privileged);
        assert_eq!(settings.shell, "/bin/bash");
        assert_eq!(settings.readiness_timeout_secs, 90);
        assert_eq!(settings.localtime_path(), PathBuf::from("/srv/clusterdock/localtime"));
    }

    #[test]
    fn test_from_file() {
        let file = create_temp_settings("privileged = true\n");
        let settings = Settings::from_file(file.path()).expect("should load");
        assert!(settings.privileged);
    }

    #[test]
    fn test_from_missing_file() {
        let err = Settings::from_file("/nonexistent/settings.toml").expect_err("missing file");
        assert!(err.to_string().contains("failed to read settings file"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Settings::from_toml("shell = \"\"").is_err());
        assert!(Settings::from_toml("poll_interval_secs = 0").is_err());
        assert!(Settings::from_toml("readiness_timeout_secs = 0").is_err());
        assert!(Settings::from_toml("privileged = \"yes\"").is_err());
    }

    #[test]
    fn test_config_dir_override() {
        let settings =
            Settings::default().with_config_dir_override(Some(PathBuf::from("/tmp/cd")));
        assert_eq!(settings.config_dir, PathBuf::from("/tmp/cd"));

        let untouched = Settings::default().with_config_dir_override(None);
        assert_eq!(untouched.config_dir, Settings::default().config_dir);
    }

    #[test]
    fn test_prepare_config_dir_copies_localtime_once() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let source = create_temp_settings("TZif2 fake zone");
        let settings = Settings::default()
            .with_config_dir_override(Some(dir.path().join("state")));

        settings
            .prepare_config_dir_from(source.path())
            .expect("should prepare");
        let copied = std::fs::read_to_string(settings.localtime_path()).expect("copied");
        assert_eq!(copied, "TZif2 fake zone");

        std::fs::write(settings.localtime_path(), "kept").expect("overwrite");
        settings
            .prepare_config_dir_from(source.path())
            .expect("should prepare again");
        let kept = std::fs::read_to_string(settings.localtime_path()).expect("kept");
        assert_eq!(kept, "kept");
    }

    #[test]
    fn test_prepare_config_dir_without_localtime_mount() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let settings = Settings {
            localtime_mount: false,
            ..Settings::default()
        }
        .with_config_dir_override(Some(dir.path().join("state")));

        settings
            .prepare_config_dir_from(Path::new("/nonexistent/localtime"))
            .expect("should prepare");
        assert!(settings.config_dir.is_dir());
        assert!(!settings.localtime_path().exists());
    }

    #[test]
    fn test_timezone_from_link() {
        assert_eq!(
            timezone_from_link(Path::new("/usr/share/zoneinfo/Europe/Berlin")).as_deref(),
            Some("Europe/Berlin")
        );
        assert_eq!(
            timezone_from_link(Path::new("../usr/share/zoneinfo/UTC")).as_deref(),
            Some("UTC")
        );
        assert_eq!(timezone_from_link(Path::new("/etc/other")), None);
    }
}
