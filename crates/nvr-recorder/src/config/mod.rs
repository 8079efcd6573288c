use anyhow::{Context, Result};
use nvr_common::SourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod credentials;
pub mod validation;

/// Name of the optional local overlay file, looked up next to the main file.
pub const OVERLAY_FILE_NAME: &str = "config.debug.yaml";

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(flatten)]
    pub settings: GlobalSettings,
    #[serde(default)]
    pub supervisor: SupervisorOptions,
    #[serde(default)]
    pub retention: RetentionOptions,
    pub cameras: Vec<Source>,

    /// Overlay file that was merged in, if any
    #[serde(skip)]
    pub overlay: Option<PathBuf>,

    /// Merged document before typing, kept for diagnostics only
    #[serde(skip)]
    raw: serde_yaml::Value,
}

/// Fleet-wide settings shared read-only by every supervisor and the sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(rename = "storage_root")]
    pub primary_root: PathBuf,
    pub backup_root: PathBuf,
    #[serde(rename = "log_path")]
    pub log_root: PathBuf,
    #[serde(default = "default_segment_duration", with = "duration_serde")]
    pub segment_duration: Duration,
    #[serde(default = "default_primary_retention", with = "duration_serde")]
    pub primary_retention: Duration,
    #[serde(default, with = "duration_serde")]
    pub backup_retention: Duration,
    #[serde(rename = "ffmpeg_binary", default = "default_capture_binary")]
    pub capture_binary: PathBuf,
}

/// One capture source (camera).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    #[serde(rename = "rtsp_url")]
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Supervisor timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorOptions {
    /// Wait before re-checking a source whose URL is empty or unresolved
    #[serde(default = "default_invalid_url_delay", with = "duration_serde")]
    pub invalid_url_delay: Duration,
    /// Wait between a transient exit and the next attempt
    #[serde(default = "default_restart_delay", with = "duration_serde")]
    pub restart_delay: Duration,
    /// How long a terminated subprocess may take to exit before it is killed
    #[serde(default = "default_stop_grace", with = "duration_serde")]
    pub stop_grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            invalid_url_delay: default_invalid_url_delay(),
            restart_delay: default_restart_delay(),
            stop_grace: default_stop_grace(),
        }
    }
}

/// Retention sweeper timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionOptions {
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub interval: Duration,
}

impl Default for RetentionOptions {
    fn default() -> Self {
        Self {
            interval: default_sweep_interval(),
        }
    }
}

impl RecorderConfig {
    /// Load configuration from a YAML file, merging `config.debug.yaml` from
    /// the same directory when it exists.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut document = read_yaml(path)?;

        let overlay_path = path.with_file_name(OVERLAY_FILE_NAME);
        let overlay = if overlay_path != path && overlay_path.exists() {
            let overrides = read_yaml(&overlay_path)?;
            merge_values(&mut document, overrides);
            Some(overlay_path)
        } else {
            None
        };

        let mut config = Self::from_value(document, |key| std::env::var(key).ok())?;
        config.overlay = overlay;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let document: serde_yaml::Value =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        Self::from_value(document, |key| std::env::var(key).ok())
    }

    /// Type, expand and validate an already merged document. `lookup`
    /// resolves credential placeholders.
    pub fn from_value<F>(document: serde_yaml::Value, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: RecorderConfig = serde_yaml::from_value(document.clone())
            .context("Invalid configuration structure")?;
        config.raw = document;

        for camera in &mut config.cameras {
            camera.url = credentials::expand_credentials(&camera.url, &lookup);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Enabled sources only
    pub fn enabled_sources(&self) -> Vec<&Source> {
        self.cameras.iter().filter(|c| c.enabled).collect()
    }

    /// Top-level scalar keys of the merged document, for startup logging.
    pub fn diagnostic_view(&self) -> BTreeMap<String, String> {
        let mut view = BTreeMap::new();
        if let serde_yaml::Value::Mapping(map) = &self.raw {
            for (key, value) in map {
                let (Some(key), Some(value)) = (key.as_str(), scalar_to_string(value)) else {
                    continue;
                };
                view.insert(key.to_string(), value);
            }
        }
        view
    }
}

fn read_yaml(path: &Path) -> Result<serde_yaml::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse YAML: {}", path.display()))?;
    // An empty document means "no settings"
    Ok(match value {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
        other => other,
    })
}

/// Recursively merge `overrides` into `base`: mappings merge key by key,
/// anything else in `overrides` replaces the value in `base`.
pub fn merge_values(base: &mut serde_yaml::Value, overrides: serde_yaml::Value) {
    match (base, overrides) {
        (serde_yaml::Value::Mapping(base_map), serde_yaml::Value::Mapping(override_map)) => {
            for (key, value) in override_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_segment_duration() -> Duration {
    Duration::from_secs(300)
}

fn default_primary_retention() -> Duration {
    Duration::from_secs(7 * 86_400)
}

fn default_capture_binary() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_invalid_url_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_stop_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(600)
}

// Custom serialization for Duration
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        let invalid = || format!("Invalid duration: {}", s);
        let parse = |num: &str, unit: u64| -> Result<u64, String> {
            let num: u64 = num.trim().parse().map_err(|_| invalid())?;
            num.checked_mul(unit).ok_or_else(invalid)
        };

        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            Ok(Duration::from_millis(parse(num, 1)?))
        } else if let Some(num) = s.strip_suffix('s') {
            Ok(Duration::from_secs(parse(num, 1)?))
        } else if let Some(num) = s.strip_suffix('m') {
            Ok(Duration::from_secs(parse(num, 60)?))
        } else if let Some(num) = s.strip_suffix('h') {
            Ok(Duration::from_secs(parse(num, 3_600)?))
        } else if let Some(num) = s.strip_suffix('d') {
            Ok(Duration::from_secs(parse(num, 86_400)?))
        } else {
            Err(format!(
                "Duration must end with 'ms', 's', 'm', 'h' or 'd': {}",
                s
            ))
        }
    }
}
