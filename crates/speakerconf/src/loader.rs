//! Config file discovery, loading, and environment variable overlay.
//!
//! Files are parsed into raw TOML tables and merged key by key before a
//! single typed deserialization, so a later file only overrides the keys it
//! actually sets.

use crate::{ConfigError, SpeakerConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Legacy flat JSON config written by older deployments.
pub const LEGACY_JSON_PATH: &str = "/etc/rtsp-mqtt.json";

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns existing paths in load order (legacy, system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let legacy = PathBuf::from(LEGACY_JSON_PATH);
    if legacy.exists() {
        files.push(legacy);
    }

    let system = PathBuf::from("/etc/speaker/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("speaker/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("speaker.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file into a raw table. `.json` files use the legacy format.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        parse_legacy_json(&contents, path)
    } else {
        parse_toml(&contents, path)
    }
}

fn parse_toml(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Parse the legacy flat JSON format (`{"broker-host": "...", "gpio-pin": 4}`).
///
/// Known flat keys are moved into their sections. Nested objects are taken
/// as sections of the current format.
fn parse_legacy_json(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    let value: serde_json::Value =
        serde_json::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let serde_json::Value::Object(object) = value else {
        return Err(ConfigError::Parse {
            path: path.to_path_buf(),
            message: "expected a JSON object at the top level".to_string(),
        });
    };

    let mut table = toml::Table::new();
    for (key, value) in object {
        let Some(converted) = json_to_toml(&value) else {
            continue;
        };

        match legacy_key(&key) {
            Some((section, field)) => {
                let entry = table
                    .entry(section.to_string())
                    .or_insert_with(|| toml::Value::Table(toml::Table::new()));
                if let toml::Value::Table(section_table) = entry {
                    section_table.insert(field.to_string(), converted);
                }
            }
            None if converted.is_table() => {
                let mut single = toml::Table::new();
                single.insert(key, converted);
                merge_tables(&mut table, single);
            }
            None => {}
        }
    }

    Ok(table)
}

fn legacy_key(key: &str) -> Option<(&'static str, &'static str)> {
    match key {
        "broker-host" => Some(("broker", "host")),
        "broker-port" => Some(("broker", "port")),
        "rtsp-host" => Some(("rtsp", "host")),
        "rtsp-port" => Some(("rtsp", "port")),
        "alsa-device" => Some(("audio", "device")),
        "gpio-pin" => Some(("gpio", "pin")),
        _ => None,
    }
}

/// JSON null has no TOML counterpart and converts to `None`.
fn json_to_toml(value: &serde_json::Value) -> Option<toml::Value> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(toml::Value::Boolean(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(toml::Value::Integer)
            .or_else(|| n.as_f64().map(toml::Value::Float)),
        serde_json::Value::String(s) => Some(toml::Value::String(s.clone())),
        serde_json::Value::Array(items) => Some(toml::Value::Array(
            items.iter().filter_map(json_to_toml).collect(),
        )),
        serde_json::Value::Object(map) => Some(toml::Value::Table(
            map.iter()
                .filter_map(|(k, v)| json_to_toml(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
    }
}

/// Merge `overlay` into `base`. Tables merge recursively, anything else in
/// the overlay replaces the base value.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                merge_tables(base_table, overlay_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Deserialize a merged table into the typed config.
pub fn from_table(table: toml::Table) -> Result<SpeakerConfig, ConfigError> {
    let mut config: SpeakerConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid {
                message: e.to_string(),
            })?;
    config.gpio.sysfs_root = expand_path(&config.gpio.sysfs_root.to_string_lossy());
    Ok(config)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut SpeakerConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, env::vars());
}

/// Apply `SPEAKER_*` overrides from an explicit variable list.
///
/// Values that fail to parse are ignored and not recorded as overrides.
pub fn apply_overrides_from<I>(config: &mut SpeakerConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut rust_log = None;

    for (key, value) in vars {
        let applied = match key.as_str() {
            "SPEAKER_BROKER_HOST" => {
                config.broker.host = value;
                true
            }
            "SPEAKER_BROKER_PORT" => parse_into(&value, &mut config.broker.port),
            "SPEAKER_CLIENT_ID" => {
                config.broker.client_id = Some(value);
                true
            }
            "SPEAKER_RTSP_HOST" => {
                config.rtsp.host = value;
                true
            }
            "SPEAKER_RTSP_PORT" => parse_into(&value, &mut config.rtsp.port),
            "SPEAKER_ALSA_DEVICE" => {
                config.audio.device = value;
                true
            }
            "SPEAKER_GPIO_PIN" => match value.parse() {
                Ok(pin) => {
                    config.gpio.pin = Some(pin);
                    true
                }
                Err(_) => false,
            },
            "SPEAKER_HOSTNAME" => {
                config.client.hostname = Some(value);
                true
            }
            "SPEAKER_WATCHDOG_SECS" => parse_into(&value, &mut config.watchdog.period_secs),
            "SPEAKER_LOG_LEVEL" => {
                config.telemetry.log_level = value;
                true
            }
            "RUST_LOG" => {
                rust_log = Some(value);
                false
            }
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }

    // RUST_LOG wins over SPEAKER_LOG_LEVEL regardless of iteration order
    if let Some(value) = rust_log {
        config.telemetry.log_level = value;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) -> bool {
    match value.parse() {
        Ok(parsed) => {
            *target = parsed;
            true
        }
        Err(_) => false,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        return match stripped.split_once('/') {
            Some((var_name, rest)) => env::var(var_name)
                .map(|v| PathBuf::from(v).join(rest))
                .unwrap_or_else(|_| PathBuf::from(path)),
            None => env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path)),
        };
    }

    PathBuf::from(path)
}
