use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, RildError};

/// Daemon configuration, read once at startup. Every field has a default so a
/// missing file behaves exactly like the stock build.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RildConfig {
    /// Log filter used when $RILD_LOG is unset (e.g. "info", "rild=debug")
    pub log_level: Option<String>,
    pub companion: CompanionConfig,
    pub privilege: PrivilegeConfig,
    pub properties: PropertiesConfig,
    pub boot: BootConfig,
    pub dispatch: DispatchConfig,
    pub tuning: TuningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub program: PathBuf,
    /// argv[0] of the companion
    pub name: String,
    pub args: Vec<String>,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/system/bin/tgmd"),
            name: "tgmd".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeConfig {
    /// Restricted identity (AID_RADIO)
    pub uid: u32,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self { uid: 1001 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertiesConfig {
    pub lib_path_key: String,
    pub lib_args_key: String,
    /// Backing file for hosts without a system property service
    pub file: PathBuf,
}

impl Default for PropertiesConfig {
    fn default() -> Self {
        Self {
            lib_path_key: "rild.libpath".to_string(),
            lib_args_key: "rild.libargs".to_string(),
            file: PathBuf::from("/data/local/rild/properties.toml"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    pub cmdline: PathBuf,
    pub reference_module: PathBuf,
    pub socket_dir: PathBuf,
    pub emulator_socket: String,
    pub probe_attempts: u32,
    pub probe_interval_ms: u64,
}

impl BootConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            cmdline: PathBuf::from("/proc/cmdline"),
            reference_module: PathBuf::from("/system/lib/libreference-ril.so"),
            socket_dir: PathBuf::from("/dev/socket"),
            emulator_socket: "qemud".to_string(),
            probe_attempts: 5,
            probe_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub library: PathBuf,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            library: PathBuf::from("libril.so"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub enabled: bool,
    pub properties: Vec<PropertySeed>,
    pub writes: Vec<FileWrite>,
    pub chmods: Vec<ModeChange>,
    pub flag_files: Vec<FlagFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertySeed {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileWrite {
    pub path: PathBuf,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeChange {
    pub path: PathBuf,
    pub mode: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlagFile {
    pub path: PathBuf,
    pub content: String,
    pub mode: u32,
    pub owner_uid: Option<u32>,
}

impl Default for TuningConfig {
    fn default() -> Self {
        let seed = |key: &str, value: &str| PropertySeed {
            key: key.to_string(),
            value: value.to_string(),
        };

        Self {
            enabled: true,
            properties: vec![
                seed("ro.FOREGROUND_APP_ADJ", "0"),
                seed("ro.VISIBLE_APP_ADJ", "1"),
                seed("ro.SECONDARY_SERVER_ADJ", "2"),
                seed("ro.HOME_APP_ADJ", "4"),
                seed("ro.HIDDEN_APP_MIN_ADJ", "7"),
                seed("ro.CONTENT_PROVIDER_ADJ", "14"),
                seed("ro.EMPTY_APP_ADJ", "15"),
                seed("ro.FOREGROUND_APP_MEM", "1536"),
                seed("ro.VISIBLE_APP_MEM", "8000"),
                seed("ro.SECONDARY_SERVER_MEM", "8000"),
                seed("ro.HOME_APP_MEM", "10000"),
                seed("ro.HIDDEN_APP_MEM", "10000"),
                seed("ro.CONTENT_PROVIDER_MEM", "12500"),
                seed("ro.EMPTY_APP_MEM", "16000"),
            ],
            writes: vec![
                FileWrite {
                    path: PathBuf::from("/sys/module/lowmemorykiller/parameters/adj"),
                    value: "0,1,2,7,14,15\n".to_string(),
                },
                FileWrite {
                    path: PathBuf::from("/sys/module/lowmemorykiller/parameters/minfree"),
                    value: "1536,8000,8000,10000,12500,16000\n".to_string(),
                },
            ],
            chmods: vec![
                ModeChange {
                    path: PathBuf::from("/sys/devices/system/cpu/cpu0/op"),
                    mode: 0o666,
                },
                ModeChange {
                    path: PathBuf::from("/sys/class/backlight/pxa3xx_pwm_bl/bl_power"),
                    mode: 0o666,
                },
            ],
            flag_files: vec![FlagFile {
                path: PathBuf::from("/tmp/wakeup"),
                content: "1\n".to_string(),
                mode: 0o666,
                owner_uid: Some(1000),
            }],
        }
    }
}

impl RildConfig {
    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading rild config");

        if !path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            RildError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        Self::parse(&content)
            .map_err(|e| RildError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&crate::clienv::config_path())
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Self = toml::from_str(content)?;
        tracing::trace!(
            companion = %config.companion.program.display(),
            uid = config.privilege.uid,
            tuning = config.tuning.enabled,
            "Config parsed"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RildConfig::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.companion.program, PathBuf::from("/system/bin/tgmd"));
        assert_eq!(config.privilege.uid, 1001);
        assert_eq!(config.properties.lib_path_key, "rild.libpath");
        assert_eq!(config.boot.probe_attempts, 5);
        assert_eq!(config.boot.probe_interval(), Duration::from_secs(1));
        assert_eq!(config.tuning.properties.len(), 14);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = RildConfig::parse(
            r#"
            log_level = "debug"

            [companion]
            program = "/vendor/bin/modemd"
            name = "modemd"

            [boot]
            probe_attempts = 2

            [tuning]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.companion.name, "modemd");
        assert!(config.companion.args.is_empty());
        assert_eq!(config.boot.probe_attempts, 2);
        assert_eq!(config.boot.emulator_socket, "qemud");
        assert!(!config.tuning.enabled);
        assert_eq!(config.tuning.writes.len(), 2);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rild.toml");
        fs::write(&path, "[privilege]\nuid = \"radio\"\n").unwrap();

        let err = RildConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, RildError::Config(_)));
    }
}
