use std::path::PathBuf;

const ENV_CONFIG: &str = "RILD_CONFIG";
const ENV_LOG: &str = "RILD_LOG";
const ENV_PROPERTIES: &str = "RILD_PROPERTIES";

const DEFAULT_CONFIG_PATH: &str = "/system/etc/rild.toml";

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Config file path ($RILD_CONFIG or /system/etc/rild.toml)
pub fn config_path() -> PathBuf {
    let path = env_opt(ENV_CONFIG)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    tracing::trace!(path = %path.display(), "Resolved config path");
    path
}

/// Log filter override ($RILD_LOG)
pub fn log_filter() -> Option<String> {
    let val = env_opt(ENV_LOG);
    tracing::trace!(value = ?val, "RILD_LOG env var");
    val
}

/// File-backed property store override ($RILD_PROPERTIES)
pub fn properties_file() -> Option<PathBuf> {
    let val = env_opt(ENV_PROPERTIES).map(PathBuf::from);
    tracing::trace!(value = ?val, "RILD_PROPERTIES env var");
    val
}

/// Program name used for argv[0] handed to the vendor module.
pub fn program_name(argv0: Option<&str>) -> String {
    argv0
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "rild".to_string())
}
