//! Boot-time platform tuning applied while still privileged.
//!
//! Seeds the low-memory-killer properties, writes the kernel thresholds,
//! opens up a few control files, and drops the wakeup flag file. Every step
//! is best-effort.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::{FileWrite, FlagFile, ModeChange, TuningConfig};
use crate::properties::PropertyStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TuningReport {
    pub applied: usize,
    pub failed: usize,
}

impl TuningReport {
    fn record<E: std::fmt::Display>(&mut self, what: &str, result: Result<(), E>) {
        match result {
            Ok(()) => {
                debug!("Applied {}", what);
                self.applied += 1;
            }
            Err(e) => {
                warn!("Failed to apply {}: {}", what, e);
                self.failed += 1;
            }
        }
    }
}

pub fn apply(config: &TuningConfig, properties: &dyn PropertyStore) -> TuningReport {
    let mut report = TuningReport::default();
    if !config.enabled {
        debug!("Boot tuning disabled");
        return report;
    }

    for seed in &config.properties {
        let what = format!("property {}={}", seed.key, seed.value);
        report.record(&what, properties.set(&seed.key, &seed.value));
    }

    for FileWrite { path, value } in &config.writes {
        let what = format!("write {}", path.display());
        report.record(&what, fs::write(path, value));
    }

    for ModeChange { path, mode } in &config.chmods {
        let what = format!("chmod {:o} {}", mode, path.display());
        report.record(&what, set_mode(path, *mode));
    }

    for flag in &config.flag_files {
        let what = format!("flag file {}", flag.path.display());
        report.record(&what, create_flag_file(flag));
    }

    tracing::info!(
        applied = report.applied,
        failed = report.failed,
        "Boot tuning finished"
    );
    report
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, _mode: u32) -> std::io::Result<()> {
    fs::metadata(path).map(|_| ())
}

fn create_flag_file(flag: &FlagFile) -> std::io::Result<()> {
    fs::write(&flag.path, &flag.content)?;
    set_mode(&flag.path, flag.mode)?;

    #[cfg(unix)]
    if let Some(uid) = flag.owner_uid {
        std::os::unix::fs::chown(&flag.path, Some(uid), None)?;
    }
    Ok(())
}
