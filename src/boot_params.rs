//! Kernel command line inspection.
//!
//! Two mutually exclusive signals are recognised: the emulator marker
//! (`android.qemud=`), which means the radio is reached through the emulator's
//! control socket, and `android.ril=<tty>`, which names the modem device.

use std::fs;
use std::io::Read;
use std::path::Path;

pub const EMULATOR_MARKER: &str = "android.qemud=";
pub const DEVICE_OPTION: &str = "android.ril=";
pub const DEVICE_PREFIX: &str = "/dev/";

/// Only the first page of the command line is inspected.
const CMDLINE_READ_MAX: u64 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootSignal {
    Emulator,
    /// Absolute device node, e.g. `/dev/ttyS1`
    Device(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootParams {
    raw: String,
}

impl BootParams {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Single snapshot of the command line pseudo-file. Bytes that are not
    /// UTF-8 are replaced, never rejected.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let mut bytes = Vec::new();
        fs::File::open(path)?
            .take(CMDLINE_READ_MAX)
            .read_to_end(&mut bytes)?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();
        tracing::trace!(path = %path.display(), len = raw.len(), "Read boot parameters");
        Ok(Self { raw })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn signal(&self) -> Option<BootSignal> {
        if self.raw.contains(EMULATOR_MARKER) {
            return Some(BootSignal::Emulator);
        }

        let start = self.raw.find(DEVICE_OPTION)? + DEVICE_OPTION.len();
        let rest = &self.raw[start..];
        let end = rest
            .find([' ', '\t', '\n', '\r'])
            .unwrap_or(rest.len());
        Some(BootSignal::Device(format!("{}{}", DEVICE_PREFIX, &rest[..end])))
    }
}
