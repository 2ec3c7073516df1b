//! Decides which vendor module to load and with which arguments.
//!
//! Precedence: `-l` on the command line, then the library path property. Once
//! a path exists the kernel command line may override both path and
//! arguments (emulator socket or named modem device). Arguments not supplied
//! by either the command line or the override come from the library
//! arguments property.
//!
//! Property reads and the socket probe are injected so the decision can be
//! made against fakes.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::boot_params::{BootParams, BootSignal};
use crate::config::RildConfig;
use crate::error::{Result, RildError};
use crate::properties::PropertyStore;

/// Upper bound on the argument vector built from the arguments property,
/// argv[0] included.
pub const MAX_LIB_ARGS: usize = 16;

/// What the command line asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliRequest {
    pub module_path: Option<PathBuf>,
    /// `Some` when a `--` separator was present, even with nothing after it.
    pub module_args: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocator {
    pub path: PathBuf,
    /// Full vector handed to the module; slot 0 is always our program name.
    pub argv: Vec<String>,
}

impl ModuleLocator {
    pub fn program_name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn module_args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Module(ModuleLocator),
    /// Nothing on the command line and nothing in the property store.
    NoModule,
}

pub trait SocketProbe {
    /// Connect to the stream socket at `path` and close it again.
    fn connect(&self, path: &Path) -> io::Result<()>;
}

/// Probes the platform's local socket namespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSocketProbe;

impl SocketProbe for LocalSocketProbe {
    fn connect(&self, path: &Path) -> io::Result<()> {
        use interprocess::local_socket::{prelude::*, GenericFilePath, Stream};

        let name = path.to_fs_name::<GenericFilePath>()?;
        let stream = Stream::connect(name)?;
        drop(stream);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub lib_path_key: String,
    pub lib_args_key: String,
    pub reference_module: PathBuf,
    pub socket_dir: PathBuf,
    pub emulator_socket: String,
    pub probe_attempts: u32,
    pub probe_interval: Duration,
}

impl From<&RildConfig> for ResolverSettings {
    fn from(config: &RildConfig) -> Self {
        Self {
            lib_path_key: config.properties.lib_path_key.clone(),
            lib_args_key: config.properties.lib_args_key.clone(),
            reference_module: config.boot.reference_module.clone(),
            socket_dir: config.boot.socket_dir.clone(),
            emulator_socket: config.boot.emulator_socket.clone(),
            probe_attempts: config.boot.probe_attempts,
            probe_interval: config.boot.probe_interval(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&RildConfig::default())
    }
}

pub struct Resolver<'a> {
    settings: &'a ResolverSettings,
    properties: &'a dyn PropertyStore,
    probe: &'a dyn SocketProbe,
}

impl<'a> Resolver<'a> {
    pub fn new(
        settings: &'a ResolverSettings,
        properties: &'a dyn PropertyStore,
        probe: &'a dyn SocketProbe,
    ) -> Self {
        Self {
            settings,
            properties,
            probe,
        }
    }

    /// `boot` is `None` when the kernel command line could not be read; the
    /// override step is then skipped.
    pub fn resolve(
        &self,
        program_name: &str,
        cli: &CliRequest,
        boot: Option<&BootParams>,
    ) -> Result<Resolution> {
        let mut path = match &cli.module_path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Module path from command line");
                path.clone()
            }
            None => match self.properties.get(&self.settings.lib_path_key) {
                Some(value) => {
                    tracing::debug!(key = %self.settings.lib_path_key, path = %value, "Module path from property");
                    PathBuf::from(value)
                }
                None => {
                    tracing::info!("No module on the command line or in {}", self.settings.lib_path_key);
                    return Ok(Resolution::NoModule);
                }
            },
        };

        let mut explicit_args = cli.module_args.clone();

        if let Some(boot) = boot {
            if let Some(args) = self.boot_override(boot)? {
                tracing::info!("overriding with {} {}", args[0], args[1]);
                path = self.settings.reference_module.clone();
                explicit_args = Some(args);
            }
        }

        let args = match explicit_args {
            Some(args) => args,
            None => self.property_args()?,
        };

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(program_name.to_string());
        argv.extend(args);

        tracing::trace!(path = %path.display(), argv = ?argv, "Module resolved");
        Ok(Resolution::Module(ModuleLocator { path, argv }))
    }

    fn boot_override(&self, boot: &BootParams) -> Result<Option<Vec<String>>> {
        match boot.signal() {
            None => Ok(None),
            Some(BootSignal::Emulator) => {
                let socket = self.wait_for_emulator_socket()?;
                Ok(Some(vec!["-s".to_string(), socket.display().to_string()]))
            }
            Some(BootSignal::Device(device)) => Ok(Some(vec!["-d".to_string(), device])),
        }
    }

    /// The emulator's control daemon starts after us, so give it time to
    /// create its socket.
    fn wait_for_emulator_socket(&self) -> Result<PathBuf> {
        let socket = self.settings.socket_dir.join(&self.settings.emulator_socket);
        let attempts = self.settings.probe_attempts.max(1);

        for attempt in 1..=attempts {
            std::thread::sleep(self.settings.probe_interval);

            match self.probe.connect(&socket) {
                Ok(()) => {
                    tracing::debug!(socket = %socket.display(), attempt, "Emulator socket reachable");
                    return Ok(socket);
                }
                Err(e) => {
                    tracing::debug!(
                        "could not connect to {} socket: {} (attempt {}/{})",
                        self.settings.emulator_socket,
                        e,
                        attempt,
                        attempts
                    );
                }
            }
        }

        Err(RildError::TransportUnavailable {
            socket: self.settings.emulator_socket.clone(),
            attempts,
        })
    }

    fn property_args(&self) -> Result<Vec<String>> {
        let raw = self
            .properties
            .get(&self.settings.lib_args_key)
            .unwrap_or_default();
        let args = split_args(&raw)?;
        tracing::debug!(key = %self.settings.lib_args_key, args = ?args, "Module arguments from property");
        Ok(args)
    }
}

/// Splits a whitespace-delimited argument string, leaving room for argv[0].
pub fn split_args(raw: &str) -> Result<Vec<String>> {
    let args: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if args.len() + 1 > MAX_LIB_ARGS {
        return Err(RildError::TooManyModuleArgs {
            count: args.len() + 1,
            max: MAX_LIB_ARGS,
        });
    }
    Ok(args)
}
