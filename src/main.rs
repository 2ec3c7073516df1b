mod args;
mod init;

use std::process::ExitCode;

use rild::boot_params::BootParams;
use rild::clienv;
use rild::companion::{CompanionSpec, CompanionSupervisor};
use rild::idle::park_forever;
use rild::plugin::{self, ActiveModule, LibrilDispatch};
use rild::privilege::{self, Capability};
use rild::properties;
use rild::resolver::{LocalSocketProbe, ResolverSettings};
use rild::tuning;
use rild::{CliRequest, RildConfig, Resolution, Resolver};
use tracing::{debug, error, info};

const FATAL_EXIT: u8 = 255;

/// Everything the vendor module may still reference. Never dropped.
struct Handoff {
    _module: ActiveModule,
    _dispatch: LibrilDispatch,
}

fn main() -> ExitCode {
    let config = init::load_config();
    init::initialize_logging(config.as_ref().ok());

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(FATAL_EXIT);
        }
    };

    let argv: Vec<String> = std::env::args().collect();
    let program = clienv::program_name(argv.first().map(String::as_str));

    // The companion comes first so it is up as early in boot as possible.
    let _companion = match CompanionSupervisor::new(CompanionSpec::from(&config.companion)).start()
    {
        Ok(handle) => {
            debug!(pid = ?handle.current_pid(), "Companion supervisor running");
            Some(handle)
        }
        Err(e) => {
            error!("Failed to start companion supervisor: {}", e);
            None
        }
    };

    match serve(&config, &program, argv, run) {
        Outcome::Park => park_forever(),
        Outcome::Exit(code) => ExitCode::from(code),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Park,
    Exit(u8),
}

/// Validate the command line, then hand it to `run`. A usage error returns
/// before `run` touches property or privilege state.
fn serve<F>(config: &RildConfig, program: &str, argv: Vec<String>, run: F) -> Outcome
where
    F: FnOnce(&RildConfig, &str, &CliRequest) -> rild::Result<Option<Handoff>>,
{
    let request = match args::parse(argv) {
        Ok(request) => request,
        Err(e) => {
            debug!("{}", e);
            eprintln!("{}", args::usage(program));
            return Outcome::Exit(FATAL_EXIT);
        }
    };

    match run(config, program, &request) {
        Ok(Some(handoff)) => {
            // The module runs on its own threads from here on.
            std::mem::forget(handoff);
            Outcome::Park
        }
        Ok(None) => Outcome::Park,
        Err(e) if e.parks() => {
            error!("{} (giving up)", e);
            Outcome::Park
        }
        Err(e) => {
            error!("{}", e);
            Outcome::Exit(FATAL_EXIT)
        }
    }
}

fn run(config: &RildConfig, program: &str, request: &CliRequest) -> rild::Result<Option<Handoff>> {
    let properties = properties::platform_store(&config.properties);

    tuning::apply(&config.tuning, properties.as_ref());

    let boot = match BootParams::read(&config.boot.cmdline) {
        Ok(boot) => Some(boot),
        Err(e) => {
            debug!("could not read {}: {}", config.boot.cmdline.display(), e);
            None
        }
    };

    let settings = ResolverSettings::from(config);
    let resolver = Resolver::new(&settings, properties.as_ref(), &LocalSocketProbe);
    let locator = match resolver.resolve(program, request, boot.as_ref())? {
        Resolution::Module(locator) => locator,
        Resolution::NoModule => {
            info!("No RIL module configured, idling");
            return Ok(None);
        }
    };

    let dispatch = LibrilDispatch::open(&config.dispatch.library)?;

    privilege::drop_privileges(config.privilege.uid, &[Capability::NetAdmin])?;

    let module = plugin::hand_off(&locator, &dispatch)?;
    Ok(Some(Handoff {
        _module: module,
        _dispatch: dispatch,
    }))
}
