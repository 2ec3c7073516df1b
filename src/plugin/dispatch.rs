use std::path::{Path, PathBuf};

use libloading::Library;

use super::abi::{
    OnRequestCompleteFn, OnUnsolicitedResponseFn, RegisterFn, RequestTimedCallbackFn,
    RilEnv, RilRadioFunctions, StartEventLoopFn,
};
use crate::error::{Result, RildError};

/// The platform side of the module ABI: the callback table the module calls
/// into, the event loop those callbacks run on, and registration of the
/// module's function table.
pub trait Dispatch {
    /// Must stay at a fixed address for as long as the module is loaded.
    fn env(&self) -> &RilEnv;

    fn start_event_loop(&self);

    /// # Safety
    /// `funcs` must be the table returned by the module's initializer.
    unsafe fn register(&self, funcs: *const RilRadioFunctions);
}

/// Dispatch layer bound at runtime from the platform library.
pub struct LibrilDispatch {
    path: PathBuf,
    env: Box<RilEnv>,
    start_event_loop: StartEventLoopFn,
    register: RegisterFn,
    // Keeps every function pointer above valid.
    _library: Library,
}

fn symbol<T: Copy>(library: &Library, path: &Path, name: &str) -> Result<T> {
    // SAFETY: the caller names the exact C signature of each symbol.
    let sym = unsafe { library.get::<T>(name.as_bytes()) }.map_err(|e| {
        RildError::Dispatch(format!("{} missing from {}: {}", name, path.display(), e))
    })?;
    Ok(*sym)
}

impl LibrilDispatch {
    pub fn open(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Binding dispatch layer");

        // SAFETY: the dispatch library's initializers are trusted platform code.
        let library = unsafe { Library::new(path) }.map_err(|e| {
            RildError::Dispatch(format!("failed to load {}: {}", path.display(), e))
        })?;

        let env = Box::new(RilEnv {
            on_request_complete: symbol::<OnRequestCompleteFn>(
                &library,
                path,
                "RIL_onRequestComplete",
            )?,
            on_unsolicited_response: symbol::<OnUnsolicitedResponseFn>(
                &library,
                path,
                "RIL_onUnsolicitedResponse",
            )?,
            request_timed_callback: symbol::<RequestTimedCallbackFn>(
                &library,
                path,
                "RIL_requestTimedCallback",
            )?,
        });
        let start_event_loop = symbol::<StartEventLoopFn>(&library, path, "RIL_startEventLoop")?;
        let register = symbol::<RegisterFn>(&library, path, "RIL_register")?;

        tracing::trace!(path = %path.display(), "Dispatch layer bound");
        Ok(Self {
            path: path.to_path_buf(),
            env,
            start_event_loop,
            register,
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Dispatch for LibrilDispatch {
    fn env(&self) -> &RilEnv {
        &self.env
    }

    fn start_event_loop(&self) {
        tracing::debug!("Starting dispatch event loop");
        // SAFETY: resolved from the dispatch library, which is still loaded.
        unsafe { (self.start_event_loop)() }
    }

    unsafe fn register(&self, funcs: *const RilRadioFunctions) {
        // SAFETY: forwarded contract; the library is still loaded.
        unsafe { (self.register)(funcs) }
    }
}
