use std::ffi::{c_char, c_int, CString};
use std::path::{Path, PathBuf};

use libloading::Library;

use super::abi::{RilInitFn, RIL_INIT_SYMBOL};
use super::dispatch::Dispatch;
use crate::error::{Result, RildError};
use crate::resolver::ModuleLocator;

/// A vendor module whose initializer has been resolved but not yet called.
///
/// `initialize` consumes the module, so the initializer runs at most once.
pub struct VendorModule {
    path: PathBuf,
    init: RilInitFn,
    library: Option<Library>,
}

/// A module that has been handed control. Holds everything the module may
/// still point into; dropping it would unload live code.
pub struct ActiveModule {
    path: PathBuf,
    version: i32,
    _argv: ModuleArgv,
    _library: Option<Library>,
}

impl ActiveModule {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version reported in the module's function table.
    pub fn version(&self) -> i32 {
        self.version
    }
}

/// NUL-terminated argument strings plus the pointer array handed to C.
struct ModuleArgv {
    _strings: Vec<CString>,
    pointers: Vec<*mut c_char>,
}

impl ModuleArgv {
    fn new(argv: &[String]) -> Result<Self> {
        let strings = argv
            .iter()
            .map(|a| CString::new(a.as_str()).map_err(|_| RildError::InvalidModuleArg(a.clone())))
            .collect::<Result<Vec<_>>>()?;
        let mut pointers: Vec<*mut c_char> = strings
            .iter()
            .map(|s| s.as_ptr() as *mut c_char)
            .collect();
        pointers.push(std::ptr::null_mut());
        Ok(Self {
            _strings: strings,
            pointers,
        })
    }

    fn argc(&self) -> c_int {
        (self.pointers.len() - 1) as c_int
    }
}

impl VendorModule {
    /// Load the module and resolve its initializer.
    pub fn open(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading vendor module");

        // SAFETY: running the module's constructors is the point of loading it;
        // privileges have already been dropped by the caller.
        let library = unsafe { Library::new(path) }.map_err(|source| RildError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: RIL_Init has this signature by ABI contract.
        let init = unsafe { library.get::<RilInitFn>(RIL_INIT_SYMBOL.as_bytes()) }
            .map(|sym| *sym)
            .map_err(|_| RildError::SymbolMissing {
                symbol: RIL_INIT_SYMBOL.to_string(),
                path: path.to_path_buf(),
            })?;

        tracing::trace!(path = %path.display(), "Resolved {}", RIL_INIT_SYMBOL);
        Ok(Self {
            path: path.to_path_buf(),
            init,
            library: Some(library),
        })
    }

    #[cfg(test)]
    fn from_initializer(path: &Path, init: RilInitFn, library: Option<Library>) -> Self {
        Self {
            path: path.to_path_buf(),
            init,
            library,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start the event loop, run the initializer with `argv`, and register the
    /// returned function table. After this the module owns all further work.
    pub fn initialize(self, dispatch: &dyn Dispatch, argv: &[String]) -> Result<ActiveModule> {
        let mut module_argv = ModuleArgv::new(argv)?;

        dispatch.start_event_loop();

        tracing::info!(
            path = %self.path.display(),
            argc = module_argv.argc(),
            "Calling {}",
            RIL_INIT_SYMBOL
        );
        // SAFETY: env outlives the module (owned by the dispatch layer) and
        // argv is NUL-terminated storage kept alive in the returned ActiveModule.
        let funcs = unsafe {
            (self.init)(
                dispatch.env() as *const _,
                module_argv.argc(),
                module_argv.pointers.as_mut_ptr(),
            )
        };

        if funcs.is_null() {
            // The initializer may already have started threads running module
            // code, so the library must stay mapped until the process exits.
            std::mem::forget(self.library);
            return Err(RildError::NullFunctionTable {
                symbol: RIL_INIT_SYMBOL.to_string(),
                path: self.path,
            });
        }

        // SAFETY: non-null table returned by the initializer; version is its
        // first field.
        let version = unsafe { (*funcs).version };
        // SAFETY: funcs came straight from the initializer.
        unsafe { dispatch.register(funcs) };

        tracing::info!(path = %self.path.display(), version, "Vendor module registered");
        Ok(ActiveModule {
            path: self.path,
            version,
            _argv: module_argv,
            _library: self.library,
        })
    }
}

/// Load, initialize and register the module described by `locator`.
pub fn hand_off(locator: &ModuleLocator, dispatch: &dyn Dispatch) -> Result<ActiveModule> {
    VendorModule::open(&locator.path)?.initialize(dispatch, &locator.argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::abi::{RilEnv, RilRadioFunctions, RilTimedCallback, RilToken};
    use std::cell::RefCell;
    use std::ffi::{c_void, CStr};
    use std::sync::Mutex;

    unsafe extern "C" fn on_request_complete(_: RilToken, _: c_int, _: *mut c_void, _: usize) {}
    unsafe extern "C" fn on_unsolicited_response(_: c_int, _: *const c_void, _: usize) {}
    unsafe extern "C" fn request_timed_callback(
        _: RilTimedCallback,
        _: *mut c_void,
        _: *const libc::timeval,
    ) {
    }

    struct RecordingDispatch {
        env: RilEnv,
        events: RefCell<Vec<String>>,
    }

    impl RecordingDispatch {
        fn new() -> Self {
            Self {
                env: RilEnv {
                    on_request_complete,
                    on_unsolicited_response,
                    request_timed_callback,
                },
                events: RefCell::new(Vec::new()),
            }
        }
    }

    impl Dispatch for RecordingDispatch {
        fn env(&self) -> &RilEnv {
            &self.env
        }

        fn start_event_loop(&self) {
            self.events.borrow_mut().push("start_event_loop".into());
        }

        unsafe fn register(&self, funcs: *const RilRadioFunctions) {
            let version = unsafe { (*funcs).version };
            self.events.borrow_mut().push(format!("register v{version}"));
        }
    }

    static TABLE: RilRadioFunctions = RilRadioFunctions::with_version(6);

    /// (argc, argv, env pointer) seen by the fake initializer
    static SEEN: Mutex<Vec<(c_int, Vec<String>, usize)>> = Mutex::new(Vec::new());

    unsafe extern "C" fn fake_init(
        env: *const RilEnv,
        argc: c_int,
        argv: *mut *mut c_char,
    ) -> *const RilRadioFunctions {
        let mut args = Vec::new();
        for i in 0..argc as usize {
            let arg = unsafe { CStr::from_ptr(*argv.add(i)) };
            args.push(arg.to_string_lossy().into_owned());
        }
        assert!(unsafe { (*argv.add(argc as usize)).is_null() });
        SEEN.lock().unwrap().push((argc, args, env as usize));
        &TABLE
    }

    unsafe extern "C" fn null_init(
        _: *const RilEnv,
        _: c_int,
        _: *mut *mut c_char,
    ) -> *const RilRadioFunctions {
        std::ptr::null()
    }

    #[test]
    fn test_initialize_order_and_arguments() {
        let dispatch = RecordingDispatch::new();
        let module =
            VendorModule::from_initializer(Path::new("/data/libfake-ril.so"), fake_init, None);
        let argv = vec![
            "/system/bin/rild".to_string(),
            "-d".to_string(),
            "/dev/ttyX".to_string(),
        ];

        let active = module.initialize(&dispatch, &argv).unwrap();

        assert_eq!(active.version(), 6);
        assert_eq!(active.path(), Path::new("/data/libfake-ril.so"));
        assert_eq!(
            *dispatch.events.borrow(),
            vec!["start_event_loop".to_string(), "register v6".to_string()]
        );

        let seen = SEEN.lock().unwrap();
        let call = seen
            .iter()
            .find(|(_, args, _)| args.last().map(String::as_str) == Some("/dev/ttyX"))
            .expect("initializer called");
        assert_eq!(call.0, 3);
        assert_eq!(call.1, argv);
        assert_eq!(call.2, &dispatch.env as *const RilEnv as usize);
    }

    #[test]
    fn test_null_function_table_is_not_registered() {
        let dispatch = RecordingDispatch::new();
        let module =
            VendorModule::from_initializer(Path::new("/data/libnull-ril.so"), null_init, None);

        let err = module
            .initialize(&dispatch, &["rild".to_string()])
            .err()
            .expect("null table must fail");

        assert!(matches!(err, RildError::NullFunctionTable { .. }));
        assert_eq!(*dispatch.events.borrow(), vec!["start_event_loop".to_string()]);
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn is_loaded(name: &str) -> bool {
        let name = CString::new(name).unwrap();
        // SAFETY: RTLD_NOLOAD only queries; the extra reference is released.
        unsafe {
            let handle = libc::dlopen(name.as_ptr(), libc::RTLD_NOW | libc::RTLD_NOLOAD);
            if handle.is_null() {
                return false;
            }
            libc::dlclose(handle);
            true
        }
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_null_function_table_keeps_library_mapped() {
        const LIB: &str = "libresolv.so.2";
        // SAFETY: a glibc system library with no RIL symbols.
        let Ok(library) = (unsafe { Library::new(LIB) }) else {
            return;
        };
        let dispatch = RecordingDispatch::new();
        let module = VendorModule::from_initializer(Path::new(LIB), null_init, Some(library));

        let err = module
            .initialize(&dispatch, &["rild".to_string()])
            .err()
            .expect("null table must fail");

        assert!(matches!(err, RildError::NullFunctionTable { .. }));
        assert!(is_loaded(LIB));
    }

    #[test]
    fn test_interior_nul_rejected_before_event_loop() {
        let dispatch = RecordingDispatch::new();
        let module =
            VendorModule::from_initializer(Path::new("/data/libfake-ril.so"), fake_init, None);

        let err = module
            .initialize(&dispatch, &["rild".to_string(), "bad\0arg".to_string()])
            .err()
            .expect("NUL must be rejected");

        assert!(matches!(err, RildError::InvalidModuleArg(_)));
        assert!(dispatch.events.borrow().is_empty());
    }

    #[test]
    fn test_missing_module_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = VendorModule::open(&dir.path().join("libmissing-ril.so"))
            .err()
            .expect("load must fail");
        assert!(matches!(err, RildError::Load { .. }));
        assert!(err.to_string().starts_with("dlopen failed: "));
    }

    #[test]
    fn test_non_library_file_is_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libgarbage-ril.so");
        std::fs::write(&path, b"not an elf").unwrap();

        let err = VendorModule::open(&path).err().expect("load must fail");
        assert!(matches!(err, RildError::Load { .. }));
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_library_without_initializer_is_symbol_missing() {
        let err = VendorModule::open(Path::new("libc.so.6"))
            .err()
            .expect("libc exports no RIL_Init");
        match err {
            RildError::SymbolMissing { symbol, path } => {
                assert_eq!(symbol, "RIL_Init");
                assert_eq!(path, PathBuf::from("libc.so.6"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
