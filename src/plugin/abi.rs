//! C ABI shared between this daemon, the dispatch library and vendor modules.

use std::ffi::{c_char, c_int, c_void};

/// Exported by every vendor module.
pub const RIL_INIT_SYMBOL: &str = "RIL_Init";

pub type RilToken = *mut c_void;
pub type RilErrno = c_int;

pub type RilTimedCallback = Option<unsafe extern "C" fn(param: *mut c_void)>;

pub type OnRequestCompleteFn =
    unsafe extern "C" fn(t: RilToken, e: RilErrno, response: *mut c_void, responselen: usize);

pub type OnUnsolicitedResponseFn =
    unsafe extern "C" fn(unsol_response: c_int, data: *const c_void, datalen: usize);

pub type RequestTimedCallbackFn = unsafe extern "C" fn(
    callback: RilTimedCallback,
    param: *mut c_void,
    relative_time: *const libc::timeval,
);

/// Callback table handed to `RIL_Init`. Owned by the dispatch layer.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RilEnv {
    pub on_request_complete: OnRequestCompleteFn,
    pub on_unsolicited_response: OnUnsolicitedResponseFn,
    pub request_timed_callback: RequestTimedCallbackFn,
}

/// Function table returned by `RIL_Init`. Only the leading version field is
/// read here; the rest belongs to the dispatch layer.
#[repr(C)]
pub struct RilRadioFunctions {
    pub version: c_int,
    _opaque: [u8; 0],
}

impl RilRadioFunctions {
    #[cfg(test)]
    pub(crate) const fn with_version(version: c_int) -> Self {
        Self {
            version,
            _opaque: [],
        }
    }
}

pub type RilInitFn = unsafe extern "C" fn(
    env: *const RilEnv,
    argc: c_int,
    argv: *mut *mut c_char,
) -> *const RilRadioFunctions;

pub type StartEventLoopFn = unsafe extern "C" fn();

pub type RegisterFn = unsafe extern "C" fn(callbacks: *const RilRadioFunctions);
