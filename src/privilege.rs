//! Identity switch that keeps exactly one capability.
//!
//! Sequence: keep capabilities across setuid, switch to the restricted uid,
//! then narrow the effective and permitted sets to the retained capability
//! with an empty inheritable set. Any failure is fatal to the caller.

use std::io;
use thiserror::Error;

/// `CAP_NET_ADMIN` from linux/capability.h
pub const CAP_NET_ADMIN: u32 = 12;

const LINUX_CAPABILITY_VERSION_3: u32 = 0x2008_0522;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    NetAdmin,
}

impl Capability {
    pub fn number(self) -> u32 {
        match self {
            Self::NetAdmin => CAP_NET_ADMIN,
        }
    }
}

#[derive(Error, Debug)]
pub enum PrivilegeError {
    #[error("prctl(PR_SET_KEEPCAPS) failed: {0}")]
    KeepCaps(#[source] io::Error),

    #[error("setuid({uid}) failed: {source}")]
    SetUid {
        uid: u32,
        #[source]
        source: io::Error,
    },

    #[error("uid is still {actual} after switching to {expected}")]
    UidMismatch { expected: u32, actual: u32 },

    #[error("capset failed: {0}")]
    CapSet(#[source] io::Error),

    #[error("privilege downgrade is not supported on this platform")]
    Unsupported,
}

/// Effective/permitted bitmask split into the two 32-bit words used by
/// `_LINUX_CAPABILITY_VERSION_3`.
pub fn capability_words(retained: &[Capability]) -> [u32; 2] {
    let mut words = [0u32; 2];
    for cap in retained {
        let n = cap.number();
        words[(n / 32) as usize] |= 1 << (n % 32);
    }
    words
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod sys {
    use super::*;

    #[repr(C)]
    struct CapUserHeader {
        version: u32,
        pid: libc::c_int,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct CapUserData {
        effective: u32,
        permitted: u32,
        inheritable: u32,
    }

    pub(super) fn keep_caps() -> Result<(), PrivilegeError> {
        // SAFETY: plain prctl with integer arguments.
        let rc = unsafe { libc::prctl(libc::PR_SET_KEEPCAPS, 1, 0, 0, 0) };
        if rc != 0 {
            return Err(PrivilegeError::KeepCaps(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub(super) fn set_uid(uid: u32) -> Result<(), PrivilegeError> {
        // SAFETY: setuid has no memory-safety preconditions.
        let rc = unsafe { libc::setuid(uid as libc::uid_t) };
        if rc != 0 {
            return Err(PrivilegeError::SetUid {
                uid,
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: getuid/geteuid cannot fail.
        let (real, effective) = unsafe { (libc::getuid(), libc::geteuid()) };
        if real != uid || effective != uid {
            return Err(PrivilegeError::UidMismatch {
                expected: uid,
                actual: if real != uid { real } else { effective },
            });
        }
        Ok(())
    }

    pub(super) fn cap_set(words: [u32; 2]) -> Result<(), PrivilegeError> {
        let mut header = CapUserHeader {
            version: LINUX_CAPABILITY_VERSION_3,
            pid: 0,
        };
        let mut data = [CapUserData::default(); 2];
        for (slot, word) in data.iter_mut().zip(words) {
            slot.effective = word;
            slot.permitted = word;
            slot.inheritable = 0;
        }

        // SAFETY: header and data are laid out as the kernel expects for
        // version 3 (two data elements) and outlive the call.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_capset,
                &mut header as *mut CapUserHeader,
                data.as_mut_ptr(),
            )
        };
        if rc != 0 {
            return Err(PrivilegeError::CapSet(io::Error::last_os_error()));
        }
        Ok(())
    }
}

/// Switch to `uid`, keeping only `retained` capabilities.
///
/// Capability sets are per-thread: call this on the thread that goes on to
/// load the vendor module so that threads it creates inherit the result.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn drop_privileges(uid: u32, retained: &[Capability]) -> Result<(), PrivilegeError> {
    tracing::debug!(uid, retained = ?retained, "Dropping privileges");

    sys::keep_caps()?;
    sys::set_uid(uid)?;
    sys::cap_set(capability_words(retained))?;

    tracing::info!(uid, "Switched user, retaining {:?}", retained);
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn drop_privileges(uid: u32, retained: &[Capability]) -> Result<(), PrivilegeError> {
    tracing::error!(uid, retained = ?retained, "Privilege downgrade unsupported");
    Err(PrivilegeError::Unsupported)
}
