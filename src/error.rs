use std::path::PathBuf;
use thiserror::Error;

use crate::privilege::PrivilegeError;

#[derive(Error, Debug)]
pub enum RildError {
    #[error("invalid arguments: {0}")]
    Usage(String),

    #[error("could not connect to {socket} socket after {attempts} attempts")]
    TransportUnavailable { socket: String, attempts: u32 },

    #[error("dlopen failed: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("{symbol} not defined or exported in {}", path.display())]
    SymbolMissing { symbol: String, path: PathBuf },

    #[error("{symbol} in {} returned a null function table", path.display())]
    NullFunctionTable { symbol: String, path: PathBuf },

    #[error(transparent)]
    Privilege(#[from] PrivilegeError),

    #[error("too many module arguments: {count} (max {max})")]
    TooManyModuleArgs { count: usize, max: usize },

    #[error("module argument contains an interior NUL byte: {0:?}")]
    InvalidModuleArg(String),

    #[error("dispatch layer unavailable: {0}")]
    Dispatch(String),

    #[error("property store: {0}")]
    Property(String),

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl RildError {
    /// Fatal errors that park the process instead of exiting it.
    pub fn parks(&self) -> bool {
        matches!(self, Self::TransportUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, RildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_park() {
        let transport = RildError::TransportUnavailable {
            socket: "qemud".into(),
            attempts: 5,
        };
        assert!(transport.parks());
        assert!(!RildError::Usage("-x".into()).parks());
        assert!(!RildError::Dispatch("gone".into()).parks());
    }

    #[test]
    fn test_symbol_missing_message() {
        let err = RildError::SymbolMissing {
            symbol: "RIL_Init".into(),
            path: PathBuf::from("/system/lib/libfoo-ril.so"),
        };
        assert_eq!(
            err.to_string(),
            "RIL_Init not defined or exported in /system/lib/libfoo-ril.so"
        );
    }
}
