//! Companion process supervision
//!
//! Keeps one named helper process alive for the lifetime of the daemon.
//! A dedicated thread spawns it, waits for it to exit and spawns it again,
//! forever, without back-off.
//!
//! ```text
//! ┌────────────── companion-supervisor thread ──────────────┐
//! │  spawn ──► Running{pid} ──► wait ──► Exited ──► spawn … │
//! └──────────────────────────┬──────────────────────────────┘
//!                            │ Mutex + Condvar
//!                    SupervisorHandle (main thread)
//! ```

pub mod supervisor;

pub use supervisor::{
    CompanionSpec, CompanionSupervisor, ProcessState, SupervisedProcess, SupervisorHandle,
};
