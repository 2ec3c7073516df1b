//! Vendor RIL module loading
//!
//! Exactly one module is loaded per run. Its `RIL_Init` is called once with
//! the dispatch layer's callback table and the resolved argument vector, and
//! the function table it returns is registered with the dispatch layer.

pub mod abi;
pub mod dispatch;
pub mod loader;

pub use dispatch::{Dispatch, LibrilDispatch};
pub use loader::{hand_off, ActiveModule, VendorModule};
