//
// src/proxy/mod.rs
//
mod backend;
mod dispatcher;
mod forward;
mod pool;

pub use backend::Backend;
pub use dispatcher::{DispatchError, Dispatcher, FORWARDED_SERVER_HEADER};
pub use forward::{ForwardError, Forwarder, HttpForwarder};
pub use pool::{BackendSnapshot, FailureOutcome, PoolError, SelectedBackend, ServerPool};
