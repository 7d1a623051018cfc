//! Continuous mirroring: change monitor, serialized job queue and control socket.
//!
//! [`run`] loads the saved settings, watches the source tree and applies each
//! change to the target through one processor task. Full syncs requested over
//! the socket share that queue.

mod error;
pub mod monitor;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use monitor::{
    ChangeEvent, ChangeKind, ChangeMonitor, ChangeSink, Debouncer, EventNormalizer, MonitorFilter,
    DEFAULT_COOLDOWN,
};
pub use protocol::{
    is_running, request_cancel, request_status, request_stop, request_sync, send_request,
    DaemonRequest, DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking, DaemonOptions, SyncSummary};
