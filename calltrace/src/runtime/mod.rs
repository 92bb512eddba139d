//! In-process tracing runtime
//!
//! Everything instrumented code touches on its hot path:
//!
//! - [`activation`]: which methods have fired at least once
//! - [`admission`]: how many more threads may be traced
//! - [`buffer`]: the shared record buffer and its collector signals
//! - [`suspend`]: the pause switch for all hooks
//! - [`thread_state`] / [`registry`]: per-thread call-stack state
//! - [`tracer`] / [`hooks`]: the owner of all of the above and the hook entry points
//! - [`global`]: a process-wide tracer for code that cannot carry a handle

pub mod activation;
pub mod admission;
pub mod buffer;
pub mod global;
mod hooks;
pub mod registry;
pub mod stats;
pub mod suspend;
pub mod thread_state;
pub mod tracer;

pub use activation::{FirstInvokeHandler, MethodActivationTable};
pub use admission::AdmissionController;
pub use buffer::{BufferSignal, Drained, EventBuffer};
pub use stats::{StatsSnapshot, TracerStats};
pub use suspend::SuspendBarrier;
pub use thread_state::{ThreadPhase, ThreadSnapshot, ThreadState};
pub use tracer::Tracer;
