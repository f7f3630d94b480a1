pub mod controller;
pub mod source;
pub mod target;

pub use controller::{abort_pair, AbortHandle, AbortSignal, ReplayController, ReplayState};
pub use source::{ActionSource, EngineSource, HttpActionSource};
pub use target::{ReplayTarget, TracingTarget};
