pub mod buffer;
pub mod context;
pub mod recorder;
pub mod sink;

pub use buffer::CommandBuffer;
pub use context::{replay_context, ReplayStatus, ReplaySwitch, ReplayingGuard};
pub use recorder::Recorder;
pub use sink::{ActionSink, HttpActionSink, StorageSink};
