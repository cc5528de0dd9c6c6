//! Generation paths: the blocking loop, the streaming worker and the
//! handoff queue between the worker and its consumers

mod blocking;
mod common;
mod forward;
mod queue;
mod stream;

pub use common::{resolve_target_tokens, UNBOUNDED_SAFETY_CAP};
pub use forward::StreamForwarder;
pub use queue::TokenQueue;

pub(crate) use blocking::{generate_blocking, BlockingJob};
pub(crate) use common::DecodeState;
pub(crate) use stream::{spawn_stream_worker, StreamChannels, StreamJob, StreamStatus};
