//! Configuration descriptors for emitters and the streaming scheduler.

mod emitter_desc;
mod stream_desc;

pub use emitter_desc::EmitterDesc;
pub use stream_desc::StreamDesc;
