//! rill-edit: terminal input plumbing for the rill front-end.
//!
//! - **AsyncReader**: hands a readable descriptor to a background thread that
//!   decodes it into a channel of `char`s, and can be paused so the shell can
//!   give the descriptor to a foreground command.
//! - **Utf8Decoder**: incremental UTF-8 decoding across read boundaries.

mod async_reader;
mod decode;

pub use async_reader::{AsyncReader, CHANNEL_SIZE, ReaderError};
pub use decode::Utf8Decoder;
