//! Delivery channels.
//!
//! - [`senders`]: per-channel delivery capabilities and their HTTP clients.
//! - [`channels`]: handlers that turn a stored payload into a sender call.
//! - [`registry`]: the dispatch table mapping a notification type to its handler.

pub mod channels;
pub mod error;
pub mod registry;
pub mod senders;

pub use channels::ChannelHandler;
pub use error::{DispatchError, SendError};
pub use registry::SenderRegistry;
