//! Background watchers: filesystem hash, file changes, and changelog.

pub mod events;
pub mod messages;
pub mod runtime;

pub use events::{EdgeTrigger, WatchConfig, WatchParams};
pub use messages::{handle_request, Notification, Request, Response};
pub use runtime::{WatchChannels, WatchDaemon};
