//! IPC Bus (spec §4.D): per-agent inboxes plus routing/broadcast rules.

pub mod bus;
pub mod inbox;

pub use bus::{IpcBus, SendMessageOutcome, SendMessageRequest};
pub use inbox::Inbox;
