//! Plain-data model shared by the dashboard store, IPC bus, and dispatcher
//! (spec §3). Kept free of any file-format or locking concerns so it can be
//! unit-tested in isolation.

pub mod agent;
pub mod cost;
pub mod message;
pub mod role;
pub mod task;

pub use agent::{Agent, AgentStatus, PanePlacement};
pub use cost::{ApiCallRecord, CostEstimate, CostInfo, CostSource, CostSummary};
pub use message::{Message, MessagePriority, MessageType};
pub use role::{AiCli, Role};
pub use task::{normalize_task_id, ChecklistItem, Task, TaskStatus};
