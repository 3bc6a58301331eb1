//! Dashboard Store (spec §4.B): the transactional, file-backed aggregate of
//! agents, tasks, messages, and cost — rendered to `dashboard.md` /
//! `messages.md` on every write.

pub mod cost;
pub mod fsm;
pub mod render;
pub mod state;
pub mod store;

pub use state::Dashboard;
pub use store::DashboardStore;
