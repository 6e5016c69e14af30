pub mod error;
pub mod queue;
pub mod retry;
pub mod sink;
pub mod state_manager;
