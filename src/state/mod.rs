//! State module for tracking crawl run progress
//!
//! `RunState` is the run coordinator's state machine. It is persisted with
//! each run so an interrupted run can be found and resumed.

mod run_state;

pub use run_state::RunState;
