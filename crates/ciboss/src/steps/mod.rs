//! The three steps of the orchestration loop.

pub mod fetch;
pub mod planner;
pub mod test_runner;

pub use fetch::fetch_step;
pub use planner::{decide_step, PlannerContext};
pub use test_runner::run_tests_step;
