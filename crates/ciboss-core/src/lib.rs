pub mod config;
pub mod decision;
pub mod prompt;
pub mod report;
pub mod text;
pub mod types;

pub use config::Config;
pub use decision::{DecisionSource, PlannerDecision};
pub use types::*;
