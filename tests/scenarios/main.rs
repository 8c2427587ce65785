//! Scenario-based tests for cd-engine
//!
//! Stages are replaced by a recording double, so no scenario shells out.

mod helpers;

mod cancellation;
mod config_loading;
mod dependency_ordering;
mod dry_run;
mod failure_handling;
mod gates_and_promotion;
mod retry_behavior;
mod success_chain;
