//! Tests for the evaluator, instrumentation and parallel execution
//!
//! Organized by feature area; every test runs a whole program through the
//! engine.

mod control_tests;
mod expression_tests;
mod helpers;
mod parallel_tests;
mod report_tests;
