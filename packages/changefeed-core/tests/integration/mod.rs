//! Integration tests for buffering and materialization.
//!
//! 1. Transaction buffer spillover
//! 2. Materializer replay, grouping and error tolerance

pub mod materializer_tests;
pub mod spill_tests;
