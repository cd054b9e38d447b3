//! Integration test binary -- all integration tests consolidated into a single
//! binary.
//!
//! See the matklad pattern:
//! <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod helpers;

mod decision_scenarios;
mod state_documents;
mod watchdog_recovery;
