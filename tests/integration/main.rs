//! Integration tests for Shelfwatch
//!
//! These tests serve a small catalog from a wiremock server and drive whole
//! runs against an on-disk database.

mod catalog;
mod run_tests;
