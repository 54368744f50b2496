//! Test Helper Utilities
//!
//! Shared utilities for testing mabot-ai

#![allow(dead_code)]

pub mod audio;
pub mod db_utils;
pub mod fakes;

pub use audio::silent_wav;
pub use db_utils::{create_test_db, get_table_columns};
pub use fakes::{
    analysis, candidate, fast_retry, init_test_logging, FailingLedger, FakeAnalyzer, FakeDiscovery,
    FakeSink, FakeStore, FakeTranscriber, Harness, MoveRecord,
};
