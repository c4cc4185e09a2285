//! Common test utilities
#![allow(unused_imports, dead_code)] // Not every test file uses every helper

pub mod harness;

pub use harness::TestHarness;
