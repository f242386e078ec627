//! Test utilities for DirCache integration tests
//!
//! - CacheFixture: a cache over an in-memory directory with a manual clock
//! - sample_data: directory entries and configurations shared by the tests

#![allow(dead_code)]

pub mod sample_data;
pub mod test_fixture;
