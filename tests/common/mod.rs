//! Common test utilities for most-read
//!
//! - `FlakyStore`: a memory store whose writes can be switched to fail
//! - `TestEnvironment`: a fully wired `MostRead` over in-process backends

pub mod test_helpers;
