//! Shared fixtures for integration tests

#![allow(dead_code)]

mod fakes;
mod overlay;

pub use fakes::{RecordingRunner, StaticFetcher};
pub use overlay::TestOverlay;
