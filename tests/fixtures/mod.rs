//! Test Fixtures Module
//!
//! - Audio fixtures (programmatically generated)
//! - Telephony and realtime wire frames

// Not every test binary uses every fixture
#![allow(dead_code)]

pub mod audio_fixtures;
pub mod frames;

pub use audio_fixtures::*;
