//! Device payload schema
//!
//! This module defines the permissive wire format for device readings and the
//! adapter that turns topic payloads into typed records.

mod adapter;
mod raw_reading;

pub use adapter::*;
pub use raw_reading::*;
