//! # trigger5-tool
//!
//! Command-line front end for the Trigger 5 device core. It runs the
//! PLL search, dumps the mode catalog and SET_MODE packets, and streams
//! test frames through a simulated adapter.

pub mod config;
pub mod pattern;
