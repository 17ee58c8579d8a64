//! The core of TLS capture analysis.
//! Segment a capture into TCP sessions, track each handshake's phase and turn the
//! server's responses into a labeled feature row.
pub mod capture;
pub mod containers;
pub mod core;
pub mod features;
pub mod labels;
pub mod state;
pub mod utils;
