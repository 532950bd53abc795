//! Tests for the crate-level types.
//!
//! - `state`: SessionState display, parsing and classification
//! - `session_id`: SessionId generation and serialization
