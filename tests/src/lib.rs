//! # R5N Test Suite
//!
//! Cross-crate scenarios running complete nodes against the
//! in-process channel transport. Unit-level properties live next to
//! the code they cover; this crate holds the flows that need a whole
//! overlay.

#[cfg(test)]
mod scenarios;
