//! Integration test suite for taskpilot.
//!
//! These tests exercise the full pipeline from raw text to a final
//! session report: parsing, sequencing, the confirmation loop, and
//! session lifecycle bookkeeping.
//!
//! # Test Categories
//!
//! - `end_to_end`: full runs against stub collaborators
//! - `lifecycle`: session registry, cancellation, and sweeping
//!
//! # CI Compatibility
//!
//! All agent traffic goes through stub channels; no external process
//! or network is touched.

mod fixtures;

mod end_to_end;
mod lifecycle;
