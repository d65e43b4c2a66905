//! Integration and smoke tests for the Wyrm crates.
//!
//! All coverage lives under `tests/`; this library target is intentionally
//! empty.
