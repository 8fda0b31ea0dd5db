//! Shared constants for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Shared values live under `tests/common/` and are pulled in with:
//!
//! ```rust
//! #[path = "common/test_constants.rs"]
//! mod test_constants;
//! ```

/// Cluster name used by workflow scenarios.
pub const CLUSTER: &str = "c1";

/// Zone identifier used by workflow scenarios.
pub const ZONE: &str = "3";

/// SKU used by workflow scenarios; doubles as the plan identifier.
pub const SKU: &str = "1";

/// Disk allocation of [`SKU`] in GB.
pub const SKU_DISK_GB: u64 = 20;
