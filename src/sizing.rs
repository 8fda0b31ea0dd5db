//! Root and swap disk sizing.

use serde::{Deserialize, Serialize};

use crate::catalog::MachineType;

/// Fixed swap partition size in MB.
pub const SWAP_DISK_MB: u64 = 512;

const MB_PER_GB: u64 = 1024;

/// Disk sizes carved out of a machine type's allocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct DiskLayout {
    /// Root disk size in MB.
    pub root_mb: u64,
    /// Swap disk size in MB.
    pub swap_mb: u64,
}

impl DiskLayout {
    /// Splits the machine type's disk allocation into root and swap.
    ///
    /// The root disk receives the whole allocation minus [`SWAP_DISK_MB`];
    /// allocations smaller than the swap partition yield a zero-sized root.
    #[must_use]
    pub const fn for_machine(machine: &MachineType) -> Self {
        Self::for_disk_gb(machine.disk_gb)
    }

    /// Splits an allocation of `disk_gb` gigabytes into root and swap.
    #[must_use]
    pub const fn for_disk_gb(disk_gb: u64) -> Self {
        Self {
            root_mb: disk_gb.saturating_mul(MB_PER_GB).saturating_sub(SWAP_DISK_MB),
            swap_mb: SWAP_DISK_MB,
        }
    }
}
