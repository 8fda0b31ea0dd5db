//! Newtypes for provider identifiers to avoid mixing up numeric IDs.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw provider identifier.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw provider identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Provider-assigned instance identifier.
    InstanceId
);
numeric_id!(
    /// Datacenter (zone/region) identifier.
    ZoneId
);
numeric_id!(
    /// Plan identifier selecting the instance's sizing tier.
    PlanId
);
numeric_id!(
    /// Boot kernel identifier.
    KernelId
);
numeric_id!(
    /// Operating system image (distribution) identifier.
    ImageId
);
numeric_id!(
    /// Disk identifier.
    DiskId
);
numeric_id!(
    /// Boot configuration identifier.
    ConfigId
);
numeric_id!(
    /// Startup script identifier.
    ScriptId
);
numeric_id!(
    /// Provider job identifier returned by asynchronous actions.
    JobId
);

const BEING_CREATED: i32 = -1;
const BRAND_NEW: i32 = 0;
const RUNNING: i32 = 1;
const POWERED_OFF: i32 = 2;

/// Lifecycle status reported by the provider for an instance.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[serde(from = "i32", into = "i32")]
pub enum InstanceStatus {
    /// The provider is still materialising the instance.
    BeingCreated,
    /// The instance exists but has never been booted.
    BrandNew,
    /// The instance is booted.
    Running,
    /// The instance is shut down.
    PoweredOff,
    /// A status code this crate does not know about.
    Other(i32),
}

impl InstanceStatus {
    /// Maps a provider status code onto a status.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            BEING_CREATED => Self::BeingCreated,
            BRAND_NEW => Self::BrandNew,
            RUNNING => Self::Running,
            POWERED_OFF => Self::PoweredOff,
            other => Self::Other(other),
        }
    }

    /// Returns the provider status code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::BeingCreated => BEING_CREATED,
            Self::BrandNew => BRAND_NEW,
            Self::Running => RUNNING,
            Self::PoweredOff => POWERED_OFF,
            Self::Other(code) => code,
        }
    }
}

impl From<i32> for InstanceStatus {
    fn from(value: i32) -> Self {
        Self::from_code(value)
    }
}

impl From<InstanceStatus> for i32 {
    fn from(value: InstanceStatus) -> Self {
        value.code()
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeingCreated => f.write_str("Being Created"),
            Self::BrandNew => f.write_str("Brand New"),
            Self::Running => f.write_str("Running"),
            Self::PoweredOff => f.write_str("Powered Off"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}
