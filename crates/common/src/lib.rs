pub mod durability;
pub mod error;
pub mod model;
pub mod traits;

pub use durability::{BrickSizeSchedule, DurabilityProfile};
pub use error::{CoreError, CoreResult};
pub use model::{Brick, Cluster, Device, Node, Volume};
pub use traits::{Update, View};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decimal gigabyte, matching upstream's `GB = 10^9` (not a gibibyte).
pub const GB: u64 = 1_000_000_000;

/// Default ceiling on bricks per volume; overridable by the CLI config.
pub const BRICK_MAX_NUM: usize = 2000;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(ClusterId);
uuid_id!(NodeId);
uuid_id!(DeviceId);
uuid_id!(BrickId);
uuid_id!(VolumeId);
