//! Thin entry point over the durability profile's brick-size schedule.
//! Kept as its own module so the allocation driver can name "ask the size
//! generator for the next candidate" as a distinct step from placement.

use common::durability::BrickSizeSchedule;
use common::DurabilityProfile;

pub use common::durability::SizeCandidate;

/// Returns the ordered candidate schedule for a volume that still needs
/// `remaining_size` logical bytes under `durability`.
pub fn schedule_for(durability: DurabilityProfile, remaining_size: u64) -> BrickSizeSchedule {
    durability.brick_size_generator(remaining_size)
}
