use serde::{Deserialize, Serialize};

/// Floor below which the size generator gives up shrinking a brick further.
const MIN_BRICK_SIZE: u64 = 1024 * 1024;

/// How a volume replicates or disperses its bricks across a fault domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DurabilityProfile {
    DistributeOnly,
    Replicated { replica: u32 },
    Dispersed { data: u32, redundancy: u32 },
}

impl DurabilityProfile {
    /// Number of bricks that make up one brick set.
    pub fn bricks_in_set(&self) -> u32 {
        match self {
            DurabilityProfile::DistributeOnly => 1,
            DurabilityProfile::Replicated { replica } => *replica,
            DurabilityProfile::Dispersed { data, redundancy } => data + redundancy,
        }
    }

    /// Bricks that must stay online within one set before the set is
    /// considered to have lost quorum.
    pub fn quorum_brick_count(&self) -> u32 {
        match self {
            DurabilityProfile::DistributeOnly => 1,
            DurabilityProfile::Replicated { replica } => *replica / 2 + 1,
            DurabilityProfile::Dispersed { data, redundancy } => data + (redundancy + 1) / 2,
        }
    }

    /// Produces the brick-size search schedule for a volume that needs
    /// `total_size` logical bytes, largest brick first.
    pub fn brick_size_generator(&self, total_size: u64) -> BrickSizeSchedule {
        BrickSizeSchedule::new(*self, total_size)
    }
}

/// One candidate in a size search: `sets` brick sets of `brick_size` bytes
/// each, sufficient in aggregate to cover the volume's requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCandidate {
    pub sets: u32,
    pub brick_size: u64,
}

/// Iterator that halves the brick size and doubles the set count until the
/// candidate drops below [`MIN_BRICK_SIZE`], per the durability profile's
/// concrete schedule.
#[derive(Debug, Clone)]
pub struct BrickSizeSchedule {
    profile: DurabilityProfile,
    total_size: u64,
    next: Option<SizeCandidate>,
}

impl BrickSizeSchedule {
    fn new(profile: DurabilityProfile, total_size: u64) -> Self {
        let first = match profile {
            DurabilityProfile::DistributeOnly => SizeCandidate {
                sets: 1,
                brick_size: total_size,
            },
            DurabilityProfile::Replicated { .. } => SizeCandidate {
                sets: 1,
                brick_size: total_size,
            },
            DurabilityProfile::Dispersed { data, .. } => SizeCandidate {
                sets: 1,
                brick_size: total_size / data.max(1) as u64,
            },
        };
        Self {
            profile,
            total_size,
            next: Some(first),
        }
    }
}

impl Iterator for BrickSizeSchedule {
    type Item = SizeCandidate;

    fn next(&mut self) -> Option<SizeCandidate> {
        let current = self.next?;
        self.next = match self.profile {
            DurabilityProfile::DistributeOnly => None,
            DurabilityProfile::Replicated { .. } => {
                let shrunk = current.brick_size / 2;
                if shrunk < MIN_BRICK_SIZE {
                    None
                } else {
                    Some(SizeCandidate {
                        sets: current.sets * 2,
                        brick_size: shrunk,
                    })
                }
            }
            DurabilityProfile::Dispersed { data, .. } => {
                let shrunk = current.brick_size / 2;
                if shrunk < MIN_BRICK_SIZE {
                    None
                } else {
                    Some(SizeCandidate {
                        sets: current.sets * 2,
                        brick_size: shrunk,
                    })
                }
            }
        };
        let _ = self.total_size;
        Some(current)
    }
}
