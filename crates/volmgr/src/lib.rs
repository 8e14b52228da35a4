pub mod driver;
pub mod replace;
pub mod util;

pub use driver::alloc_bricks_in_cluster;
pub use replace::replace_brick;

use uuid::Uuid;

/// Folds a v4 UUID into the `u64` seed the allocator ring sorts by. Used to
/// tie a generated [`common::BrickId`] to the allocator seed for the set it
/// names, so the seed really is "a new UUID", not a separately drawn one.
pub(crate) fn seed_from_uuid(id: &Uuid) -> u64 {
    let (hi, lo) = id.as_u64_pair();
    hi ^ lo
}

/// Scales a logical brick size by a volume's snapshot factor to get the
/// physical reservation a device is charged. Matches upstream's
/// `size * snapshotFactor` accounting (see `DESIGN.md` for the inflation-
/// vs-reservation resolution).
pub(crate) fn physical_size(logical_size: u64, snapshot_factor: f64) -> u64 {
    ((logical_size as f64) * snapshot_factor).round() as u64
}
