//! On-disk layout of the backup volume.

pub mod generation;
pub mod mount;

pub use generation::{GenerationRing, Rotation};
pub use mount::is_mount_point;
