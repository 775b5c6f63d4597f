//! World-space clip volumes (section planes) and the scene-wide set that orders them.

mod set;
mod volume;

pub use set::{ClipVolumeSet, StructuralHash};
pub use volume::{ClipVolume, ClipVolumeConfig, ClipVolumeEvent, ListenerId, DEFAULT_DIRECTION};
