pub mod expectations;
pub mod scene;

pub use expectations::{check_calls, CallExpectation};
pub use scene::{build_clip_scene, ClipScene, FAR_ORIGIN};
