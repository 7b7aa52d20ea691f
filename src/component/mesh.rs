use std::sync::Arc;

use crate::{md5anim::{AnimationLoopMode, MD5Animation}, md5mesh::MD5Mesh};

/// A skinned mesh instance, owning its current pose
pub struct Mesh {
    pub mesh: MD5Mesh
}

/// Plays an animation on the entity's mesh
pub struct MeshAnim {
    pub anim: Arc<MD5Animation>,
    pub loop_mode: AnimationLoopMode,
    /// Playback time in seconds
    pub time: f32,
}
