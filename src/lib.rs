extern crate glam;
extern crate hecs;

pub mod common;
pub mod error;
pub mod settings;
pub mod line_reader;
pub mod parse_utils;
pub mod md5anim;
pub mod md5mesh;
pub mod md5pose;
pub mod asset_loader;

pub mod component {
    pub mod mesh;
}

pub mod system {
    pub mod anim_system;
}

pub use error::MD5Error;
pub use settings::LoadSettings;
pub use md5anim::{AnimationLoopMode, MD5Animation};
pub use md5mesh::{MD5Mesh, MD5Skeleton};
pub use md5pose::{update_pose, PoseEvaluator};

/// Frame timing passed to systems
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeData {
    pub delta_time: f32,
    pub total_time: f32,
}
