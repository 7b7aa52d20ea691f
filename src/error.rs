use thiserror::Error;

/// Enumeration of errors which can result from loading MD5 documents or posing a skeleton
#[derive(Error, Debug)]
pub enum MD5Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: exceeds maximum line length of {limit} bytes")]
    LineTooLong { line: usize, limit: usize },

    #[error("line {line}: cannot allocate {count} {what}")]
    AllocationError { line: usize, what: &'static str, count: i64 },

    #[error("line {line}: malformed {what} record: {text:?}")]
    MalformedRecord { line: usize, what: &'static str, text: String },

    #[error("line {line}: expected {declared} {what}, found {found}")]
    CountMismatch { line: usize, what: &'static str, declared: usize, found: usize },

    #[error("unexpected end of input inside {block} block")]
    UnexpectedEndOfInput { block: &'static str },

    #[error("frame index {index} out of range (frame count: {count})")]
    FrameIndexOutOfRange { index: i64, count: usize },

    #[error("joint {joint} has parent {parent}, parents must precede their children")]
    InvalidParent { joint: usize, parent: i32 },

    #[error("joint {joint} animates components {start}..{end}, frame has {count}")]
    InvalidJointChannels { joint: usize, start: usize, end: usize, count: usize },

    #[error("{what} {index} references {target} {reference}, only {count} exist")]
    InvalidReference { what: &'static str, index: usize, target: &'static str, reference: i64, count: usize },

    #[error("animation has {anim_joints} joints but skeleton has {skel_joints}")]
    SkeletonMismatch { anim_joints: usize, skel_joints: usize },

    #[error("invalid orientation axis ({x}, {y}, {z})")]
    InvalidOrientationAxis { x: f32, y: f32, z: f32 },
}
