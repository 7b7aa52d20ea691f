use std::{fs::File, io::{BufRead, BufReader}, path::Path};

use glam::{Quat, Vec3};
use lazy_static::lazy_static;

use crate::{common::{aabb_aabb_intersects, unpack_quat}, error::MD5Error, line_reader::LineReader, parse_utils::{alloc_exact, is_block_end, parse_floats, RecordPattern}, settings::LoadSettings};

lazy_static! {
    static ref VERSION: RecordPattern = RecordPattern::new("MD5Version %d");
    static ref COMMANDLINE: RecordPattern = RecordPattern::new("commandline %s");
    static ref NUM_FRAMES: RecordPattern = RecordPattern::new("numFrames %d");
    static ref NUM_JOINTS: RecordPattern = RecordPattern::new("numJoints %d");
    static ref FRAME_RATE: RecordPattern = RecordPattern::new("frameRate %d");
    static ref NUM_ANIMATED_COMPONENTS: RecordPattern = RecordPattern::new("numAnimatedComponents %d");
    static ref HIERARCHY: RecordPattern = RecordPattern::new("hierarchy {");
    static ref BOUNDS: RecordPattern = RecordPattern::new("bounds {");
    static ref BASEFRAME: RecordPattern = RecordPattern::new("baseframe {");
    static ref FRAME: RecordPattern = RecordPattern::new("frame %d {");
    static ref HIERARCHY_JOINT: RecordPattern = RecordPattern::new("%s %d %d %d");
    static ref VEC3_PAIR: RecordPattern = RecordPattern::new("( %f %f %f ) ( %f %f %f )");
}

/// Set of joint components which change from frame to frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnimFlags(pub u8);

impl AnimFlags {
    pub const XPOS: AnimFlags = AnimFlags(1);
    pub const YPOS: AnimFlags = AnimFlags(2);
    pub const ZPOS: AnimFlags = AnimFlags(4);
    pub const XQUAT: AnimFlags = AnimFlags(8);
    pub const YQUAT: AnimFlags = AnimFlags(16);
    pub const ZQUAT: AnimFlags = AnimFlags(32);

    pub const ALL: AnimFlags = AnimFlags(63);

    /// Component flags in the order their values appear in a frame
    pub const ORDER: [AnimFlags;6] = [
        AnimFlags::XPOS, AnimFlags::YPOS, AnimFlags::ZPOS,
        AnimFlags::XQUAT, AnimFlags::YQUAT, AnimFlags::ZQUAT,
    ];

    pub fn contains(self: &Self, other: AnimFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Number of animated components
    pub fn count(self: &Self) -> usize {
        self.0.count_ones() as usize
    }
}

/// Represents a joint of the animation hierarchy
#[derive(Clone, Debug)]
pub struct MD5AnimJoint {
    pub name: String,
    /// Index of the parent joint, negative for a root
    pub parent: i32,
    pub flags: AnimFlags,
    /// Offset of this joint's first animated component in each frame
    pub frame_index: usize,
}

/// Bounding box of a single frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MD5Bound {
    pub min: Vec3,
    pub max: Vec3,
}

impl MD5Bound {
    pub fn contains(self: &Self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn intersects(self: &Self, other: &MD5Bound) -> bool {
        aabb_aabb_intersects(self.min, self.max, other.min, other.max)
    }
}

/// Default local position & orientation of each joint
#[derive(Clone, Debug, Default)]
pub struct MD5BaseFrame {
    pub positions: Vec<Vec3>,
    pub orientations: Vec<Quat>,
}

/// Animated component values of a single frame
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MD5Frame {
    pub data: Vec<f32>,
}

/// How a playback time past the end of an animation maps to a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationLoopMode {
    Once,
    Loop,
}

/// An animation loaded from an MD5 animation file
#[derive(Clone, Debug, Default)]
pub struct MD5Animation {
    pub version: Option<i64>,
    pub commandline: Option<String>,
    pub frame_rate: u32,
    pub num_joints: usize,
    pub num_frames: usize,
    pub num_animated_components: usize,
    pub joints: Vec<MD5AnimJoint>,
    pub base_frame: MD5BaseFrame,
    pub bounds: Vec<MD5Bound>,
    pub frames: Vec<MD5Frame>,
}

fn malformed<R: BufRead>(reader: &LineReader<R>, what: &'static str, text: &str) -> MD5Error {
    MD5Error::MalformedRecord { line: reader.line_number(), what, text: text.to_owned() }
}

fn read_hierarchy<R: BufRead>(reader: &mut LineReader<R>, declared: usize, joints: &mut Vec<MD5AnimJoint>) -> Result<(), MD5Error> {
    joints.clear();

    loop {
        let line = reader.next_in_block("hierarchy")?;

        if is_block_end(&line) {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let mut rec = match HIERARCHY_JOINT.scan(&line) {
            Some(v) => v,
            None => return Err(malformed(reader, "hierarchy joint", &line))
        };

        if joints.len() >= declared {
            return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "hierarchy joints", declared, found: joints.len() + 1 });
        }

        let index = joints.len();

        let parent = match i32::try_from(rec.int(0)) {
            Ok(v) => v,
            Err(_) => return Err(malformed(reader, "hierarchy joint", &line))
        };
        if parent >= 0 && parent as usize >= index {
            return Err(MD5Error::InvalidParent { joint: index, parent });
        }

        let flags = match u8::try_from(rec.int(1)) {
            Ok(v) if v <= AnimFlags::ALL.0 => AnimFlags(v),
            _ => return Err(malformed(reader, "hierarchy joint", &line))
        };

        let frame_index = match usize::try_from(rec.int(2)) {
            Ok(v) => v,
            Err(_) => return Err(malformed(reader, "hierarchy joint", &line))
        };

        joints.push(MD5AnimJoint {
            name: rec.take_string(0),
            parent,
            flags,
            frame_index,
        });
    }

    if joints.len() != declared {
        return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "hierarchy joints", declared, found: joints.len() });
    }

    log::debug!("hierarchy: {} joints", joints.len());
    return Ok(());
}

fn read_bounds<R: BufRead>(reader: &mut LineReader<R>, declared: usize, bounds: &mut Vec<MD5Bound>) -> Result<(), MD5Error> {
    bounds.clear();

    loop {
        let line = reader.next_in_block("bounds")?;

        if is_block_end(&line) {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let rec = match VEC3_PAIR.scan(&line) {
            Some(v) => v,
            None => return Err(malformed(reader, "bound", &line))
        };

        // there is a bound for each frame of the animation
        if bounds.len() >= declared {
            return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "bounds", declared, found: bounds.len() + 1 });
        }

        bounds.push(MD5Bound {
            min: rec.vec3(0),
            max: rec.vec3(3),
        });
    }

    if bounds.len() != declared {
        return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "bounds", declared, found: bounds.len() });
    }

    log::debug!("bounds: {} frames", bounds.len());
    return Ok(());
}

fn read_base_frame<R: BufRead>(reader: &mut LineReader<R>, declared: usize, base_frame: &mut MD5BaseFrame) -> Result<(), MD5Error> {
    base_frame.positions.clear();
    base_frame.orientations.clear();

    loop {
        let line = reader.next_in_block("baseframe")?;

        if is_block_end(&line) {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let rec = match VEC3_PAIR.scan(&line) {
            Some(v) => v,
            None => return Err(malformed(reader, "base frame joint", &line))
        };

        if base_frame.positions.len() >= declared {
            return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "base frame joints", declared, found: base_frame.positions.len() + 1 });
        }

        base_frame.positions.push(rec.vec3(0));
        base_frame.orientations.push(unpack_quat(rec.vec3(3))?);
    }

    if base_frame.positions.len() != declared {
        return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "base frame joints", declared, found: base_frame.positions.len() });
    }

    return Ok(());
}

fn read_frame<R: BufRead>(reader: &mut LineReader<R>, declared: usize) -> Result<MD5Frame, MD5Error> {
    let mut data: Vec<f32> = alloc_exact(declared as i64, "frame components", reader.line_number())?;

    loop {
        let line = reader.next_in_block("frame")?;

        if is_block_end(&line) {
            break;
        }

        // a frame's values may span several lines
        let values = match parse_floats(&line) {
            Ok(v) => v,
            Err(token) => return Err(malformed(reader, "frame component", token))
        };

        for v in values {
            if data.len() >= declared {
                return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "frame components", declared, found: data.len() + 1 });
            }
            data.push(v);
        }
    }

    if data.len() != declared {
        return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "frame components", declared, found: data.len() });
    }

    return Ok(MD5Frame { data });
}

fn declared_count<R: BufRead>(reader: &LineReader<R>, value: i64, what: &'static str) -> Result<usize, MD5Error> {
    match usize::try_from(value) {
        Ok(v) => Ok(v),
        Err(_) => Err(MD5Error::AllocationError { line: reader.line_number(), what, count: value })
    }
}

impl MD5Animation {
    pub fn from_file<P: AsRef<Path>>(path: P, settings: &LoadSettings) -> Result<MD5Animation, MD5Error> {
        let file = File::open(path)?;
        MD5Animation::new(BufReader::new(file), settings)
    }

    pub fn new<R: BufRead>(reader: R, settings: &LoadSettings) -> Result<MD5Animation, MD5Error> {
        let mut reader = LineReader::new(reader, settings.max_line_length);

        let mut anim = MD5Animation::default();

        // slots for frame blocks, which may appear in any order
        let mut frame_slots: Vec<Option<MD5Frame>> = Vec::new();
        let mut loaded_frames = 0;

        while let Some(line) = reader.next() {
            let line = line?;

            if line.is_empty() {
                continue;
            }

            if let Some(rec) = VERSION.scan(&line) {
                anim.version = Some(rec.int(0));
            }
            else if let Some(mut rec) = COMMANDLINE.scan(&line) {
                anim.commandline = Some(rec.take_string(0));
            }
            else if let Some(rec) = NUM_FRAMES.scan(&line) {
                // alloc frames, same for bounds
                frame_slots = alloc_exact(rec.int(0), "frames", reader.line_number())?;
                anim.bounds = alloc_exact(rec.int(0), "bounds", reader.line_number())?;
                anim.num_frames = declared_count(&reader, rec.int(0), "frames")?;
                frame_slots.resize_with(anim.num_frames, || None);
                loaded_frames = 0;
            }
            else if let Some(rec) = NUM_JOINTS.scan(&line) {
                anim.joints = alloc_exact(rec.int(0), "joints", reader.line_number())?;
                anim.base_frame.positions = alloc_exact(rec.int(0), "base frame positions", reader.line_number())?;
                anim.base_frame.orientations = alloc_exact(rec.int(0), "base frame orientations", reader.line_number())?;
                anim.num_joints = declared_count(&reader, rec.int(0), "joints")?;
            }
            else if let Some(rec) = FRAME_RATE.scan(&line) {
                anim.frame_rate = match u32::try_from(rec.int(0)) {
                    Ok(v) => v,
                    Err(_) => return Err(malformed(&reader, "frame rate", &line))
                };
            }
            else if let Some(rec) = NUM_ANIMATED_COMPONENTS.scan(&line) {
                anim.num_animated_components = declared_count(&reader, rec.int(0), "animated components")?;
            }
            else if HIERARCHY.scan(&line).is_some() {
                read_hierarchy(&mut reader, anim.num_joints, &mut anim.joints)?;
            }
            else if BOUNDS.scan(&line).is_some() {
                read_bounds(&mut reader, anim.num_frames, &mut anim.bounds)?;
            }
            else if BASEFRAME.scan(&line).is_some() {
                read_base_frame(&mut reader, anim.num_joints, &mut anim.base_frame)?;
            }
            else if let Some(rec) = FRAME.scan(&line) {
                let index = rec.int(0);
                if index < 0 || index as usize >= anim.num_frames {
                    return Err(MD5Error::FrameIndexOutOfRange { index, count: anim.num_frames });
                }

                let frame = read_frame(&mut reader, anim.num_animated_components)?;

                // NOTE: only the number of frame blocks is checked, not that every index shows up once
                if frame_slots[index as usize].is_some() {
                    log::warn!("frame {} appears more than once, keeping the last one", index);
                }
                frame_slots[index as usize] = Some(frame);
                loaded_frames += 1;
            }
            // version & commandline are informational, a bad one is skipped like any unknown line
            else if [&*NUM_FRAMES, &*NUM_JOINTS, &*FRAME_RATE, &*NUM_ANIMATED_COMPONENTS, &*FRAME]
                .iter().any(|p| p.claims(&line))
            {
                return Err(malformed(&reader, "declaration", &line));
            }
        }

        if loaded_frames != anim.num_frames {
            return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "frames", declared: anim.num_frames, found: loaded_frames });
        }

        let num_components = anim.num_animated_components;
        anim.frames = frame_slots.into_iter()
            .map(|f| f.unwrap_or_else(|| MD5Frame { data: vec![0.0;num_components] }))
            .collect();

        anim.validate(reader.line_number())?;

        log::debug!("animation: {} joints, {} frames @ {} fps", anim.num_joints, anim.num_frames, anim.frame_rate);
        return Ok(anim);
    }

    /// Check that the document is internally consistent
    fn validate(self: &Self, line: usize) -> Result<(), MD5Error> {
        if self.joints.len() != self.num_joints {
            return Err(MD5Error::CountMismatch { line, what: "hierarchy joints", declared: self.num_joints, found: self.joints.len() });
        }
        if self.base_frame.positions.len() != self.num_joints {
            return Err(MD5Error::CountMismatch { line, what: "base frame joints", declared: self.num_joints, found: self.base_frame.positions.len() });
        }
        if self.bounds.len() != self.num_frames {
            return Err(MD5Error::CountMismatch { line, what: "bounds", declared: self.num_frames, found: self.bounds.len() });
        }

        for frame in &self.frames {
            if frame.data.len() != self.num_animated_components {
                return Err(MD5Error::CountMismatch { line, what: "frame components", declared: self.num_animated_components, found: frame.data.len() });
            }
        }

        let mut total = 0;
        for (i, joint) in self.joints.iter().enumerate() {
            let end = joint.frame_index + joint.flags.count();
            if end > self.num_animated_components {
                return Err(MD5Error::InvalidJointChannels { joint: i, start: joint.frame_index, end, count: self.num_animated_components });
            }
            total += joint.flags.count();
        }

        if total != self.num_animated_components {
            return Err(MD5Error::CountMismatch { line, what: "animated components", declared: self.num_animated_components, found: total });
        }

        Ok(())
    }

    /// Length of the animation in seconds
    pub fn duration(self: &Self) -> f32 {
        if self.frame_rate == 0 {
            return 0.0;
        }
        self.num_frames as f32 / self.frame_rate as f32
    }

    /// Frame shown at `time` seconds into playback. There is no interpolation: time is snapped down to a whole frame.
    pub fn frame_at_time(self: &Self, time: f32, loop_mode: AnimationLoopMode) -> Option<usize> {
        if self.num_frames == 0 {
            return None;
        }

        let frame = (time as f64 * self.frame_rate as f64).floor() as i64;
        let count = self.num_frames as i64;

        let frame = match loop_mode {
            AnimationLoopMode::Loop => frame.rem_euclid(count),
            AnimationLoopMode::Once => frame.clamp(0, count - 1),
        };

        Some(frame as usize)
    }

    pub fn joint_index(self: &Self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }
}
