use glam::{Mat4, Quat, Vec3};

use crate::{common::{unpack_quat, BASIS_CONVERSION}, error::MD5Error, md5anim::{AnimFlags, MD5Animation}, md5mesh::{MD5Mesh, MD5Skeleton}};

struct PosedJoint {
    parent: i32,
    position: Vec3,
    orientation: Quat,
    transform: Mat4,
}

/// Computes skeleton poses from animation frames
///
/// Joints are visited in index order, so each joint's parent already has its world transform when the joint is
/// reached. Root joints are moved into render space by the basis conversion; every other joint inherits it from its
/// parent.
#[derive(Clone, Copy, Debug)]
pub struct PoseEvaluator {
    basis: Mat4,
}

impl Default for PoseEvaluator {
    fn default() -> PoseEvaluator {
        PoseEvaluator::new(BASIS_CONVERSION)
    }
}

impl PoseEvaluator {
    pub fn new(basis: Mat4) -> PoseEvaluator {
        PoseEvaluator {
            basis
        }
    }

    pub fn basis(self: &Self) -> Mat4 {
        self.basis
    }

    /// Pose `skeleton` with frame `frame` of `anim`.
    ///
    /// On error the skeleton is left untouched. Not thread safe for a shared skeleton: callers must serialize access.
    pub fn evaluate(self: &Self, anim: &MD5Animation, frame: usize, skeleton: &mut MD5Skeleton) -> Result<(), MD5Error> {
        let num_joints = skeleton.joints.len();

        if anim.num_joints != num_joints
            || anim.joints.len() != num_joints
            || anim.base_frame.positions.len() != num_joints
            || anim.base_frame.orientations.len() != num_joints
        {
            // animation does not apply to this skeleton
            return Err(MD5Error::SkeletonMismatch { anim_joints: anim.num_joints, skel_joints: num_joints });
        }

        let frame_data = match anim.frames.get(frame) {
            Some(v) => &v.data,
            None => return Err(MD5Error::FrameIndexOutOfRange { index: frame as i64, count: anim.frames.len() })
        };

        let mut posed: Vec<PosedJoint> = Vec::with_capacity(num_joints);

        for (i, joint) in anim.joints.iter().enumerate() {
            let mut position = anim.base_frame.positions[i];
            let mut axis = anim.base_frame.orientations[i].xyz();

            let start = joint.frame_index;
            let end = start + joint.flags.count();
            let mut values = match frame_data.get(start..end) {
                Some(v) => v.iter(),
                None => return Err(MD5Error::InvalidJointChannels { joint: i, start, end, count: frame_data.len() })
            };

            // overwrite the animated components, in frame order
            for (c, flag) in AnimFlags::ORDER.iter().enumerate() {
                if !joint.flags.contains(*flag) {
                    continue;
                }

                let v = match values.next() {
                    Some(v) => *v,
                    None => break
                };

                match c {
                    0 => position.x = v,
                    1 => position.y = v,
                    2 => position.z = v,
                    3 => axis.x = v,
                    4 => axis.y = v,
                    _ => axis.z = v,
                }
            }

            let orientation = unpack_quat(axis)?;
            let local = Mat4::from_rotation_translation(orientation, position);

            let transform = if joint.parent < 0 {
                self.basis * local
            } else {
                // basis conversion is already part of the parent's transform
                match posed.get(joint.parent as usize) {
                    Some(parent) if (joint.parent as usize) < i => parent.transform * local,
                    _ => return Err(MD5Error::InvalidParent { joint: i, parent: joint.parent })
                }
            };

            posed.push(PosedJoint {
                parent: joint.parent,
                position,
                orientation,
                transform,
            });
        }

        for (dst, src) in skeleton.joints.iter_mut().zip(posed) {
            dst.parent = src.parent;
            dst.position = src.position;
            dst.orientation = src.orientation;
            dst.transform = src.transform;
        }

        return Ok(());
    }
}

/// Update the current pose of `mesh` to frame `frame` of `anim`, in the same space as its bind pose
pub fn update_pose(mesh: &mut MD5Mesh, anim: &MD5Animation, frame: usize) -> Result<(), MD5Error> {
    PoseEvaluator::new(mesh.basis).evaluate(anim, frame, &mut mesh.current_pose)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{md5anim::{MD5AnimJoint, MD5BaseFrame, MD5Bound, MD5Frame}, md5mesh::MD5Joint, settings::LoadSettings};

    // absolute bind pose of a two joint rig
    const RIG_MESH: &str = "numJoints 2
numMeshes 0
joints {
\t\"root\"\t-1 ( 1 2 3 ) ( 0 0 0 )
\t\"tip\"\t0 ( 1 2 4 ) ( 0 0 0.5 )
}
";

    // one frame holding the same pose, relative to each parent
    const RIG_ANIM: &str = "numFrames 1
numJoints 2
frameRate 24
numAnimatedComponents 0
hierarchy {
\t\"root\"\t-1 0 0
\t\"tip\"\t0 0 0
}
bounds {
\t( 0 0 0 ) ( 1 1 1 )
}
baseframe {
\t( 1 2 3 ) ( 0 0 0 )
\t( 0 0 1 ) ( 0 0 0.5 )
}
frame 0 {
}
";

    fn two_joint_anim(child_flags: AnimFlags, frames: Vec<Vec<f32>>) -> MD5Animation {
        let child_quat = unpack_quat(Vec3::new(0.0, 0.0, 0.5)).unwrap();
        let num_components = child_flags.count();

        MD5Animation {
            frame_rate: 24,
            num_joints: 2,
            num_frames: frames.len(),
            num_animated_components: num_components,
            joints: vec![
                MD5AnimJoint { name: "root".to_owned(), parent: -1, flags: AnimFlags(0), frame_index: 0 },
                MD5AnimJoint { name: "child".to_owned(), parent: 0, flags: child_flags, frame_index: 0 },
            ],
            base_frame: MD5BaseFrame {
                positions: vec![Vec3::ZERO, Vec3::ZERO],
                orientations: vec![Quat::IDENTITY, child_quat],
            },
            bounds: vec![MD5Bound { min: Vec3::ZERO, max: Vec3::ONE };frames.len()],
            frames: frames.into_iter().map(|data| MD5Frame { data }).collect(),
            ..Default::default()
        }
    }

    fn skeleton(num_joints: usize) -> MD5Skeleton {
        MD5Skeleton {
            joints: (0..num_joints).map(|i| MD5Joint {
                name: format!("joint{}", i),
                parent: i as i32 - 1,
                position: Vec3::ZERO,
                orientation: Quat::IDENTITY,
                transform: Mat4::IDENTITY,
            }).collect()
        }
    }

    #[test]
    fn animates_child_position() {
        let anim = two_joint_anim(AnimFlags::XPOS, vec![vec![5.0]]);
        let mut skel = skeleton(2);

        PoseEvaluator::default().evaluate(&anim, 0, &mut skel).unwrap();

        let child = &skel.joints[1];
        assert_eq!(child.position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(child.orientation, anim.base_frame.orientations[1]);

        let expected = skel.joints[0].transform * Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)) * Mat4::from_quat(anim.base_frame.orientations[1]);
        assert_abs_diff_eq!(child.transform, expected, epsilon = 1e-6);
    }

    #[test]
    fn basis_only_applied_to_roots() {
        let anim = two_joint_anim(AnimFlags::XPOS, vec![vec![5.0]]);
        let mut skel = skeleton(2);

        PoseEvaluator::default().evaluate(&anim, 0, &mut skel).unwrap();

        assert_eq!(skel.joints[0].transform, BASIS_CONVERSION);
        // child origin ends up at x = -5 in render space, not converted twice
        let origin = skel.joints[1].transform.transform_point3(Vec3::ZERO);
        assert_abs_diff_eq!(origin, Vec3::new(-5.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn injected_basis() {
        let anim = two_joint_anim(AnimFlags::XPOS, vec![vec![5.0]]);
        let mut skel = skeleton(2);

        let evaluator = PoseEvaluator::new(Mat4::IDENTITY);
        evaluator.evaluate(&anim, 0, &mut skel).unwrap();

        assert_eq!(evaluator.basis(), Mat4::IDENTITY);
        assert_eq!(skel.joints[0].transform, Mat4::IDENTITY);
        assert_abs_diff_eq!(skel.joints[1].transform.transform_point3(Vec3::ZERO), Vec3::new(5.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn animates_rotation_channels() {
        // only y & z of the axis are animated, x comes from the base frame
        let anim = two_joint_anim(AnimFlags(AnimFlags::YQUAT.0 | AnimFlags::ZQUAT.0), vec![vec![0.0, 0.0], vec![0.6, 0.0]]);
        let mut skel = skeleton(2);
        let evaluator = PoseEvaluator::default();

        evaluator.evaluate(&anim, 0, &mut skel).unwrap();
        assert_eq!(skel.joints[1].orientation, Quat::IDENTITY);

        evaluator.evaluate(&anim, 1, &mut skel).unwrap();
        assert_abs_diff_eq!(skel.joints[1].orientation, Quat::from_xyzw(0.0, 0.6, 0.0, 0.8), epsilon = 1e-6);
    }

    #[test]
    fn mismatched_skeleton_is_untouched() {
        let anim = two_joint_anim(AnimFlags::XPOS, vec![vec![5.0]]);
        let mut skel = skeleton(3);
        let before = skel.clone();

        let res = PoseEvaluator::default().evaluate(&anim, 0, &mut skel);
        assert!(matches!(res, Err(MD5Error::SkeletonMismatch { anim_joints: 2, skel_joints: 3 })));
        assert_eq!(skel, before);
    }

    #[test]
    fn frame_out_of_range() {
        let anim = two_joint_anim(AnimFlags::XPOS, vec![vec![5.0]]);
        let mut skel = skeleton(2);
        let before = skel.clone();

        let res = PoseEvaluator::default().evaluate(&anim, 1, &mut skel);
        assert!(matches!(res, Err(MD5Error::FrameIndexOutOfRange { index: 1, count: 1 })));
        assert_eq!(skel, before);
    }

    #[test]
    fn bad_frame_data_leaves_pose_untouched() {
        let anim = two_joint_anim(AnimFlags::XQUAT, vec![vec![f32::NAN]]);
        let mut skel = skeleton(2);
        let before = skel.clone();

        let res = PoseEvaluator::default().evaluate(&anim, 0, &mut skel);
        assert!(matches!(res, Err(MD5Error::InvalidOrientationAxis { .. })));
        assert_eq!(skel, before);
    }

    #[test]
    fn evaluation_is_repeatable() {
        let anim = two_joint_anim(AnimFlags::ALL, vec![vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3], vec![0.0;6]]);
        let mut skel = skeleton(2);
        let evaluator = PoseEvaluator::default();

        evaluator.evaluate(&anim, 0, &mut skel).unwrap();
        let first = skel.clone();

        evaluator.evaluate(&anim, 1, &mut skel).unwrap();
        assert_ne!(skel, first);

        evaluator.evaluate(&anim, 0, &mut skel).unwrap();
        assert_eq!(skel, first);
    }

    #[test]
    fn poses_in_the_bind_pose_basis() {
        let bases = [Mat4::IDENTITY, BASIS_CONVERSION, Mat4::from_rotation_y(0.5) * Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))];

        for basis in bases {
            let settings = LoadSettings::default().with_basis_conversion(basis);
            let mut mesh = MD5Mesh::new(RIG_MESH.as_bytes(), &settings).unwrap();
            let anim = MD5Animation::new(RIG_ANIM.as_bytes(), &settings).unwrap();

            update_pose(&mut mesh, &anim, 0).unwrap();

            for (posed, bind) in mesh.current_pose.joints.iter().zip(&mesh.bind_pose.joints) {
                assert_abs_diff_eq!(posed.transform, bind.transform, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn keeps_joint_names() {
        let anim = two_joint_anim(AnimFlags::XPOS, vec![vec![5.0]]);
        let mut mesh = MD5Mesh { current_pose: skeleton(2), ..Default::default() };

        update_pose(&mut mesh, &anim, 0).unwrap();

        assert_eq!(mesh.current_pose.joints[1].name, "joint1");
        assert_eq!(mesh.current_pose.joints[1].parent, 0);
        assert_eq!(mesh.current_pose.joints[0].parent, -1);
    }
}
