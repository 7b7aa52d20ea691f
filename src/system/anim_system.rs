use hecs::World;

use crate::{component::mesh::{Mesh, MeshAnim}, md5pose::PoseEvaluator, TimeData};

// pose each animated mesh at the frame under its playback time
fn sk_anim_update(time: &TimeData, world: &mut World) {
    for (e, (mesh_anim, mesh)) in world.query_mut::<(&mut MeshAnim, &mut Mesh)>() {
        match mesh_anim.anim.frame_at_time(mesh_anim.time, mesh_anim.loop_mode) {
            Some(frame) => {
                // pose in the space the bind pose was loaded into
                let evaluator = PoseEvaluator::new(mesh.mesh.basis);
                match evaluator.evaluate(&mesh_anim.anim, frame, &mut mesh.mesh.current_pose) {
                    Ok(_) => {
                        mesh.mesh.current_animation_frame = frame;
                    }
                    Err(err) => {
                        log::warn!("Failed posing entity {:?} at frame {}: {}", e, frame, err);
                    }
                };
            }
            None => {
            }
        };

        mesh_anim.time += time.delta_time;
    }
}

/// System which advances skeletal animations & computes joint transforms
pub fn sk_anim_system_update(time: &TimeData, world: &mut World) {
    sk_anim_update(time, world);
}
