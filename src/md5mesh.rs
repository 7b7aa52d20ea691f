use std::{fs::File, io::{BufRead, BufReader}, path::Path};

use glam::{Mat4, Quat, Vec2, Vec3};
use lazy_static::lazy_static;

use crate::{common::{unpack_quat, BASIS_CONVERSION}, error::MD5Error, line_reader::LineReader, parse_utils::{alloc_exact, is_block_end, RecordPattern}, settings::LoadSettings};

lazy_static! {
    static ref VERSION: RecordPattern = RecordPattern::new("MD5Version %d");
    static ref COMMANDLINE: RecordPattern = RecordPattern::new("commandline %s");
    static ref NUM_JOINTS: RecordPattern = RecordPattern::new("numJoints %d");
    static ref NUM_MESHES: RecordPattern = RecordPattern::new("numMeshes %d");
    static ref JOINTS: RecordPattern = RecordPattern::new("joints {");
    static ref MESH: RecordPattern = RecordPattern::new("mesh {");
    static ref JOINT: RecordPattern = RecordPattern::new("%s %d ( %f %f %f ) ( %f %f %f )");
    static ref SHADER: RecordPattern = RecordPattern::new("shader %s");
    static ref NUM_VERTS: RecordPattern = RecordPattern::new("numverts %d");
    static ref VERT: RecordPattern = RecordPattern::new("vert %d ( %f %f ) %d %d");
    static ref NUM_TRIS: RecordPattern = RecordPattern::new("numtris %d");
    static ref TRI: RecordPattern = RecordPattern::new("tri %d %d %d %d");
    static ref NUM_WEIGHTS: RecordPattern = RecordPattern::new("numweights %d");
    static ref WEIGHT: RecordPattern = RecordPattern::new("weight %d %d %f ( %f %f %f )");
}

/// Represents a single joint of a mesh skeleton
#[derive(Clone, Debug, PartialEq)]
pub struct MD5Joint {
    pub name: String,
    /// Index of the parent joint, negative for a root
    pub parent: i32,
    /// Position relative to the parent
    pub position: Vec3,
    /// Orientation relative to the parent
    pub orientation: Quat,
    /// World transform, in render space
    pub transform: Mat4,
}

/// Represents the joints of a mesh in one pose
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MD5Skeleton {
    pub joints: Vec<MD5Joint>,
}

impl MD5Skeleton {
    pub fn num_joints(self: &Self) -> usize {
        self.joints.len()
    }

    pub fn joint_index(self: &Self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }
}

/// Represents a vertex of a sub-mesh. Its position is given by a range of the sub-mesh's weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MD5Vertex {
    pub id: i64,
    pub tex_coords: Vec2,
    /// First weight of this vertex
    pub weight_index: usize,
    pub weight_count: usize,
}

/// Represents a triangle of a sub-mesh
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MD5Face {
    pub id: i64,
    pub indices: [usize;3],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MD5Weight {
    pub id: i64,
    pub joint_index: usize,
    pub value: f32,
    /// Offset from the joint, in joint space
    pub position: Vec3,
}

/// Represents a sub-mesh loaded from an MD5 mesh file
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MD5SubMesh {
    pub shader: String,
    pub vertices: Vec<MD5Vertex>,
    pub faces: Vec<MD5Face>,
    pub weights: Vec<MD5Weight>,
}

impl MD5SubMesh {
    /// Compute the position of every vertex in the given pose.
    /// Weights which refer to joints missing from `skeleton` are ignored.
    pub fn skin_positions(self: &Self, skeleton: &MD5Skeleton) -> Vec<Vec3> {
        let mut positions = Vec::with_capacity(self.vertices.len());

        for vtx in &self.vertices {
            let end = (vtx.weight_index + vtx.weight_count).min(self.weights.len());
            let start = vtx.weight_index.min(end);

            let mut pos = Vec3::ZERO;
            for weight in &self.weights[start..end] {
                if let Some(joint) = skeleton.joints.get(weight.joint_index) {
                    pos += joint.transform.transform_point3(weight.position) * weight.value;
                }
            }

            positions.push(pos);
        }

        positions
    }
}

/// A mesh loaded from an MD5 mesh file
#[derive(Clone, Debug)]
pub struct MD5Mesh {
    pub version: Option<i64>,
    pub commandline: Option<String>,
    /// Last animation frame applied by playback. Informational only.
    pub current_animation_frame: usize,
    /// Basis conversion baked into the bind pose. Poses must be evaluated with the same one.
    pub basis: Mat4,
    pub bind_pose: MD5Skeleton,
    pub current_pose: MD5Skeleton,
    pub meshes: Vec<MD5SubMesh>,
}

impl Default for MD5Mesh {
    fn default() -> MD5Mesh {
        MD5Mesh {
            version: None,
            commandline: None,
            current_animation_frame: 0,
            basis: BASIS_CONVERSION,
            bind_pose: MD5Skeleton::default(),
            current_pose: MD5Skeleton::default(),
            meshes: Vec::new(),
        }
    }
}

fn malformed<R: BufRead>(reader: &LineReader<R>, what: &'static str, text: &str) -> MD5Error {
    MD5Error::MalformedRecord { line: reader.line_number(), what, text: text.to_owned() }
}

fn to_index<R: BufRead>(reader: &LineReader<R>, value: i64, what: &'static str, text: &str) -> Result<usize, MD5Error> {
    match usize::try_from(value) {
        Ok(v) => Ok(v),
        Err(_) => Err(malformed(reader, what, text))
    }
}

fn read_joints<R: BufRead>(reader: &mut LineReader<R>, declared: usize, basis: Mat4, joints: &mut Vec<MD5Joint>) -> Result<(), MD5Error> {
    joints.clear();

    loop {
        let line = reader.next_in_block("joints")?;

        if is_block_end(&line) {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let mut rec = match JOINT.scan(&line) {
            Some(v) => v,
            None => return Err(malformed(reader, "joint", &line))
        };

        if joints.len() >= declared {
            return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "joints", declared, found: joints.len() + 1 });
        }

        let index = joints.len();

        let parent = match i32::try_from(rec.int(0)) {
            Ok(v) => v,
            Err(_) => return Err(malformed(reader, "joint", &line))
        };
        if parent >= 0 && parent as usize >= index {
            return Err(MD5Error::InvalidParent { joint: index, parent });
        }

        let position = rec.vec3(0);
        let orientation = unpack_quat(rec.vec3(3))?;

        // bind pose transforms are absolute, each one is converted to render space on its own
        let transform = basis * Mat4::from_rotation_translation(orientation, position);

        joints.push(MD5Joint {
            name: rec.take_string(0),
            parent,
            position,
            orientation,
            transform,
        });
    }

    if joints.len() != declared {
        return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "joints", declared, found: joints.len() });
    }

    log::debug!("joints: {} loaded", joints.len());
    return Ok(());
}

fn read_sub_mesh<R: BufRead>(reader: &mut LineReader<R>) -> Result<MD5SubMesh, MD5Error> {
    let mut mesh = MD5SubMesh::default();

    let mut num_vertices = 0;
    let mut num_faces = 0;
    let mut num_weights = 0;

    loop {
        let line = reader.next_in_block("mesh")?;

        if is_block_end(&line) {
            break;
        }
        if line.is_empty() {
            continue;
        }

        if let Some(mut rec) = SHADER.scan(&line) {
            mesh.shader = rec.take_string(0);
        }
        else if let Some(rec) = NUM_VERTS.scan(&line) {
            mesh.vertices = alloc_exact(rec.int(0), "vertices", reader.line_number())?;
            num_vertices = rec.int(0) as usize;
        }
        else if let Some(rec) = VERT.scan(&line) {
            if mesh.vertices.len() >= num_vertices {
                return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "vertices", declared: num_vertices, found: mesh.vertices.len() + 1 });
            }

            mesh.vertices.push(MD5Vertex {
                id: rec.int(0),
                tex_coords: rec.vec2(0),
                weight_index: to_index(reader, rec.int(1), "vertex", &line)?,
                weight_count: to_index(reader, rec.int(2), "vertex", &line)?,
            });
        }
        else if let Some(rec) = NUM_TRIS.scan(&line) {
            mesh.faces = alloc_exact(rec.int(0), "triangles", reader.line_number())?;
            num_faces = rec.int(0) as usize;
        }
        else if let Some(rec) = TRI.scan(&line) {
            if mesh.faces.len() >= num_faces {
                return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "triangles", declared: num_faces, found: mesh.faces.len() + 1 });
            }

            mesh.faces.push(MD5Face {
                id: rec.int(0),
                indices: [
                    to_index(reader, rec.int(1), "triangle", &line)?,
                    to_index(reader, rec.int(2), "triangle", &line)?,
                    to_index(reader, rec.int(3), "triangle", &line)?,
                ],
            });
        }
        else if let Some(rec) = NUM_WEIGHTS.scan(&line) {
            mesh.weights = alloc_exact(rec.int(0), "weights", reader.line_number())?;
            num_weights = rec.int(0) as usize;
        }
        else if let Some(rec) = WEIGHT.scan(&line) {
            if mesh.weights.len() >= num_weights {
                return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "weights", declared: num_weights, found: mesh.weights.len() + 1 });
            }

            mesh.weights.push(MD5Weight {
                id: rec.int(0),
                joint_index: to_index(reader, rec.int(1), "weight", &line)?,
                value: rec.float(0),
                position: rec.vec3(1),
            });
        }
        else if [&*SHADER, &*NUM_VERTS, &*VERT, &*NUM_TRIS, &*TRI, &*NUM_WEIGHTS, &*WEIGHT].iter().any(|p| p.claims(&line)) {
            return Err(malformed(reader, "mesh", &line));
        }
    }

    // check if all vertices, triangles and weights were loaded
    if mesh.vertices.len() != num_vertices {
        return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "vertices", declared: num_vertices, found: mesh.vertices.len() });
    }
    if mesh.faces.len() != num_faces {
        return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "triangles", declared: num_faces, found: mesh.faces.len() });
    }
    if mesh.weights.len() != num_weights {
        return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "weights", declared: num_weights, found: mesh.weights.len() });
    }

    log::debug!("mesh '{}': {} vertices, {} triangles, {} weights", mesh.shader, num_vertices, num_faces, num_weights);
    return Ok(mesh);
}

impl MD5Mesh {
    pub fn from_file<P: AsRef<Path>>(path: P, settings: &LoadSettings) -> Result<MD5Mesh, MD5Error> {
        let file = File::open(path)?;
        MD5Mesh::new(BufReader::new(file), settings)
    }

    pub fn new<R: BufRead>(reader: R, settings: &LoadSettings) -> Result<MD5Mesh, MD5Error> {
        let mut reader = LineReader::new(reader, settings.max_line_length);

        let mut mesh = MD5Mesh {
            basis: settings.basis_conversion,
            ..Default::default()
        };
        let mut num_joints = 0;
        let mut num_meshes = 0;

        while let Some(line) = reader.next() {
            let line = line?;

            if line.is_empty() {
                continue;
            }

            if let Some(rec) = VERSION.scan(&line) {
                mesh.version = Some(rec.int(0));
            }
            else if let Some(mut rec) = COMMANDLINE.scan(&line) {
                mesh.commandline = Some(rec.take_string(0));
            }
            else if let Some(rec) = NUM_JOINTS.scan(&line) {
                mesh.bind_pose.joints = alloc_exact(rec.int(0), "joints", reader.line_number())?;
                mesh.current_pose.joints = alloc_exact(rec.int(0), "joints", reader.line_number())?;
                num_joints = rec.int(0) as usize;
            }
            else if let Some(rec) = NUM_MESHES.scan(&line) {
                mesh.meshes = alloc_exact(rec.int(0), "meshes", reader.line_number())?;
                num_meshes = rec.int(0) as usize;
            }
            else if JOINTS.scan(&line).is_some() {
                read_joints(&mut reader, num_joints, mesh.basis, &mut mesh.bind_pose.joints)?;

                // current pose starts out as the bind pose
                mesh.current_pose = mesh.bind_pose.clone();
            }
            else if MESH.scan(&line).is_some() {
                if mesh.meshes.len() >= num_meshes {
                    return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "meshes", declared: num_meshes, found: mesh.meshes.len() + 1 });
                }

                let sub_mesh = read_sub_mesh(&mut reader)?;
                mesh.meshes.push(sub_mesh);
            }
            // version & commandline are informational, a bad one is skipped like any unknown line
            else if [&*NUM_JOINTS, &*NUM_MESHES].iter().any(|p| p.claims(&line)) {
                return Err(malformed(&reader, "declaration", &line));
            }
        }

        if mesh.bind_pose.joints.len() != num_joints {
            return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "joints", declared: num_joints, found: mesh.bind_pose.joints.len() });
        }

        // check if all meshes were loaded
        if mesh.meshes.len() != num_meshes {
            return Err(MD5Error::CountMismatch { line: reader.line_number(), what: "meshes", declared: num_meshes, found: mesh.meshes.len() });
        }

        mesh.validate()?;

        log::debug!("mesh: {} joints, {} sub-meshes", num_joints, num_meshes);
        return Ok(mesh);
    }

    /// Check that every vertex, triangle & weight refers to something which exists
    fn validate(self: &Self) -> Result<(), MD5Error> {
        let num_joints = self.bind_pose.joints.len();

        for sub_mesh in &self.meshes {
            for (i, vtx) in sub_mesh.vertices.iter().enumerate() {
                let end = vtx.weight_index + vtx.weight_count;
                if end > sub_mesh.weights.len() {
                    return Err(MD5Error::InvalidReference { what: "vertex", index: i, target: "weight", reference: end as i64 - 1, count: sub_mesh.weights.len() });
                }
            }

            for (i, face) in sub_mesh.faces.iter().enumerate() {
                for idx in face.indices {
                    if idx >= sub_mesh.vertices.len() {
                        return Err(MD5Error::InvalidReference { what: "triangle", index: i, target: "vertex", reference: idx as i64, count: sub_mesh.vertices.len() });
                    }
                }
            }

            for (i, weight) in sub_mesh.weights.iter().enumerate() {
                if weight.joint_index >= num_joints {
                    return Err(MD5Error::InvalidReference { what: "weight", index: i, target: "joint", reference: weight.joint_index as i64, count: num_joints });
                }
            }
        }

        Ok(())
    }

    pub fn num_joints(self: &Self) -> usize {
        self.bind_pose.joints.len()
    }

    /// Vertex positions of sub-mesh `index` in the current pose
    pub fn skin_positions(self: &Self, index: usize) -> Option<Vec<Vec3>> {
        self.meshes.get(index).map(|m| m.skin_positions(&self.current_pose))
    }
}
