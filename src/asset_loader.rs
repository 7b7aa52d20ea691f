use std::{collections::HashMap, marker::PhantomData, sync::{Arc, RwLock, RwLockWriteGuard, Weak}};

use lazy_static::lazy_static;
use thiserror::Error;

use crate::{error::MD5Error, md5anim::MD5Animation, md5mesh::MD5Mesh, settings::LoadSettings};

lazy_static! {
    static ref ANIM_CACHE: RwLock<AnimCache> = RwLock::new(AnimCache::new());
    static ref MESH_CACHE: RwLock<MeshCache> = RwLock::new(MeshCache::new());
}

// a panic while holding the lock can't leave a cache half-updated, so just take it back
fn write_cache<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Load an animation, sharing it with any other live reference to the same path
pub fn load_anim(path: &str) -> Result<Arc<MD5Animation>, ResourceError> {
    let anim_cache = &mut write_cache(&ANIM_CACHE);
    return anim_cache.load(path);
}

/// Load the shared, read-only template for a mesh. The template stays cached while a reference to it is held.
pub fn load_mesh_template(path: &str) -> Result<Arc<MD5Mesh>, ResourceError> {
    let mesh_cache = &mut write_cache(&MESH_CACHE);
    return mesh_cache.load(path);
}

/// Load a mesh instance. Each instance has its own current pose.
pub fn load_mesh(path: &str) -> Result<MD5Mesh, ResourceError> {
    let template = load_mesh_template(path)?;
    return Ok(template.as_ref().clone());
}

/// Give up a reference to an animation. Once the last reference is gone, the cache entry is dropped too.
pub fn release_anim(anim: Arc<MD5Animation>) {
    drop(anim);
    write_cache(&ANIM_CACHE).purge();
}

/// Give up a mesh instance
pub fn release_mesh(mesh: MD5Mesh) {
    drop(mesh);
    write_cache(&MESH_CACHE).purge();
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("parse error: {0}")]
    ParseError(MD5Error),
    #[error("io error: {0}")]
    IOError(std::io::Error),
}

impl From<MD5Error> for ResourceError {
    fn from(value: MD5Error) -> Self {
        match value {
            MD5Error::Io(e) => ResourceError::IOError(e),
            e => ResourceError::ParseError(e)
        }
    }
}

pub trait ResourceLoader<TResource> {
    fn load_resource(path: &str) -> Result<TResource, ResourceError>;
}

pub struct AnimLoader {
}

impl ResourceLoader<MD5Animation> for AnimLoader {
    fn load_resource(path: &str) -> Result<MD5Animation, ResourceError> {
        match MD5Animation::from_file(path, &LoadSettings::default()) {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into())
        }
    }
}

pub struct MeshLoader {
}

impl ResourceLoader<MD5Mesh> for MeshLoader {
    fn load_resource(path: &str) -> Result<MD5Mesh, ResourceError> {
        match MD5Mesh::from_file(path, &LoadSettings::default()) {
            Ok(v) => Ok(v),
            Err(e) => Err(e.into())
        }
    }
}

/// Implementation of a smart cache with ref counted resources
/// Attempts to load the same resource path more than once will return a reference to the same resource
/// If all references to the resource are dropped, the resource will be unloaded
pub struct ResourceCache<TResource, TResourceLoader>
    where TResourceLoader: ResourceLoader<TResource>
{
    cache: HashMap<String, Weak<TResource>>,
    phantom: PhantomData<TResourceLoader>
}

impl<TResource, TResourceLoader> ResourceCache<TResource, TResourceLoader>
    where TResourceLoader: ResourceLoader<TResource>
{
    pub fn new() -> ResourceCache<TResource, TResourceLoader> {
        ResourceCache::<TResource, TResourceLoader> {
            cache: HashMap::new(),
            phantom: PhantomData::default()
        }
    }

    pub fn load(self: &mut Self, path: &str) -> Result<Arc<TResource>, ResourceError> {
        if let Some(entry) = self.cache.get(path) {
            // if the upgrade fails, the resource has been unloaded & we load a new one
            match entry.upgrade() {
                Some(v) => {
                    return Ok(v);
                }
                None => {
                    self.cache.remove(path);
                }
            };
        }

        log::info!("Loading {}: {}", std::any::type_name::<TResource>(), path);

        let resource = match TResourceLoader::load_resource(path) {
            Ok(v) => v,
            Err(e) => {
                log::error!("\t FAILED: {}", e);
                return Err(e);
            }
        };

        let res = Arc::new(resource);
        self.cache.insert(path.to_owned(), Arc::downgrade(&res));
        return Ok(res);
    }

    /// Drop entries whose resource has been unloaded
    pub fn purge(self: &mut Self) {
        self.cache.retain(|_, v| v.strong_count() > 0);
    }

    /// Number of paths with a live resource
    pub fn live_count(self: &Self) -> usize {
        self.cache.values().filter(|v| v.strong_count() > 0).count()
    }

    pub fn len(self: &Self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(self: &Self) -> bool {
        self.cache.is_empty()
    }
}

pub type AnimCache = ResourceCache<MD5Animation, AnimLoader>;
pub type MeshCache = ResourceCache<MD5Mesh, MeshLoader>;

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const ANIM: &str = "MD5Version 10
numFrames 1
numJoints 1
frameRate 24
numAnimatedComponents 1

hierarchy {
\t\"root\"\t-1 1 0
}

bounds {
\t( 0 0 0 ) ( 1 1 1 )
}

baseframe {
\t( 0 0 0 ) ( 0 0 0 )
}

frame 0 {
\t2.5
}
";

    const MESH: &str = "MD5Version 10
numJoints 1
numMeshes 1

joints {
\t\"root\"\t-1 ( 0 0 0 ) ( 0 0 0 )
}

mesh {
\tshader \"tri\"
\tnumverts 3
\tvert 0 ( 0 0 ) 0 1
\tvert 1 ( 1 0 ) 1 1
\tvert 2 ( 0 1 ) 2 1
\tnumtris 1
\ttri 0 0 1 2
\tnumweights 3
\tweight 0 0 1 ( 0 0 0 )
\tweight 1 0 1 ( 1 0 0 )
\tweight 2 0 1 ( 0 1 0 )
}
";

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn path_of(file: &NamedTempFile) -> String {
        file.path().to_str().unwrap().to_owned()
    }

    #[test]
    fn shares_loaded_anim() {
        let file = write_temp(ANIM);
        let path = path_of(&file);

        let a = load_anim(&path).unwrap();
        let b = load_anim(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.frames[0].data, vec![2.5]);

        release_anim(a);
        release_anim(b);
    }

    #[test]
    fn reloads_after_release() {
        let file = write_temp(ANIM);
        let mut cache = AnimCache::new();

        let a = cache.load(&path_of(&file)).unwrap();
        assert_eq!(cache.live_count(), 1);

        drop(a);
        assert_eq!(cache.live_count(), 0);
        assert_eq!(cache.len(), 1);

        cache.purge();
        assert!(cache.is_empty());

        let b = cache.load(&path_of(&file)).unwrap();
        assert_eq!(b.num_frames, 1);
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn mesh_instances_are_independent() {
        let file = write_temp(MESH);
        let path = path_of(&file);

        let template = load_mesh_template(&path).unwrap();
        let mut a = load_mesh(&path).unwrap();
        let b = load_mesh(&path).unwrap();

        a.current_animation_frame = 7;
        a.current_pose.joints[0].position.x = 3.0;

        assert_eq!(b.current_animation_frame, 0);
        assert_eq!(b.current_pose, template.bind_pose);
        assert_eq!(a.meshes, b.meshes);

        release_mesh(a);
        release_mesh(b);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.md5anim");

        let res = load_anim(path.to_str().unwrap());
        assert!(matches!(res, Err(ResourceError::IOError(_))));
    }

    #[test]
    fn bad_file_is_parse_error() {
        let file = write_temp("numJoints 2\nhierarchy {\n\"root\" -1 0 0\n}\n");

        let res = load_anim(&path_of(&file));
        assert!(matches!(res, Err(ResourceError::ParseError(MD5Error::CountMismatch { what: "hierarchy joints", .. }))));

        // failures aren't cached
        let mut cache = MeshCache::new();
        assert!(cache.load(&path_of(&file)).is_err());
        assert!(cache.is_empty());
    }
}
