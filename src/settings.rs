use glam::Mat4;

use crate::common::BASIS_CONVERSION;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Options shared by the MD5 mesh & animation loaders
#[derive(Clone, Copy, Debug)]
pub struct LoadSettings {
    /// Longest physical line accepted by the line reader, in bytes
    pub max_line_length: usize,
    /// Transform applied to the bind pose when a mesh is loaded
    pub basis_conversion: Mat4,
}

impl Default for LoadSettings {
    fn default() -> LoadSettings {
        LoadSettings {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            basis_conversion: BASIS_CONVERSION,
        }
    }
}

impl LoadSettings {
    pub fn with_max_line_length(self: &Self, max_line_length: usize) -> LoadSettings {
        let mut result = *self;
        result.max_line_length = max_line_length;
        result
    }

    pub fn with_basis_conversion(self: &Self, basis_conversion: Mat4) -> LoadSettings {
        let mut result = *self;
        result.basis_conversion = basis_conversion;
        result
    }
}
