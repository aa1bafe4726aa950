use bytemuck::{Pod, Zeroable};
use log::trace;

use crate::error::FilterResult;
use crate::node::{FilterKernel, FilterNode};
use crate::projection::RsfType;
use crate::texture::{Extent, Texture, TextureKind};
use crate::FilterContext;

/// Uniform block shared by the square projection kernels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SquareUniforms {
    pub output_size: u32,
    pub projection: u32,
    pub theta_offset: f32,
    pub phi_offset: f32,
}

/// Remaps a cube into a square that can be rotated with two angles.
///
/// `theta_offset` yaws about the vertical axis and `phi_offset` pitches
/// about the horizontal one, both in radians.  With no offsets the
/// centre of the square looks straight up.
#[derive(Debug, Clone, Copy)]
pub struct RotatableSquare {
    projection: RsfType,
    theta_offset: f32,
    phi_offset: f32,
}

impl RotatableSquare {
    pub fn new(projection: RsfType) -> Self {
        Self {
            projection,
            theta_offset: 0.0,
            phi_offset: 0.0,
        }
    }

    /// Side of the square for a cube of `face_size`, honouring an override.
    pub fn size_for(configured: Option<u32>, face_size: u32) -> u32 {
        configured.unwrap_or(face_size.saturating_mul(2)).max(1)
    }
}

impl FilterKernel for RotatableSquare {
    type Uniforms = SquareUniforms;

    const INPUT: TextureKind = TextureKind::Cube;
    const OUTPUT: TextureKind = TextureKind::Flat;

    fn label(&self) -> &'static str {
        "rotatable_square"
    }

    fn output_extent(&self, context: &FilterContext, input: &Texture) -> FilterResult<Extent> {
        Ok(Extent::square(Self::size_for(
            context.options().square_size,
            input.width(),
        )))
    }

    fn uniforms(&self, _input: &Texture, output: &Texture) -> SquareUniforms {
        SquareUniforms {
            output_size: output.width(),
            projection: self.projection.uniform_id(),
            theta_offset: self.theta_offset,
            phi_offset: self.phi_offset,
        }
    }
}

/// Filter node producing an octahedral or stereographic square.
pub type RotatableSquareFilter<'ctx> = FilterNode<'ctx, RotatableSquare>;

impl<'ctx> FilterNode<'ctx, RotatableSquare> {
    /// Bind the kernel for `projection`.  The projection cannot be
    /// changed afterwards; build another node instead.
    pub fn new(context: &'ctx FilterContext, projection: RsfType) -> FilterResult<Self> {
        Self::with_kernel(context, projection.function_name(), RotatableSquare::new(projection))
    }

    pub fn projection(&self) -> RsfType {
        self.kernel().projection
    }

    pub fn theta_offset(&self) -> f32 {
        self.kernel().theta_offset
    }

    pub fn phi_offset(&self) -> f32 {
        self.kernel().phi_offset
    }

    /// Set the yaw in radians.  Always marks the node dirty, even when
    /// the value is unchanged.
    pub fn set_theta_offset(&mut self, theta_offset: f32) {
        trace!("theta_offset -> {theta_offset}");
        self.update_kernel(|k| k.theta_offset = theta_offset);
    }

    /// Set the pitch in radians.  Always marks the node dirty.
    pub fn set_phi_offset(&mut self, phi_offset: f32) {
        trace!("phi_offset -> {phi_offset}");
        self.update_kernel(|k| k.phi_offset = phi_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_match_the_wgsl_block() {
        assert_eq!(std::mem::size_of::<SquareUniforms>(), 16);
        let uniforms = SquareUniforms {
            output_size: 512,
            projection: RsfType::Stereographic.uniform_id(),
            theta_offset: 0.5,
            phi_offset: -1.0,
        };
        let bytes = bytemuck::bytes_of(&uniforms);
        assert_eq!(&bytes[0..4], &512u32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &1u32.to_ne_bytes());
        assert_eq!(&bytes[8..12], &0.5f32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &(-1.0f32).to_ne_bytes());
    }

    #[test]
    fn square_defaults_to_twice_the_face() {
        assert_eq!(RotatableSquare::size_for(None, 256), 512);
        assert_eq!(RotatableSquare::size_for(Some(100), 256), 100);
        assert_eq!(RotatableSquare::size_for(Some(0), 256), 1);
    }

    #[test]
    fn new_kernel_has_no_offsets() {
        let kernel = RotatableSquare::new(RsfType::Octahedron);
        assert_eq!(kernel.projection, RsfType::Octahedron);
        assert_eq!((kernel.theta_offset, kernel.phi_offset), (0.0, 0.0));
    }
}
