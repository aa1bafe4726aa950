use bytemuck::{Pod, Zeroable};
use log::warn;

use crate::error::FilterResult;
use crate::node::{FilterKernel, FilterNode};
use crate::texture::{Extent, Texture, TextureKind};
use crate::FilterContext;

/// Uniform block of the `equirect_to_cubemap` kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CubemapUniforms {
    pub face_size: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub _pad: u32,
}

/// Projects a flat equirectangular panorama onto the six faces of a cube.
#[derive(Debug, Clone, Copy, Default)]
pub struct EquirectToCubemap;

impl EquirectToCubemap {
    pub const DEFAULT_FUNCTION: &'static str = "equirect_to_cubemap";

    /// Face size for an input of `width x height`, honouring an override.
    pub fn face_size_for(configured: Option<u32>, width: u32) -> u32 {
        configured.unwrap_or(width / 4).max(1)
    }
}

impl FilterKernel for EquirectToCubemap {
    type Uniforms = CubemapUniforms;

    const INPUT: TextureKind = TextureKind::Flat;
    const OUTPUT: TextureKind = TextureKind::Cube;

    fn label(&self) -> &'static str {
        "equirect_to_cubemap"
    }

    fn output_extent(&self, context: &FilterContext, input: &Texture) -> FilterResult<Extent> {
        if input.width() != 2 * input.height() {
            warn!(
                "equirect input is {}x{}, not 2:1; the cube will be distorted",
                input.width(),
                input.height()
            );
        }
        Ok(Extent::square(Self::face_size_for(
            context.options().cube_face_size,
            input.width(),
        )))
    }

    fn uniforms(&self, input: &Texture, output: &Texture) -> CubemapUniforms {
        CubemapUniforms {
            face_size: output.width(),
            input_width: input.width(),
            input_height: input.height(),
            _pad: 0,
        }
    }

    // Longitude wraps around the seam; latitude stops at the poles.
    fn sampler_descriptor(&self) -> wgpu::SamplerDescriptor<'static> {
        wgpu::SamplerDescriptor {
            label: Some("equirect_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        }
    }
}

/// Filter node turning an equirect texture into a cube texture.
pub type EquirectToCubemapFilter<'ctx> = FilterNode<'ctx, EquirectToCubemap>;

impl<'ctx> FilterNode<'ctx, EquirectToCubemap> {
    /// Bind the built-in `equirect_to_cubemap` function.
    pub fn new(context: &'ctx FilterContext) -> FilterResult<Self> {
        Self::with_function_name(context, EquirectToCubemap::DEFAULT_FUNCTION)
    }

    /// Bind any library function with the equirect-to-cube signature.
    pub fn with_function_name(context: &'ctx FilterContext, function: &str) -> FilterResult<Self> {
        Self::with_kernel(context, function, EquirectToCubemap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_match_the_wgsl_block() {
        assert_eq!(std::mem::size_of::<CubemapUniforms>(), 16);
        let uniforms = CubemapUniforms {
            face_size: 256,
            input_width: 1024,
            input_height: 512,
            _pad: 0,
        };
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&uniforms));
        assert_eq!(words, &[256, 1024, 512, 0]);
    }

    #[test]
    fn face_size_defaults_to_a_quarter_of_the_width() {
        assert_eq!(EquirectToCubemap::face_size_for(None, 4096), 1024);
        assert_eq!(EquirectToCubemap::face_size_for(None, 2), 1);
        assert_eq!(EquirectToCubemap::face_size_for(Some(300), 4096), 300);
        assert_eq!(EquirectToCubemap::face_size_for(Some(0), 4096), 1);
    }
}
