//! GPU images passed between nodes.
//!
//! Every texture is `Rgba8Unorm` and is either a flat 2D image or a
//! cube stored as six square layers in the order +X, -X, +Y, -Y, +Z, -Z.

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use log::debug;

use crate::buffer::{ReadbackBuffer, RowLayout, UniformBuffer};
use crate::compute::workgroup_grid;
use crate::error::{FilterError, FilterResult};
use crate::FilterContext;

/// Pixel format of every texture in a chain.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Number of layers in a cube texture.
pub const CUBE_FACES: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    /// A single 2D image.
    Flat,
    /// Six square faces.
    Cube,
}

impl TextureKind {
    pub fn layers(self) -> u32 {
        match self {
            TextureKind::Flat => 1,
            TextureKind::Cube => CUBE_FACES,
        }
    }

    /// View dimension used when a kernel samples the texture.
    pub fn sample_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            TextureKind::Flat => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        }
    }

    /// View dimension used when a kernel writes the texture.
    pub fn storage_dimension(self) -> wgpu::TextureViewDimension {
        match self {
            TextureKind::Flat => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::D2Array,
        }
    }
}

/// Size of a texture, per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Uniform block of the `unfold_cube_face` readback kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub(crate) struct FaceUniforms {
    face: u32,
    face_size: u32,
    _pad: [u32; 2],
}

/// An owned GPU texture together with its shape.
#[derive(Debug)]
pub struct Texture {
    texture: wgpu::Texture,
    kind: TextureKind,
    extent: Extent,
}

impl Texture {
    /// Allocate a texture a kernel can write through a storage binding.
    pub fn storage(
        context: &FilterContext,
        label: &str,
        kind: TextureKind,
        extent: Extent,
    ) -> FilterResult<Self> {
        Self::allocate(
            context,
            label,
            kind,
            extent,
            wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        )
    }

    /// Allocate a flat texture filled from the host.
    pub fn upload_target(context: &FilterContext, label: &str, extent: Extent) -> FilterResult<Self> {
        Self::allocate(
            context,
            label,
            TextureKind::Flat,
            extent,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
        )
    }

    fn allocate(
        context: &FilterContext,
        label: &str,
        kind: TextureKind,
        extent: Extent,
        usage: wgpu::TextureUsages,
    ) -> FilterResult<Self> {
        validate_extent(context, kind, extent)?;
        let texture = context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: kind.layers(),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage,
            view_formats: &[],
        });
        Ok(Self {
            texture,
            kind,
            extent,
        })
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// View for binding the texture as a sampled input.
    pub fn sample_view(&self) -> wgpu::TextureView {
        self.view(self.kind.sample_dimension())
    }

    /// View for binding the texture as a storage output.
    pub fn storage_view(&self) -> wgpu::TextureView {
        self.view(self.kind.storage_dimension())
    }

    fn view(&self, dimension: wgpu::TextureViewDimension) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: None,
            dimension: Some(dimension),
            array_layer_count: Some(self.kind.layers()),
            ..Default::default()
        })
    }

    /// Replace the pixels of a flat texture with `rgba` (tightly packed).
    pub fn write_rgba(&self, context: &FilterContext, rgba: &[u8]) {
        context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.extent.width * 4),
                rows_per_image: Some(self.extent.height),
            },
            wgpu::Extent3d {
                width: self.extent.width,
                height: self.extent.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Copy every layer back to the host.
    ///
    /// Blocks until the copy has completed.  Cube faces come back in
    /// layer order.
    pub fn read_layers(&self, context: &FilterContext) -> FilterResult<Vec<RgbaImage>> {
        if self.kind == TextureKind::Cube && !context.supports_cube_copies() {
            return self.read_unfolded_faces(context);
        }
        self.copy_layers(context)
    }

    /// Render each cube face into a flat texture and copy that back.
    fn read_unfolded_faces(&self, context: &FilterContext) -> FilterResult<Vec<RgbaImage>> {
        debug!("reading back cube faces through `unfold_cube_face`");
        let kernel = context.face_unfold_kernel()?;
        let face = Texture::storage(context, "unfolded_cube_face", TextureKind::Flat, self.extent)?;
        let uniforms = UniformBuffer::<FaceUniforms>::new(context, "unfold_cube_face");
        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("unfold_cube_face_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let cube_view = self.sample_view();
        let face_view = face.storage_view();
        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("unfold_cube_face"),
            layout: kernel.bind_group_layout(),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&face_view),
                },
            ],
        });
        let grid = workgroup_grid(
            self.extent.width,
            self.extent.height,
            1,
            context.device.limits().max_compute_workgroups_per_dimension,
        )
        .map_err(FilterError::Readback)?;

        let mut faces = Vec::with_capacity(CUBE_FACES as usize);
        for layer in 0..CUBE_FACES {
            uniforms.write(
                context,
                &FaceUniforms {
                    face: layer,
                    face_size: self.extent.width,
                    _pad: [0; 2],
                },
            );
            kernel
                .run(context, grid, |pass| {
                    pass.set_bind_group(0, &bind_group, &[]);
                    Ok(())
                })
                .map_err(|e| FilterError::Readback(format!("unfolding face {layer}: {e}")))?;
            faces.push(face.read_image(context)?);
        }
        Ok(faces)
    }

    /// Copy all layers into one mapped buffer.
    fn copy_layers(&self, context: &FilterContext) -> FilterResult<Vec<RgbaImage>> {
        let layout = RowLayout::rgba8(self.extent.width, self.extent.height);
        let layers = self.kind.layers();
        let readback = ReadbackBuffer::new(context, layout, layers);
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("texture_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(layout.padded_bytes_per_row),
                    rows_per_image: Some(layout.rows),
                },
            },
            wgpu::Extent3d {
                width: self.extent.width,
                height: self.extent.height,
                depth_or_array_layers: layers,
            },
        );
        context.queue.submit([encoder.finish()]);
        readback
            .read_layers(context)?
            .into_iter()
            .map(|pixels| {
                RgbaImage::from_raw(self.extent.width, self.extent.height, pixels).ok_or_else(|| {
                    FilterError::Readback("layer size does not match the texture extent".into())
                })
            })
            .collect()
    }

    /// Copy the first layer back to the host.
    pub fn read_image(&self, context: &FilterContext) -> FilterResult<RgbaImage> {
        self.read_layers(context)?
            .into_iter()
            .next()
            .ok_or_else(|| FilterError::Readback("texture has no layers".into()))
    }
}

/// Check `extent` against the kind's shape rules and the device limits.
pub(crate) fn validate_extent(context: &FilterContext, kind: TextureKind, extent: Extent) -> FilterResult<()> {
    check_extent(kind, extent, context.max_texture_dimension())
}

fn check_extent(kind: TextureKind, extent: Extent, max_dimension: u32) -> FilterResult<()> {
    if extent.is_empty() {
        return Err(FilterError::InvalidInput(format!(
            "texture extent {}x{} is empty",
            extent.width, extent.height
        )));
    }
    if extent.width > max_dimension || extent.height > max_dimension {
        return Err(FilterError::InvalidInput(format!(
            "texture extent {}x{} exceeds the device limit of {max_dimension}",
            extent.width, extent.height
        )));
    }
    if kind == TextureKind::Cube && extent.width != extent.height {
        return Err(FilterError::InvalidInput(format!(
            "cube faces must be square, got {}x{}",
            extent.width, extent.height
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_views_span_six_layers() {
        assert_eq!(TextureKind::Cube.layers(), 6);
        assert_eq!(TextureKind::Cube.sample_dimension(), wgpu::TextureViewDimension::Cube);
        assert_eq!(TextureKind::Cube.storage_dimension(), wgpu::TextureViewDimension::D2Array);
        assert_eq!(TextureKind::Flat.layers(), 1);
        assert_eq!(TextureKind::Flat.sample_dimension(), wgpu::TextureViewDimension::D2);
    }

    #[test]
    fn face_uniforms_match_the_wgsl_block() {
        assert_eq!(std::mem::size_of::<FaceUniforms>(), 16);
        let uniforms = FaceUniforms {
            face: 5,
            face_size: 64,
            _pad: [0; 2],
        };
        assert_eq!(&bytemuck::cast_slice::<_, u32>(bytemuck::bytes_of(&uniforms))[..2], &[5, 64]);
    }

    #[test]
    fn extents_are_checked_against_shape_and_limits() {
        assert!(check_extent(TextureKind::Flat, Extent::new(8, 4), 16).is_ok());
        assert!(check_extent(TextureKind::Cube, Extent::square(16), 16).is_ok());
        assert!(matches!(
            check_extent(TextureKind::Flat, Extent::new(0, 4), 16),
            Err(FilterError::InvalidInput(_))
        ));
        assert!(matches!(
            check_extent(TextureKind::Flat, Extent::new(32, 4), 16),
            Err(FilterError::InvalidInput(_))
        ));
        assert!(matches!(
            check_extent(TextureKind::Cube, Extent::new(8, 4), 16),
            Err(FilterError::InvalidInput(_))
        ));
    }
}
