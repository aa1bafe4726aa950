//! Host images as the root of a chain.

use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use image::RgbaImage;
use log::debug;

use crate::error::{FilterError, FilterResult};
use crate::provider::{Freshness, NodeId, TextureProvider};
use crate::texture::{validate_extent, Extent, Texture, TextureKind};
use crate::FilterContext;

/// A provider that uploads an RGBA image instead of running a kernel.
///
/// Replacing the image marks the source dirty; the upload happens on
/// the next pull, reusing the GPU texture when the size is unchanged.
pub struct ImageSource<'ctx> {
    id: NodeId,
    context: &'ctx FilterContext,
    pending: Option<RgbaImage>,
    texture: Option<Arc<Texture>>,
    freshness: Freshness,
}

impl fmt::Debug for ImageSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("id", &self.id)
            .field("extent", &self.extent())
            .field("upload_pending", &self.pending.is_some())
            .field("freshness", &self.freshness)
            .finish_non_exhaustive()
    }
}

impl<'ctx> ImageSource<'ctx> {
    pub fn new(context: &'ctx FilterContext, image: RgbaImage) -> FilterResult<Self> {
        check_image(&image)?;
        let id = context.allocate_node_id();
        debug!("created image source {id} ({}x{})", image.width(), image.height());
        Ok(Self {
            id,
            context,
            pending: Some(image),
            texture: None,
            freshness: Freshness::new(),
        })
    }

    /// Build a source from tightly packed RGBA8 pixels.  `pixels` must
    /// hold exactly `width * height * 4` bytes.
    pub fn from_rgba(context: &'ctx FilterContext, width: u32, height: u32, pixels: Vec<u8>) -> FilterResult<Self> {
        Self::new(context, image_from_rgba(width, height, pixels)?)
    }

    /// Decode an image file (PNG or JPEG) into a source.
    pub fn open(context: &'ctx FilterContext, path: impl AsRef<Path>) -> FilterResult<Self> {
        let image = image::open(path.as_ref())?.into_rgba8();
        Self::new(context, image)
    }

    pub fn into_shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    /// Replace the image.  The source is dirty until the next pull.
    pub fn set_image(&mut self, image: RgbaImage) -> FilterResult<()> {
        check_image(&image)?;
        self.pending = Some(image);
        self.freshness.invalidate();
        Ok(())
    }

    pub fn extent(&self) -> Option<Extent> {
        match (&self.pending, &self.texture) {
            (Some(image), _) => Some(Extent::new(image.width(), image.height())),
            (None, Some(texture)) => Some(texture.extent()),
            (None, None) => None,
        }
    }

    fn upload(&mut self, image: &RgbaImage) -> FilterResult<Arc<Texture>> {
        let extent = Extent::new(image.width(), image.height());
        validate_extent(self.context, TextureKind::Flat, extent)?;
        let texture = match &self.texture {
            Some(texture) if texture.extent() == extent => texture.clone(),
            _ => {
                debug!("{} allocating source texture {}x{}", self.id, extent.width, extent.height);
                Arc::new(Texture::upload_target(self.context, "image_source", extent)?)
            }
        };
        texture.write_rgba(self.context, image.as_raw());
        Ok(texture)
    }
}

impl<'ctx> TextureProvider for ImageSource<'ctx> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn output_kind(&self) -> TextureKind {
        TextureKind::Flat
    }

    fn current_texture(&mut self) -> FilterResult<Arc<Texture>> {
        if let Some(image) = self.pending.take() {
            match self.upload(&image) {
                Ok(texture) => {
                    self.texture = Some(texture);
                    self.freshness.mark_clean(None);
                }
                Err(err) => {
                    // Keep the image so the next pull retries the upload.
                    self.pending = Some(image);
                    return Err(err);
                }
            }
        }
        self.texture
            .clone()
            .ok_or_else(|| FilterError::InvalidInput(format!("{} has no image", self.id)))
    }

    fn is_dirty(&self) -> bool {
        self.freshness.is_dirty(None)
    }

    fn revision(&self) -> u64 {
        self.freshness.revision()
    }
}

fn check_image(image: &RgbaImage) -> FilterResult<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(FilterError::InvalidInput(format!(
            "source image {}x{} is empty",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

fn image_from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> FilterResult<RgbaImage> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|texels| texels.checked_mul(4));
    if expected != Some(pixels.len()) {
        return Err(FilterError::InvalidInput(format!(
            "{} bytes do not hold a {width}x{height} RGBA image",
            pixels.len()
        )));
    }
    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
        FilterError::InvalidInput(format!("{width}x{height} is not a valid RGBA image size"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba_buffers_must_match_the_size_exactly() {
        let image = image_from_rgba(2, 3, vec![7; 24]).unwrap();
        assert_eq!(image.dimensions(), (2, 3));
        assert_eq!(image.get_pixel(1, 2).0, [7; 4]);

        for len in [23, 25, 48] {
            assert!(matches!(
                image_from_rgba(2, 3, vec![0; len]),
                Err(FilterError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn oversized_dimensions_do_not_overflow() {
        assert!(matches!(
            image_from_rgba(u32::MAX, u32::MAX, vec![0; 16]),
            Err(FilterError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_images_are_rejected() {
        assert!(check_image(&RgbaImage::new(0, 4)).is_err());
        assert!(check_image(&RgbaImage::new(4, 1)).is_ok());
    }
}
