//! CPU implementations of the filter kernels.
//!
//! These follow the WGSL kernels texel for texel (same mappings, same
//! bilinear sampling with repeat in `u` for equirect inputs) and are
//! used to check GPU output and to process images when no adapter is
//! available.  They are straightforward rather than fast.

use glam::{Vec2, Vec4};
use image::{Rgba, RgbaImage};

use crate::error::{FilterError, FilterResult};
use crate::projection::{self, CubeFace, RsfType};

/// Six square faces in [`CubeFace`] layer order.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeFaces {
    faces: Vec<RgbaImage>,
}

impl CubeFaces {
    /// Wrap six equally sized square images.
    pub fn new(faces: Vec<RgbaImage>) -> FilterResult<Self> {
        let size = faces.first().map(|f| f.width()).unwrap_or(0);
        if faces.len() != CubeFace::ALL.len() {
            return Err(FilterError::InvalidInput(format!("a cube needs 6 faces, got {}", faces.len())));
        }
        if size == 0 || faces.iter().any(|f| f.width() != size || f.height() != size) {
            return Err(FilterError::InvalidInput("cube faces must be equally sized squares".into()));
        }
        Ok(Self { faces })
    }

    pub fn face(&self, face: CubeFace) -> &RgbaImage {
        &self.faces[face.layer() as usize]
    }

    pub fn face_size(&self) -> u32 {
        self.faces[0].width()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CubeFace, &RgbaImage)> {
        CubeFace::ALL.into_iter().zip(self.faces.iter())
    }

    pub fn into_faces(self) -> Vec<RgbaImage> {
        self.faces
    }

    /// Bilinear sample of the face `dir` points at, clamped to that face.
    pub fn sample(&self, dir: glam::Vec3) -> Vec4 {
        let (face, uv) = CubeFace::locate(dir);
        sample_bilinear(self.face(face), uv, false)
    }
}

/// Project an equirectangular panorama onto six `face_size` faces.
pub fn equirect_to_cubemap(equirect: &RgbaImage, face_size: u32) -> FilterResult<CubeFaces> {
    if equirect.width() == 0 || equirect.height() == 0 || face_size == 0 {
        return Err(FilterError::InvalidInput("empty equirect input or face size".into()));
    }
    let faces = CubeFace::ALL
        .into_iter()
        .map(|face| {
            RgbaImage::from_fn(face_size, face_size, |x, y| {
                let dir = face
                    .direction(
                        projection::texel_center(x, face_size),
                        projection::texel_center(y, face_size),
                    )
                    .normalize();
                to_rgba(sample_bilinear(equirect, projection::equirect_uv(dir), true))
            })
        })
        .collect();
    CubeFaces::new(faces)
}

/// Remap a cube into a `size x size` square with the given projection
/// and rotation offsets (radians).
pub fn rotatable_square(
    cube: &CubeFaces,
    size: u32,
    projection_type: RsfType,
    theta_offset: f32,
    phi_offset: f32,
) -> FilterResult<RgbaImage> {
    if size == 0 {
        return Err(FilterError::InvalidInput("square size must be positive".into()));
    }
    Ok(RgbaImage::from_fn(size, size, |x, y| {
        let local = projection_type.decode(projection::square_coords(x, y, size));
        let dir = projection::orient(local, theta_offset, phi_offset);
        to_rgba(cube.sample(dir))
    }))
}

/// Bilinear sample at normalized `uv`, texel centres at half-integers.
/// `wrap_u` repeats horizontally; otherwise both axes clamp to edge.
fn sample_bilinear(image: &RgbaImage, uv: Vec2, wrap_u: bool) -> Vec4 {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x = uv.x * w as f32 - 0.5;
    let y = uv.y * h as f32 - 0.5;
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let fetch = |xi: i64, yi: i64| -> Vec4 {
        let xi = if wrap_u { xi.rem_euclid(w) } else { xi.clamp(0, w - 1) };
        let yi = yi.clamp(0, h - 1);
        let p = image.get_pixel(xi as u32, yi as u32).0;
        Vec4::new(p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32) / 255.0
    };
    let (x0, y0) = (x0 as i64, y0 as i64);
    let top = fetch(x0, y0).lerp(fetch(x0 + 1, y0), fx);
    let bottom = fetch(x0, y0 + 1).lerp(fetch(x0 + 1, y0 + 1), fx);
    top.lerp(bottom, fy)
}

fn to_rgba(color: Vec4) -> Rgba<u8> {
    let c = (color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
    Rgba([c.x as u8, c.y as u8, c.z as u8, c.w as u8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn constant(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    /// Left half red, right half blue; the seam at u = 0 / 1 wraps.
    fn split_panorama() -> RgbaImage {
        RgbaImage::from_fn(64, 32, |x, _| if x < 32 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) })
    }

    #[test]
    fn constant_panorama_gives_uniform_faces() {
        let color = [40, 120, 200, 255];
        let cube = equirect_to_cubemap(&constant(64, 32, color), 16).unwrap();
        assert_eq!(cube.face_size(), 16);
        for (face, image) in cube.iter() {
            assert!(image.pixels().all(|p| p.0 == color), "{face:?} is not uniform");
        }
    }

    #[test]
    fn cube_faces_look_in_their_direction() {
        let cube = equirect_to_cubemap(&split_panorama(), 8).unwrap();
        // +X sits at u = 0.75 (blue half), -X at u = 0.25 (red half).
        assert_eq!(cube.face(CubeFace::PositiveX).get_pixel(4, 4).0, [0, 0, 255, 255]);
        assert_eq!(cube.face(CubeFace::NegativeX).get_pixel(4, 4).0, [255, 0, 0, 255]);
    }

    #[test]
    fn square_of_constant_cube_is_constant() {
        let color = [10, 20, 30, 255];
        let cube = equirect_to_cubemap(&constant(32, 16, color), 8).unwrap();
        for projection in [RsfType::Octahedron, RsfType::Stereographic] {
            let square = rotatable_square(&cube, 16, projection, 0.3, -1.2).unwrap();
            assert!(square.pixels().all(|p| p.0 == color), "{projection:?}");
        }
    }

    #[test]
    fn theta_offset_rotates_the_view() {
        let cube = equirect_to_cubemap(&split_panorama(), 16).unwrap();
        // Pitch the centre down to the horizon so yaw changes what it sees.
        let facing_back = rotatable_square(&cube, 8, RsfType::Stereographic, 0.0, PI / 2.0).unwrap();
        let facing_side = rotatable_square(&cube, 8, RsfType::Stereographic, -PI / 2.0, PI / 2.0).unwrap();
        let centre = |img: &RgbaImage| img.get_pixel(4, 4).0;
        assert_ne!(centre(&facing_back), centre(&facing_side));
        assert_eq!(centre(&facing_side), [255, 0, 0, 255]);
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        assert!(equirect_to_cubemap(&constant(8, 4, [0; 4]), 0).is_err());
        assert!(CubeFaces::new(vec![constant(4, 4, [0; 4]); 5]).is_err());
        let mut faces = vec![constant(4, 4, [0; 4]); 6];
        faces[3] = constant(4, 2, [0; 4]);
        assert!(CubeFaces::new(faces).is_err());
    }
}
