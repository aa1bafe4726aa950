//! Spherical mappings shared by the WGSL kernels and the CPU reference.
//!
//! Conventions: +Y is up, the equirect centre looks down +Z, cube faces
//! follow the Vulkan/WebGPU selection rules and texel rows grow
//! downwards.

use std::f32::consts::PI;

use glam::{Mat3, Vec2, Vec3};

/// The six faces of a cube texture in layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }

    pub fn from_layer(layer: u32) -> Option<Self> {
        Self::ALL.get(layer as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "px",
            CubeFace::NegativeX => "nx",
            CubeFace::PositiveY => "py",
            CubeFace::NegativeY => "ny",
            CubeFace::PositiveZ => "pz",
            CubeFace::NegativeZ => "nz",
        }
    }

    /// Unnormalized direction through face coordinates `s, t ∈ [-1, 1]`.
    pub fn direction(self, s: f32, t: f32) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::new(1.0, -t, -s),
            CubeFace::NegativeX => Vec3::new(-1.0, -t, s),
            CubeFace::PositiveY => Vec3::new(s, 1.0, t),
            CubeFace::NegativeY => Vec3::new(s, -1.0, -t),
            CubeFace::PositiveZ => Vec3::new(s, -t, 1.0),
            CubeFace::NegativeZ => Vec3::new(-s, -t, -1.0),
        }
    }

    /// Face hit by `dir` and the texture coordinates (`[0, 1]²`) of the hit.
    pub fn locate(dir: Vec3) -> (CubeFace, Vec2) {
        let abs = dir.abs();
        let (face, major, sc, tc) = if abs.x >= abs.y && abs.x >= abs.z {
            if dir.x >= 0.0 {
                (CubeFace::PositiveX, abs.x, -dir.z, -dir.y)
            } else {
                (CubeFace::NegativeX, abs.x, dir.z, -dir.y)
            }
        } else if abs.y >= abs.z {
            if dir.y >= 0.0 {
                (CubeFace::PositiveY, abs.y, dir.x, dir.z)
            } else {
                (CubeFace::NegativeY, abs.y, dir.x, -dir.z)
            }
        } else if dir.z >= 0.0 {
            (CubeFace::PositiveZ, abs.z, dir.x, -dir.y)
        } else {
            (CubeFace::NegativeZ, abs.z, -dir.x, -dir.y)
        };
        let uv = Vec2::new(sc / major, tc / major) * 0.5 + Vec2::splat(0.5);
        (face, uv)
    }
}

/// Projection used by the rotatable square filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsfType {
    /// Whole sphere folded onto a square through an octahedron.
    Octahedron,
    /// Stereographic projection; the inscribed circle is the equator.
    Stereographic,
}

impl RsfType {
    /// Library function implementing the projection.
    pub fn function_name(self) -> &'static str {
        match self {
            RsfType::Octahedron => "octahedral_square",
            RsfType::Stereographic => "stereographic_square",
        }
    }

    /// Value written to the kernel's uniform block.
    pub fn uniform_id(self) -> u32 {
        match self {
            RsfType::Octahedron => 0,
            RsfType::Stereographic => 1,
        }
    }

    /// Local direction (square centre on +z) for `p ∈ [-1, 1]²`.
    pub fn decode(self, p: Vec2) -> Vec3 {
        match self {
            RsfType::Octahedron => octahedral_decode(p),
            RsfType::Stereographic => stereographic_decode(p),
        }
    }
}

/// Centre of texel `i` in `[-1, 1]` on an axis of `size` texels.
pub fn texel_center(i: u32, size: u32) -> f32 {
    2.0 * (i as f32 + 0.5) / size as f32 - 1.0
}

/// Square texel to `[-1, 1]²` with +y up.
pub fn square_coords(x: u32, y: u32, size: u32) -> Vec2 {
    Vec2::new(texel_center(x, size), -texel_center(y, size))
}

/// Equirect texture coordinates of a direction.
pub fn equirect_uv(dir: Vec3) -> Vec2 {
    let dir = dir.normalize();
    let lon = dir.x.atan2(dir.z);
    let lat = dir.y.clamp(-1.0, 1.0).asin();
    Vec2::new(0.5 + lon / (2.0 * PI), 0.5 - lat / PI)
}

fn sign_not_zero(v: Vec2) -> Vec2 {
    Vec2::new(
        if v.x >= 0.0 { 1.0 } else { -1.0 },
        if v.y >= 0.0 { 1.0 } else { -1.0 },
    )
}

pub fn octahedral_decode(p: Vec2) -> Vec3 {
    let z = 1.0 - p.x.abs() - p.y.abs();
    let xy = if z < 0.0 {
        (Vec2::ONE - Vec2::new(p.y.abs(), p.x.abs())) * sign_not_zero(p)
    } else {
        p
    };
    Vec3::new(xy.x, xy.y, z).normalize()
}

pub fn stereographic_decode(p: Vec2) -> Vec3 {
    let r2 = p.length_squared();
    Vec3::new(2.0 * p.x, 2.0 * p.y, 1.0 - r2) / (1.0 + r2)
}

/// Rotation applied to square directions: yaw `theta` about +Y after
/// pitch `phi` about +X.
pub fn orientation(theta_offset: f32, phi_offset: f32) -> Mat3 {
    Mat3::from_rotation_y(theta_offset) * Mat3::from_rotation_x(phi_offset)
}

/// World direction sampled for a local square direction.
pub fn orient(local: Vec3, theta_offset: f32, phi_offset: f32) -> Vec3 {
    let world = Vec3::new(local.x, local.z, -local.y);
    orientation(theta_offset, phi_offset) * world
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn face_centres_point_along_axes() {
        let expected = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, axis) in CubeFace::ALL.into_iter().zip(expected) {
            assert!(close(face.direction(0.0, 0.0), axis), "{face:?}");
            assert_eq!(CubeFace::from_layer(face.layer()), Some(face));
        }
        assert_eq!(CubeFace::from_layer(6), None);
    }

    #[test]
    fn locate_inverts_face_direction() {
        for face in CubeFace::ALL {
            for (s, t) in [(-0.75, -0.5), (0.25, 0.9), (0.6, -0.1)] {
                let (hit, uv) = CubeFace::locate(face.direction(s, t));
                assert_eq!(hit, face);
                assert!((uv.x - (s * 0.5 + 0.5)).abs() < 1e-6);
                assert!((uv.y - (t * 0.5 + 0.5)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn equirect_centre_is_forward_and_top_is_up() {
        let uv = equirect_uv(Vec3::Z);
        assert!((uv - Vec2::new(0.5, 0.5)).length() < 1e-6);
        assert!(equirect_uv(Vec3::Y).y.abs() < 1e-6);
        assert!((equirect_uv(Vec3::NEG_Y).y - 1.0).abs() < 1e-6);
        assert!((equirect_uv(Vec3::X).x - 0.75).abs() < 1e-6);
    }

    #[test]
    fn octahedral_corners_fold_to_the_opposite_pole() {
        assert!(close(octahedral_decode(Vec2::ZERO), Vec3::Z));
        for corner in [Vec2::new(1.0, 1.0), Vec2::new(-1.0, 1.0), Vec2::new(1.0, -1.0), Vec2::new(-1.0, -1.0)] {
            assert!(close(octahedral_decode(corner), Vec3::NEG_Z), "{corner:?}");
        }
        assert!(close(octahedral_decode(Vec2::new(1.0, 0.0)), Vec3::X));
    }

    #[test]
    fn stereographic_unit_circle_is_the_equator() {
        assert!(close(stereographic_decode(Vec2::ZERO), Vec3::Z));
        let d = stereographic_decode(Vec2::new(0.6, 0.8));
        assert!(d.z.abs() < 1e-6);
        assert!((d.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn square_centre_looks_up_until_rotated() {
        assert!(close(orient(Vec3::Z, 0.0, 0.0), Vec3::Y));
        // Pitching by 90° brings the centre to the horizon facing forward.
        assert!(close(orient(Vec3::Z, 0.0, PI / 2.0), Vec3::Z));
        // Yaw then turns it to +X.
        assert!(close(orient(Vec3::Z, PI / 2.0, PI / 2.0), Vec3::X));
    }

    #[test]
    fn projections_bind_distinct_functions() {
        assert_ne!(RsfType::Octahedron.function_name(), RsfType::Stereographic.function_name());
        assert_ne!(RsfType::Octahedron.uniform_id(), RsfType::Stereographic.uniform_id());
    }
}
