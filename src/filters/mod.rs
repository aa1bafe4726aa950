//! The concrete filters of a chain.

pub mod equirect_to_cubemap;
pub mod rotatable_square;

pub use equirect_to_cubemap::{CubemapUniforms, EquirectToCubemap, EquirectToCubemapFilter};
pub use rotatable_square::{RotatableSquare, RotatableSquareFilter, SquareUniforms};
