//! Lazily evaluated GPU filters for panoramic images, built on
//! [wgpu](https://github.com/gfx-rs/wgpu).
//!
//! Filters are compute kernels wrapped in nodes that can be chained: a
//! node pulls the texture of its upstream provider, runs its kernel
//! and caches the result until a parameter, its input connection or
//! anything upstream changes.  Two filters are provided: one projects
//! an equirectangular panorama onto a cube, the other remaps a cube
//! into a rotatable octahedral or stereographic square.
//!
//! The API is synchronous and blocking: pulling a texture waits for the
//! GPU to finish every dispatch it triggered.  The underlying
//! `wgpu::Device` and `wgpu::Queue` are public on [`FilterContext`] for
//! callers that want to integrate nodes into their own rendering.
//!
//! ```no_run
//! use wgpu_filter_chain::*;
//!
//! # fn main() -> FilterResult<()> {
//! let ctx = FilterContext::new_blocking(ContextOptions::from_env())?;
//! let source = ImageSource::open(&ctx, "pano.jpg")?.into_shared();
//! let cube = EquirectToCubemapFilter::new(&ctx)?.into_shared();
//! cube.borrow_mut().set_input(source)?;
//! let square = RotatableSquareFilter::new(&ctx, RsfType::Stereographic)?.into_shared();
//! square.borrow_mut().set_input(cube)?;
//! square.borrow_mut().set_theta_offset(0.5);
//! let image = square.borrow_mut().current_texture()?.read_image(&ctx)?;
//! image.save("planet.png")?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod compute;
pub mod config;
pub mod context;
pub mod error;
pub mod filters;
pub mod library;
pub mod node;
pub mod projection;
pub mod provider;
pub mod reference;
pub mod source;
pub mod texture;

// Re-export the most common types at the crate root so that users can
// simply `use wgpu_filter_chain::*;`.
pub use config::ContextOptions;
pub use context::FilterContext;
pub use error::{FilterError, FilterResult};
pub use filters::{EquirectToCubemap, EquirectToCubemapFilter, RotatableSquare, RotatableSquareFilter};
pub use library::ShaderLibrary;
pub use node::{FilterKernel, FilterNode, NodeStats};
pub use projection::{CubeFace, RsfType};
pub use provider::{NodeId, SharedProvider, TextureConsumer, TextureProvider};
pub use source::ImageSource;
pub use texture::{Extent, Texture, TextureKind};
