//! Turn an equirectangular panorama into cube faces and a rotatable
//! square.
//!
//! ```text
//! cargo run --example panorama -- pano.jpg --projection stereographic --phi 1.57 --out-dir out
//! ```
//!
//! Writes `cube_px.png` .. `cube_nz.png` and `square.png` into the output
//! directory.  The GPU chain is `ImageSource -> EquirectToCubemapFilter ->
//! RotatableSquareFilter`; pulling the square recomputes the whole chain
//! once, and a second pull is served from the caches.  `--cpu` runs the
//! reference kernels instead, which is handy on machines without a GPU.
//! Sizes can be overridden with `FILTER_CHAIN_CUBE_FACE_SIZE` and
//! `FILTER_CHAIN_SQUARE_SIZE`; set `RUST_LOG=debug` to follow the chain.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, ValueEnum};
use image::RgbaImage;

use wgpu_filter_chain::{
    reference, ContextOptions, CubeFace, EquirectToCubemap, EquirectToCubemapFilter, FilterContext, ImageSource,
    RotatableSquare, RotatableSquareFilter, RsfType, TextureConsumer, TextureProvider,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Projection {
    Octahedron,
    Stereographic,
}

impl From<Projection> for RsfType {
    fn from(projection: Projection) -> Self {
        match projection {
            Projection::Octahedron => RsfType::Octahedron,
            Projection::Stereographic => RsfType::Stereographic,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "panorama")]
#[command(about = "Project an equirect panorama onto a cube and a rotatable square")]
struct Cli {
    /// Equirectangular input image (PNG or JPEG).
    input: PathBuf,
    #[arg(long, value_enum, default_value_t = Projection::Stereographic)]
    projection: Projection,
    /// Yaw of the square in radians.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    theta: f32,
    /// Pitch of the square in radians.
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    phi: f32,
    #[arg(short = 'o', long = "out-dir", default_value = ".")]
    out_dir: PathBuf,
    /// Use the CPU reference kernels instead of the GPU.
    #[arg(long)]
    cpu: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.out_dir)?;
    let options = ContextOptions::from_env();

    let (faces, square) = if cli.cpu {
        run_cpu(&cli, &options)?
    } else {
        run_gpu(&cli, options)?
    };

    for (face, image) in CubeFace::ALL.into_iter().zip(&faces) {
        image.save(cli.out_dir.join(format!("cube_{}.png", face.name())))?;
    }
    let square_path = cli.out_dir.join("square.png");
    square.save(&square_path)?;
    println!(
        "wrote {} cube faces ({}px) and {} ({}px)",
        faces.len(),
        faces.first().map(|f| f.width()).unwrap_or(0),
        square_path.display(),
        square.width()
    );
    Ok(())
}

fn run_gpu(cli: &Cli, options: ContextOptions) -> Result<(Vec<RgbaImage>, RgbaImage), Box<dyn Error>> {
    let ctx = FilterContext::new_blocking(options)?;
    let source = ImageSource::open(&ctx, &cli.input)?.into_shared();
    let cube = EquirectToCubemapFilter::new(&ctx)?.into_shared();
    let square = RotatableSquareFilter::new(&ctx, cli.projection.into())?.into_shared();
    cube.borrow_mut().set_input(source)?;
    square.borrow_mut().set_input(cube.clone())?;
    {
        let mut square = square.borrow_mut();
        square.set_theta_offset(cli.theta);
        square.set_phi_offset(cli.phi);
    }

    let start = Instant::now();
    let output = square.borrow_mut().current_texture()?;
    println!("first pull: {:?}, {} dispatches", start.elapsed(), ctx.dispatch_count());
    let start = Instant::now();
    square.borrow_mut().current_texture()?;
    println!("second pull: {:?}, {} dispatches", start.elapsed(), ctx.dispatch_count());
    println!("cube: {:?}", cube.borrow().stats());
    println!("square: {:?}", square.borrow().stats());

    let faces = cube.borrow_mut().current_texture()?.read_layers(&ctx)?;
    Ok((faces, output.read_image(&ctx)?))
}

fn run_cpu(cli: &Cli, options: &ContextOptions) -> Result<(Vec<RgbaImage>, RgbaImage), Box<dyn Error>> {
    let panorama = open_rgba(&cli.input)?;
    let face_size = EquirectToCubemap::face_size_for(options.cube_face_size, panorama.width());
    let start = Instant::now();
    let cube = reference::equirect_to_cubemap(&panorama, face_size)?;
    let size = RotatableSquare::size_for(options.square_size, face_size);
    let square = reference::rotatable_square(&cube, size, cli.projection.into(), cli.theta, cli.phi)?;
    println!("cpu reference: {:?}", start.elapsed());
    Ok((cube.into_faces(), square))
}

fn open_rgba(path: &Path) -> Result<RgbaImage, Box<dyn Error>> {
    Ok(image::open(path)?.into_rgba8())
}
