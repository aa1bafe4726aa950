//! Criterion benchmarks for a source → cubemap → square chain.
//!
//! To run the benchmarks use `cargo bench`.  The GPU benches measure a
//! cached pull (no dispatch), a pull after changing the square's
//! rotation (one dispatch) and a pull after replacing the source image
//! (upload plus two dispatches).  Each GPU pull blocks until the device
//! is idle, so the numbers include submission latency.  The CPU
//! reference kernels are benchmarked on the same input for comparison.
//! GPU benches are skipped when no adapter is available.

use criterion::{criterion_group, criterion_main, Criterion};
use image::{Rgba, RgbaImage};
use rand::Rng;

use wgpu_filter_chain::{
    reference, ContextOptions, EquirectToCubemapFilter, FilterContext, ImageSource, RotatableSquareFilter, RsfType,
    TextureConsumer, TextureProvider,
};

const WIDTH: u32 = 1024;
const HEIGHT: u32 = 512;

fn noise_panorama() -> RgbaImage {
    let mut rng = rand::thread_rng();
    RgbaImage::from_fn(WIDTH, HEIGHT, |_, _| Rgba([rng.gen(), rng.gen(), rng.gen(), 255]))
}

fn gpu_chain_benchmark(c: &mut Criterion) {
    // A single context and chain for every iteration so that device and
    // pipeline creation are not measured.
    let ctx = match FilterContext::new_blocking(ContextOptions::from_env()) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("skipping GPU benches: {err}");
            return;
        }
    };
    let source = ImageSource::new(&ctx, noise_panorama())
        .expect("source")
        .into_shared();
    let cube = EquirectToCubemapFilter::new(&ctx).expect("cubemap filter").into_shared();
    let square = RotatableSquareFilter::new(&ctx, RsfType::Stereographic)
        .expect("square filter")
        .into_shared();
    cube.borrow_mut().set_input(source.clone()).expect("connect cube");
    square.borrow_mut().set_input(cube.clone()).expect("connect square");
    square.borrow_mut().current_texture().expect("warm up");

    c.bench_function("gpu cached pull", |bencher| {
        bencher.iter(|| square.borrow_mut().current_texture().expect("pull"));
    });

    let mut theta = 0.0f32;
    c.bench_function("gpu pull after rotation", |bencher| {
        bencher.iter(|| {
            theta += 0.01;
            square.borrow_mut().set_theta_offset(theta);
            square.borrow_mut().current_texture().expect("pull")
        });
    });

    let images = [noise_panorama(), noise_panorama()];
    let mut next = 0;
    c.bench_function("gpu pull after new image", |bencher| {
        bencher.iter(|| {
            next ^= 1;
            source.borrow_mut().set_image(images[next].clone()).expect("set image");
            square.borrow_mut().current_texture().expect("pull")
        });
    });
}

fn cpu_reference_benchmark(c: &mut Criterion) {
    let panorama = noise_panorama();
    let face_size = WIDTH / 4;
    c.bench_function("cpu equirect to cubemap", |bencher| {
        bencher.iter(|| reference::equirect_to_cubemap(&panorama, face_size).expect("cube"));
    });
    let cube = reference::equirect_to_cubemap(&panorama, face_size).expect("cube");
    c.bench_function("cpu stereographic square", |bencher| {
        bencher.iter(|| {
            reference::rotatable_square(&cube, 2 * face_size, RsfType::Stereographic, 0.3, 0.2).expect("square")
        });
    });
}

criterion_group!(benches, gpu_chain_benchmark, cpu_reference_benchmark);
criterion_main!(benches);
