// demos/grayscale.rs — image filter over a 2D index space.
//
// Decodes an image into packed RGBA8 pixels, runs the luma kernel with one
// invocation per pixel, and writes the result out as PNG. The content
// loader (`image` crate) and the output sink stay outside the core — the
// session only ever sees flat byte buffers of declared stride.
//
// Usage:
//   cargo run --example grayscale -- input.png [output.png]

use std::env;

use gridwave::{Access, ComputeSession, IndexSpace, KernelBuilder};

const SHADER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/grayscale.wgsl");

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <input_image> [output.png]", args[0]);
        std::process::exit(1);
    }
    let input_path = args[1].clone();
    let output_path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "grayscale_out.png".to_string());

    let rgba = match image::open(&input_path) {
        Ok(img) => img.to_rgba8(),
        Err(e) => {
            eprintln!("grayscale: couldn't load {input_path}: {e}");
            std::process::exit(1);
        }
    };
    let (width, height) = rgba.dimensions();
    // RGBA8 bytes repacked as u32 pixels (r in the low byte on
    // little-endian hosts, matching the kernel's unpacking).
    let pixels: Vec<u32> = bytemuck::pod_collect_to_vec(rgba.as_raw());

    let gray = match run(&pixels, width, height) {
        Ok(gray) => gray,
        Err(e) => {
            eprintln!("grayscale: {e}");
            std::process::exit(1);
        }
    };

    let out_bytes: Vec<u8> = bytemuck::pod_collect_to_vec(&gray);
    let out_img = image::RgbaImage::from_raw(width, height, out_bytes)
        .expect("readback length matches width*height");
    if let Err(e) = out_img.save(&output_path) {
        eprintln!("grayscale: couldn't save {output_path}: {e}");
        std::process::exit(1);
    }
    println!("wrote {width}x{height} grayscale image to {output_path}");
}

fn run(pixels: &[u32], width: u32, height: u32) -> gridwave::Result<Vec<u32>> {
    let builder = KernelBuilder::new("grayscale")
        .workgroup_size(16, 16)
        .buffer_slot("src", Access::ReadOnly)
        .buffer_slot("dst", Access::ReadWrite)
        .scalar_slot::<u32>("width")
        .scalar_slot::<u32>("height");
    let mut session = ComputeSession::start(SHADER, builder)?;

    let src = session.create_input(pixels, Access::ReadOnly)?;
    let dst = session.create_output::<u32>(pixels.len())?;
    session.bind_buffer(0, src)?;
    session.bind_buffer(1, dst)?;
    session.bind_scalar(2, &width)?;
    session.bind_scalar(3, &height)?;

    session.run_once(IndexSpace::D2(width, height), None, dst)
}
