// demos/matrix_mul.rs — one-shot matrix product over a 2D index space.
//
// A 4×3 matrix times a 3×5 matrix with small integer entries, dispatched
// with one invocation per output cell and checked exactly against a
// triple-loop host reference (integer-valued floats, so equality is exact).
//
// Usage:
//   cargo run --example matrix_mul

use gridwave::{Access, ComputeSession, IndexSpace, KernelBuilder};

const M: usize = 4; // rows of A
const N: usize = 3; // cols of A == rows of B
const K: usize = 5; // cols of B

const SHADER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/matrix_mul.wgsl");

fn main() {
    if let Err(e) = run() {
        eprintln!("matrix_mul: {e}");
        std::process::exit(1);
    }
}

#[rustfmt::skip]
fn inputs() -> (Vec<f32>, Vec<f32>) {
    let a = vec![
        1.0, 2.0, 3.0,
        4.0, 5.0, 6.0,
        7.0, 8.0, 9.0,
        1.0, 0.0, 2.0,
    ];
    let b = vec![
        1.0, 0.0, 2.0, 1.0, 3.0,
        0.0, 1.0, 1.0, 2.0, 0.0,
        2.0, 1.0, 0.0, 1.0, 1.0,
    ];
    (a, b)
}

fn reference(a: &[f32], b: &[f32]) -> Vec<f32> {
    let mut out = vec![0.0f32; M * K];
    for row in 0..M {
        for col in 0..K {
            let mut acc = 0.0;
            for i in 0..N {
                acc += a[row * N + i] * b[i * K + col];
            }
            out[row * K + col] = acc;
        }
    }
    out
}

fn run() -> gridwave::Result<()> {
    let builder = KernelBuilder::new("matrix_mul")
        .workgroup_size(1, 1)
        .buffer_slot("a", Access::ReadOnly)
        .buffer_slot("b", Access::ReadOnly)
        .scalar_slot::<u32>("m")
        .scalar_slot::<u32>("n")
        .scalar_slot::<u32>("k")
        .buffer_slot("result", Access::ReadWrite);
    let mut session = ComputeSession::start(SHADER, builder)?;

    let (matrix_a, matrix_b) = inputs();
    let a = session.create_input(&matrix_a, Access::ReadOnly)?;
    let b = session.create_input(&matrix_b, Access::ReadOnly)?;
    let out = session.create_output::<f32>(M * K)?;

    session.bind_buffer(0, a)?;
    session.bind_buffer(1, b)?;
    session.bind_scalar(2, &(M as u32))?;
    session.bind_scalar(3, &(N as u32))?;
    session.bind_scalar(4, &(K as u32))?;
    session.bind_buffer(5, out)?;

    let product: Vec<f32> =
        session.run_once(IndexSpace::D2(M as u32, K as u32), None, out)?;

    let expected = reference(&matrix_a, &matrix_b);
    if product != expected {
        eprintln!("product mismatch:\n  expected {expected:?}\n  got      {product:?}");
        std::process::exit(1);
    }

    println!("correctly multiplied {M}x{N} by {N}x{K}:");
    for row in 0..M {
        println!("  {:?}", &product[row * K..(row + 1) * K]);
    }
    Ok(())
}
