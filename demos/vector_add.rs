// demos/vector_add.rs — one-shot elementwise vector addition.
//
// The smallest end-to-end session: 512 floats of 1.0 plus 512 of 2.0,
// dispatched with an explicit local size of 4, read back and verified
// against the host-computed reference. Exit code 0 on agreement, 1 on any
// setup failure or mismatch.
//
// Usage:
//   cargo run --example vector_add

use gridwave::{Access, ComputeSession, IndexSpace, KernelBuilder};

const NUM_VALUES: usize = 512;
const LOCAL_SIZE: u32 = 4;

const SHADER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/vector_add.wgsl");

fn main() {
    if let Err(e) = run() {
        eprintln!("vector_add: {e}");
        std::process::exit(1);
    }
}

fn run() -> gridwave::Result<()> {
    let builder = KernelBuilder::new("vectors_add")
        .workgroup_size(LOCAL_SIZE, 1)
        .buffer_slot("a", Access::ReadOnly)
        .buffer_slot("b", Access::ReadOnly)
        .buffer_slot("result", Access::ReadWrite);
    let mut session = ComputeSession::start(SHADER, builder)?;

    let vector_a = vec![1.0f32; NUM_VALUES];
    let vector_b = vec![2.0f32; NUM_VALUES];

    let a = session.create_input(&vector_a, Access::ReadOnly)?;
    let b = session.create_input(&vector_b, Access::ReadOnly)?;
    let out = session.create_output::<f32>(NUM_VALUES)?;

    session.bind_buffer(0, a)?;
    session.bind_buffer(1, b)?;
    session.bind_buffer(2, out)?;

    let output: Vec<f32> = session.run_once(
        IndexSpace::D1(NUM_VALUES as u32),
        Some(IndexSpace::D1(LOCAL_SIZE)),
        out,
    )?;

    // Host reference.
    let mut mismatches = 0;
    for (i, (&got, (&x, &y))) in output.iter().zip(vector_a.iter().zip(&vector_b)).enumerate() {
        let expected = x + y;
        if got != expected {
            if mismatches == 0 {
                eprintln!("first mismatch at [{i}]: {expected} != {got}");
            }
            mismatches += 1;
        }
    }

    // Buffers released before the session tears down, last created first.
    session.release(out)?;
    session.release(b)?;
    session.release(a)?;

    if mismatches > 0 {
        eprintln!("failed to correctly add vectors ({mismatches} mismatches)");
        std::process::exit(1);
    }
    println!("correctly added {NUM_VALUES} values");
    Ok(())
}
