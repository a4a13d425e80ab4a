// demos/particles.rs — real-time particle simulation with the feedback loop.
//
// Gravity + wall-bounce particles integrated on the device, positions read
// back every frame and drawn into a minifb window. The per-frame time delta
// is not a fixed clock: FeedbackLoop injects the measured wall time of the
// previous iteration (dispatch + readback + draw), so motion speed stays
// roughly constant when frames get slow, at the cost of integration
// accuracy — the documented trade-off.
//
// Initial particle state comes from a seedable generator, so a given seed
// always produces the same run.
//
// Usage:
//   cargo run --release --example particles -- [num_particles] [seed]
//
// Controls:
//   Q/Esc — quit

use std::env;
use std::time::Instant;

use minifb::{Key, Window, WindowOptions};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gridwave::{
    Access, BufferId, ComputeSession, FeedbackLoop, IndexSpace, KernelBuilder, Simulation,
    Visualizer,
};

const SHADER: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/particles.wgsl");

const WIDTH: usize = 512;
const HEIGHT: usize = 512;
const PARTICLE_RADIUS: i32 = 2;

const GRAVITY: [f32; 2] = [0.0, 300.0];
const BOUNCE_FACTOR: f32 = 0.9;
const START_SPEED: f32 = 60.0;
const SEED_DT: f32 = 0.016;

fn main() {
    let args: Vec<String> = env::args().collect();
    let num_particles: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let seed: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(42);

    if let Err(e) = run(num_particles, seed) {
        eprintln!("particles: {e}");
        std::process::exit(1);
    }
}

fn run(num_particles: usize, seed: u64) -> gridwave::Result<()> {
    // Deterministic initial state: positions anywhere in the box,
    // velocities up to START_SPEED in each axis.
    let mut rng = StdRng::seed_from_u64(seed);
    let positions: Vec<[f32; 2]> = (0..num_particles)
        .map(|_| [rng.gen_range(0.0..WIDTH as f32), rng.gen_range(0.0..HEIGHT as f32)])
        .collect();
    let velocities: Vec<[f32; 2]> = (0..num_particles)
        .map(|_| {
            [
                rng.gen_range(-START_SPEED..START_SPEED),
                rng.gen_range(-START_SPEED..START_SPEED),
            ]
        })
        .collect();

    let builder = KernelBuilder::new("simulate")
        .workgroup_size(64, 1)
        .buffer_slot("positions", Access::ReadWrite)
        .buffer_slot("velocities", Access::ReadWrite)
        .scalar_slot::<f32>("dt")
        .scalar_slot::<[f32; 2]>("gravity")
        .scalar_slot::<[f32; 4]>("bounds")
        .scalar_slot::<f32>("bounce");
    let mut session = ComputeSession::start(SHADER, builder)?;

    let pos_buf = session.create_input(&positions, Access::ReadWrite)?;
    let vel_buf = session.create_input(&velocities, Access::ReadWrite)?;
    session.bind_buffer(0, pos_buf)?;
    session.bind_buffer(1, vel_buf)?;
    session.bind_scalar(2, &SEED_DT)?;
    session.bind_scalar(3, &GRAVITY)?;
    // Bounds: (min_x, max_x, min_y, max_y).
    session.bind_scalar(4, &[0.0f32, WIDTH as f32, 0.0, HEIGHT as f32])?;
    session.bind_scalar(5, &BOUNCE_FACTOR)?;

    let sim = ParticleSim { session, pos_buf, count: num_particles as u32 };

    let mut window = Window::new(
        "Gridwave — Particles",
        WIDTH,
        HEIGHT,
        WindowOptions::default(),
    )
    .expect("failed to create window");
    window.set_target_fps(60);

    let mut vis = ParticleWindow {
        window,
        fb: vec![0u32; WIDTH * HEIGHT],
        frames: 0,
        started: Instant::now(),
    };

    let report = FeedbackLoop::new(SEED_DT).run(sim, &mut vis)?;
    println!(
        "\n{} frames, last dt {:.1} ms",
        report.frames,
        report.last_dt * 1000.0
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Simulation side: one dispatch + positions readback per step
// ---------------------------------------------------------------------------

struct ParticleSim {
    session: ComputeSession,
    pos_buf: BufferId,
    count: u32,
}

impl Simulation for ParticleSim {
    type Frame = Vec<[f32; 2]>;

    fn step(&mut self, dt: f32) -> gridwave::Result<Vec<[f32; 2]>> {
        // Last write wins: only the dt slot changes between iterations.
        self.session.bind_scalar(2, &dt)?;
        self.session.dispatch(IndexSpace::D1(self.count), None)?;
        // read_back barriers before exposing the positions.
        self.session.read_back(self.pos_buf)
    }
}

// ---------------------------------------------------------------------------
// Visualizer side: software framebuffer in a minifb window
// ---------------------------------------------------------------------------

struct ParticleWindow {
    window: Window,
    fb: Vec<u32>,
    frames: u64,
    started: Instant,
}

impl Visualizer<Vec<[f32; 2]>> for ParticleWindow {
    fn present(&mut self, frame: &Vec<[f32; 2]>) -> bool {
        self.fb.fill(0x00000000);
        for p in frame {
            draw_circle(
                &mut self.fb,
                WIDTH,
                HEIGHT,
                p[0] as i32,
                p[1] as i32,
                PARTICLE_RADIUS,
                0x00FF4040,
            );
        }
        self.window
            .update_with_buffer(&self.fb, WIDTH, HEIGHT)
            .expect("window update failed");

        self.frames += 1;
        if self.frames % 60 == 0 {
            let fps = self.frames as f64 / self.started.elapsed().as_secs_f64();
            print!("\r{} frames, {:.1} fps  ", self.frames, fps);
        }

        self.window.is_open()
            && !self.window.is_key_down(Key::Escape)
            && !self.window.is_key_down(Key::Q)
    }
}

/// Draw a filled circle into the packed-RGB framebuffer.
fn draw_circle(fb: &mut [u32], w: usize, h: usize, cx: i32, cy: i32, r: i32, color: u32) {
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                let px = cx + dx;
                let py = cy + dy;
                if px >= 0 && py >= 0 && (px as usize) < w && (py as usize) < h {
                    fb[py as usize * w + px as usize] = color;
                }
            }
        }
    }
}
