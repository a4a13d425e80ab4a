// benches/host.rs -- Host-side overhead benchmarks.
//
// Everything here runs without an adapter: argument-table declaration,
// dispatch-shape math, and the feedback loop's per-iteration bookkeeping.
// The point is to keep the host side of a dispatch negligible next to the
// device round trip it wraps.
//
//   cargo bench

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use gridwave::kernel::workgroup_counts;
use gridwave::{
    Access, FeedbackLoop, FrameTimer, IndexSpace, KernelBuilder, Result, Simulation, Visualizer,
};

// ============================================================
// Kernel declaration
// ============================================================

fn bench_kernel_declaration(c: &mut Criterion) {
    let mut group = c.benchmark_group("declaration");
    // The particle kernel's table: two buffers, four scalars.
    group.bench_function("particle_arg_table", |b| {
        b.iter(|| {
            KernelBuilder::new(black_box("simulate"))
                .workgroup_size(64, 1)
                .buffer_slot("positions", Access::ReadWrite)
                .buffer_slot("velocities", Access::ReadWrite)
                .scalar_slot::<f32>("dt")
                .scalar_slot::<[f32; 2]>("gravity")
                .scalar_slot::<[f32; 4]>("bounds")
                .scalar_slot::<f32>("bounce")
        })
    });
    group.finish();
}

// ============================================================
// Dispatch-shape math
// ============================================================

fn bench_workgroup_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("workgroup_counts");

    group.bench_function("1d_explicit_local", |b| {
        b.iter(|| workgroup_counts((4, 1), black_box(IndexSpace::D1(512)), Some(IndexSpace::D1(4))))
    });
    for extent in [1_000u32, 1_000_000] {
        group.bench_function(BenchmarkId::new("1d_ceil", extent), |b| {
            b.iter(|| workgroup_counts((64, 1), black_box(IndexSpace::D1(extent)), None))
        });
    }
    group.bench_function("2d_ceil_1080p", |b| {
        b.iter(|| workgroup_counts((16, 16), black_box(IndexSpace::D2(1920, 1080)), None))
    });
    group.finish();
}

// ============================================================
// Feedback loop bookkeeping
// ============================================================

/// Step that does no device work, so the bench isolates loop overhead.
struct NullSim;

impl Simulation for NullSim {
    type Frame = f32;

    fn step(&mut self, dt: f32) -> Result<f32> {
        Ok(dt)
    }
}

struct CountdownVisualizer {
    frames_left: u64,
}

impl Visualizer<f32> for CountdownVisualizer {
    fn present(&mut self, frame: &f32) -> bool {
        black_box(*frame);
        self.frames_left -= 1;
        self.frames_left > 0
    }
}

/// Constant timer so the measured cost is the loop itself, not the clock.
struct FixedTimer;

impl FrameTimer for FixedTimer {
    fn restart(&mut self) {}

    fn elapsed(&mut self) -> Duration {
        Duration::from_millis(16)
    }
}

fn bench_feedback_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("feedback");
    group.bench_function("1000_iterations", |b| {
        b.iter(|| {
            let mut fl = FeedbackLoop::new(0.016);
            fl.run_with_timer(NullSim, &mut CountdownVisualizer { frames_left: 1000 }, FixedTimer)
        })
    });
    group.finish();
}

// ============================================================
// Register
// ============================================================

criterion_group!(
    benches,
    bench_kernel_declaration,
    bench_workgroup_counts,
    bench_feedback_loop,
);
criterion_main!(benches);
