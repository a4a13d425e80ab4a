// feedback.rs — the real-time dispatch/readback/present feedback loop.
//
// The simulation demos run continuously: dispatch a step, read the state
// back, hand it to a visualizer, repeat until the user cancels. The time
// delta injected into iteration k is the measured wall time of iteration
// k−1 — dispatch + readback + presentation hand-off together. This is a
// deliberate closed loop: simulation speed couples to host round-trip
// latency, so a slow frame produces a proportionally larger simulated step
// and perceived motion speed stays roughly constant. The cost is numerical
// accuracy under load; that trade-off is by contract, not an accident.
//
// The first iteration has no prior measurement and uses a caller-supplied
// seed delta.
//
// STATE MACHINE
// ──────────────
//   Idle → Running      on run()
//   Running → Stopping  when the visualizer reports cancellation (checked
//                       once per iteration — never mid-flight)
//   Stopping → Terminated  after the simulation (and its session) is dropped
//
// A step error also terminates the loop; the session's resources unwind
// through the same drop path.
//
// SEAMS
// ──────
// `Simulation` and `Visualizer` keep the loop free of device and window
// types, and `FrameTimer` isolates the wall clock so the delta-injection
// sequence is testable with a scripted timer.

use std::time::{Duration, Instant};

use crate::error::Result;

/// One simulated step: rebind the time delta, dispatch, read back, return
/// the frame the visualizer needs.
pub trait Simulation {
    type Frame;
    fn step(&mut self, dt: f32) -> Result<Self::Frame>;
}

/// External presentation collaborator. Returns `true` to continue, `false`
/// to request a stop. The loop honors a stop at the iteration boundary.
pub trait Visualizer<F> {
    fn present(&mut self, frame: &F) -> bool;
}

/// Wall-clock seam. The default implementation measures real elapsed time;
/// tests substitute a scripted one.
pub trait FrameTimer {
    fn restart(&mut self);
    fn elapsed(&mut self) -> Duration;
}

/// Real wall-clock timer.
pub struct WallTimer(Instant);

impl WallTimer {
    pub fn start() -> Self {
        WallTimer(Instant::now())
    }
}

impl FrameTimer for WallTimer {
    fn restart(&mut self) {
        self.0 = Instant::now();
    }

    fn elapsed(&mut self) -> Duration {
        self.0.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Terminated,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy)]
pub struct LoopReport {
    /// Iterations completed (dispatch + present pairs).
    pub frames: u64,
    /// The delta that would have fed the next iteration, in seconds.
    pub last_dt: f32,
}

/// Drives a [`Simulation`] against a [`Visualizer`] until cancellation.
pub struct FeedbackLoop {
    seed_dt: f32,
    state: LoopState,
}

impl FeedbackLoop {
    /// `seed_dt` (seconds) is injected into the first iteration only.
    pub fn new(seed_dt: f32) -> Self {
        FeedbackLoop { seed_dt, state: LoopState::Idle }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run to completion with the wall clock. Takes the simulation by value:
    /// when the loop leaves `Running` it drops the simulation — and with it
    /// the compute session's whole resource set — before reporting
    /// `Terminated`.
    pub fn run<S, V>(&mut self, sim: S, vis: &mut V) -> Result<LoopReport>
    where
        S: Simulation,
        V: Visualizer<S::Frame>,
    {
        self.run_with_timer(sim, vis, WallTimer::start())
    }

    pub fn run_with_timer<S, V, T>(
        &mut self,
        mut sim: S,
        vis: &mut V,
        mut timer: T,
    ) -> Result<LoopReport>
    where
        S: Simulation,
        V: Visualizer<S::Frame>,
        T: FrameTimer,
    {
        self.state = LoopState::Running;
        let mut dt = self.seed_dt;
        let mut frames: u64 = 0;

        let outcome = loop {
            timer.restart();

            // Step = rebind dt, dispatch, readback behind the barrier.
            let frame = match sim.step(dt) {
                Ok(frame) => frame,
                Err(e) => break Err(e),
            };
            let keep_going = vis.present(&frame);

            // Next iteration's delta is this iteration's full round trip.
            dt = timer.elapsed().as_secs_f32();
            frames += 1;

            if !keep_going {
                self.state = LoopState::Stopping;
                break Ok(LoopReport { frames, last_dt: dt });
            }
        };

        // Release the session's resources, then report terminated. The
        // error path unwinds through the same drop.
        drop(sim);
        self.state = LoopState::Terminated;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComputeError;

    /// Records every injected delta; fails on request.
    struct FakeSim {
        seen_dts: std::rc::Rc<std::cell::RefCell<Vec<f32>>>,
        fail_on_step: Option<u64>,
        steps: u64,
    }

    impl Simulation for FakeSim {
        type Frame = u64;

        fn step(&mut self, dt: f32) -> Result<u64> {
            if self.fail_on_step == Some(self.steps) {
                return Err(ComputeError::DispatchRejected { reason: "scripted".into() });
            }
            self.seen_dts.borrow_mut().push(dt);
            self.steps += 1;
            Ok(self.steps)
        }
    }

    /// Continues for `frames_left` frames, then requests a stop.
    struct CountdownVisualizer {
        frames_left: u64,
    }

    impl Visualizer<u64> for CountdownVisualizer {
        fn present(&mut self, _frame: &u64) -> bool {
            self.frames_left -= 1;
            self.frames_left > 0
        }
    }

    /// Returns scripted durations in order.
    struct ScriptedTimer {
        durations: Vec<Duration>,
        next: usize,
    }

    impl FrameTimer for ScriptedTimer {
        fn restart(&mut self) {}

        fn elapsed(&mut self) -> Duration {
            let d = self.durations[self.next];
            self.next += 1;
            d
        }
    }

    fn fake_sim(log: &std::rc::Rc<std::cell::RefCell<Vec<f32>>>) -> FakeSim {
        FakeSim {
            seen_dts: std::rc::Rc::clone(log),
            fail_on_step: None,
            steps: 0,
        }
    }

    #[test]
    fn iteration_k_uses_measured_time_of_k_minus_1() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let timer = ScriptedTimer {
            durations: vec![
                Duration::from_millis(10),
                Duration::from_millis(40),
                Duration::from_millis(20),
            ],
            next: 0,
        };

        let mut fl = FeedbackLoop::new(0.016);
        let report = fl
            .run_with_timer(fake_sim(&log), &mut CountdownVisualizer { frames_left: 3 }, timer)
            .unwrap();

        // Iteration 0 sees the seed; k sees the measured wall time of k−1.
        assert_eq!(*log.borrow(), vec![0.016, 0.010, 0.040]);
        assert_eq!(report.frames, 3);
        assert!((report.last_dt - 0.020).abs() < 1e-6);
    }

    #[test]
    fn loop_starts_idle_and_ends_terminated() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut fl = FeedbackLoop::new(0.0);
        assert_eq!(fl.state(), LoopState::Idle);

        let timer = ScriptedTimer { durations: vec![Duration::from_millis(1)], next: 0 };
        fl.run_with_timer(fake_sim(&log), &mut CountdownVisualizer { frames_left: 1 }, timer)
            .unwrap();
        assert_eq!(fl.state(), LoopState::Terminated);
    }

    #[test]
    fn stop_is_honored_at_the_iteration_boundary() {
        // The visualizer cancels on the very first frame: exactly one step
        // runs, never zero, never two.
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let timer = ScriptedTimer { durations: vec![Duration::from_millis(5)], next: 0 };

        let mut fl = FeedbackLoop::new(0.033);
        let report = fl
            .run_with_timer(fake_sim(&log), &mut CountdownVisualizer { frames_left: 1 }, timer)
            .unwrap();
        assert_eq!(report.frames, 1);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn step_error_terminates_the_loop() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut sim = fake_sim(&log);
        sim.fail_on_step = Some(2);

        let timer = ScriptedTimer {
            durations: vec![Duration::from_millis(1); 8],
            next: 0,
        };
        let mut fl = FeedbackLoop::new(0.0);
        let err = fl
            .run_with_timer(sim, &mut CountdownVisualizer { frames_left: 100 }, timer)
            .unwrap_err();
        assert!(matches!(err, ComputeError::DispatchRejected { .. }));
        assert_eq!(fl.state(), LoopState::Terminated);
        assert_eq!(log.borrow().len(), 2); // steps 0 and 1 ran, 2 failed
    }
}
