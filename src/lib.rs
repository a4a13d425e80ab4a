// Gridwave: host-side compute session runtime on wgpu.
//
// One generalized implementation of the dispatch/feedback pattern that
// numeric GPU demos keep rebuilding by hand: select a device, compile a
// kernel from source, mirror host arrays into device buffers, bind typed
// positional arguments, launch over a 1D/2D index space, and read results
// back behind an explicit completion barrier. Real-time workloads wrap the
// session in `FeedbackLoop`, which feeds each iteration's measured wall
// time back as the next step's time delta.
//
// Batch demos (vector add, matrix multiply, image filters) and simulation
// demos (particles) live in demos/ and drive everything through this crate.

pub mod buffer;
pub mod device;
pub mod error;
pub mod feedback;
pub mod kernel;
pub mod program;
pub mod session;

pub use buffer::{Access, BufferId, BufferManager};
pub use device::{AdapterInfo, GpuDevice};
pub use error::{BindingFault, ComputeError, Result};
pub use feedback::{
    FeedbackLoop, FrameTimer, LoopReport, LoopState, Simulation, Visualizer, WallTimer,
};
pub use kernel::{IndexSpace, Kernel, KernelBuilder, SlotKind};
pub use program::Program;
pub use session::ComputeSession;
