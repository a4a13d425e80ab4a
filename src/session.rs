// session.rs — the compute session: one device run, owned end to end.
//
// A ComputeSession composes device selection, program compilation, kernel
// construction and buffer management into the initialize → bind → dispatch
// → sync lifecycle. It owns every handle for the run; nothing is global and
// nothing is shared with another session.
//
// TEARDOWN ORDER
// ───────────────
// Resources must be released in reverse order of acquisition: kernel, then
// buffers, then queue, then program, then the device context. Rust drops
// struct fields in declaration order (top → bottom), so the field order of
// `ComputeSession` *is* the teardown sequence — `kernel` and `buffers`
// before `program`, and `gpu` (queue + device + instance) last. Early
// failure paths get the same guarantee for free: whatever a failed
// constructor created locally is dropped in reverse on the way out, and
// steps never reached have nothing to release.

use std::path::Path;

use bytemuck::Pod;

use crate::buffer::{Access, BufferId, BufferManager};
use crate::device::GpuDevice;
use crate::error::Result;
use crate::kernel::{IndexSpace, Kernel, KernelBuilder};
use crate::program::{read_source, Program};

/// One logical compute run: device, compiled program, kernel, buffers.
///
/// # Example
/// ```no_run
/// use gridwave::{Access, ComputeSession, IndexSpace, KernelBuilder};
///
/// let builder = KernelBuilder::new("vectors_add")
///     .workgroup_size(4, 1)
///     .buffer_slot("a", Access::ReadOnly)
///     .buffer_slot("b", Access::ReadOnly)
///     .buffer_slot("out", Access::ReadWrite);
/// let mut session = ComputeSession::start("shaders/vector_add.wgsl", builder)?;
///
/// let a = session.create_input(&[1.0f32; 512], Access::ReadOnly)?;
/// let b = session.create_input(&[2.0f32; 512], Access::ReadOnly)?;
/// let out = session.create_output::<f32>(512)?;
/// session.bind_buffer(0, a)?;
/// session.bind_buffer(1, b)?;
/// session.bind_buffer(2, out)?;
///
/// let sums: Vec<f32> =
///     session.run_once(IndexSpace::D1(512), Some(IndexSpace::D1(4)), out)?;
/// # Ok::<(), gridwave::ComputeError>(())
/// ```
pub struct ComputeSession {
    // Field order is the teardown order. Do not reorder.
    kernel: Kernel,
    buffers: BufferManager,
    program: Program,
    gpu: GpuDevice,
}

impl ComputeSession {
    /// Start a session: read the kernel source, select a device, compile,
    /// and build the kernel described by `builder`.
    ///
    /// The source file is read *before* any device resource is created, so
    /// a missing or unreadable file fails with zero device state.
    pub fn start(source_path: impl AsRef<Path>, builder: KernelBuilder) -> Result<Self> {
        let source_path = source_path.as_ref();
        let source = read_source(source_path)?;

        let gpu = GpuDevice::select()?;
        let mut program = Program::from_source(&gpu, &source)?;
        program.source_path = Some(source_path.to_path_buf());
        let kernel = builder.build(&gpu, &program)?;

        Ok(ComputeSession {
            kernel,
            buffers: BufferManager::new(),
            program,
            gpu,
        })
    }

    /// Assemble a session from already-built parts. Useful when the caller
    /// selected the device itself (e.g. to log adapter details first).
    pub fn from_parts(gpu: GpuDevice, program: Program, kernel: Kernel) -> Self {
        ComputeSession {
            kernel,
            buffers: BufferManager::new(),
            program,
            gpu,
        }
    }

    // -- buffers ------------------------------------------------------------

    pub fn create_input<T: Pod>(&mut self, data: &[T], access: Access) -> Result<BufferId> {
        self.buffers.create_input(&self.gpu, data, access)
    }

    pub fn create_output<T: Pod>(&mut self, len: usize) -> Result<BufferId> {
        self.buffers.create_output::<T>(&self.gpu, len)
    }

    /// Release a buffer before session teardown. Releasing twice is a
    /// caller error, not a no-op.
    pub fn release(&mut self, id: BufferId) -> Result<()> {
        self.buffers.release(id)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.live_count()
    }

    // -- kernel arguments ---------------------------------------------------

    pub fn bind_buffer(&mut self, slot: usize, id: BufferId) -> Result<()> {
        self.kernel.bind_buffer(slot, id)
    }

    pub fn bind_scalar<T: Pod>(&mut self, slot: usize, value: &T) -> Result<()> {
        self.kernel.bind_scalar(slot, value)
    }

    // -- dispatch and synchronization ----------------------------------------

    /// Submit one kernel launch. Non-blocking.
    pub fn dispatch(&self, global: IndexSpace, local: Option<IndexSpace>) -> Result<()> {
        self.kernel.dispatch(&self.gpu, &self.buffers, global, local)
    }

    /// Queue-wide completion barrier.
    pub fn barrier(&self) {
        self.gpu.barrier();
    }

    /// Read a buffer back to the host. Always barriers first — a read whose
    /// copy is unconfirmed is never exposed as valid data.
    pub fn read_back<T: Pod>(&self, id: BufferId) -> Result<Vec<T>> {
        self.buffers.read_back(&self.gpu, id)
    }

    /// One-shot convenience: dispatch, barrier, and read back `out`.
    pub fn run_once<T: Pod>(
        &self,
        global: IndexSpace,
        local: Option<IndexSpace>,
        out: BufferId,
    ) -> Result<Vec<T>> {
        self.dispatch(global, local)?;
        self.read_back(out)
    }

    pub fn gpu(&self) -> &GpuDevice {
        &self.gpu
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    // The teardown contract leans on Rust dropping fields in declaration
    // order. That is guaranteed by the language, but it is load-bearing
    // here, so pin it with probes shaped like ComputeSession's fields.

    struct DropProbe {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Drop for DropProbe {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    struct SessionShaped {
        _kernel: DropProbe,
        _buffers: DropProbe,
        _program: DropProbe,
        _gpu: DropProbe,
    }

    #[test]
    fn fields_drop_in_declaration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let probe = |name| DropProbe { name, log: Rc::clone(&log) };

        let session = SessionShaped {
            _kernel: probe("kernel"),
            _buffers: probe("buffers"),
            _program: probe("program"),
            _gpu: probe("context"),
        };
        drop(session);

        assert_eq!(*log.borrow(), vec!["kernel", "buffers", "program", "context"]);
    }

    #[test]
    fn early_failure_releases_only_what_exists() {
        // Mirror of ComputeSession::start's failure path: locals created
        // before the failing step drop in reverse; later steps never ran.
        let log = Rc::new(RefCell::new(Vec::new()));
        let probe = |name| DropProbe { name, log: Rc::clone(&log) };

        let result: Result<SessionShaped, ()> = (|| {
            let gpu = probe("context");
            let program = probe("program");
            Err(())?; // kernel build fails
            Ok(SessionShaped {
                _kernel: probe("kernel"),
                _buffers: probe("buffers"),
                _program: program,
                _gpu: gpu,
            })
        })();

        assert!(result.is_err());
        // Reverse of acquisition, and nothing that was never created.
        assert_eq!(*log.borrow(), vec!["program", "context"]);
    }
}
