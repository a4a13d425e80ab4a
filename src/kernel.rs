// kernel.rs — kernel entry points, typed positional arguments, dispatch.
//
// RESPONSIBILITIES
// ─────────────────
//   - `KernelBuilder` declares the argument table up front: each positional
//     slot is either a buffer (with an access mode) or an inline scalar
//     (with a fixed byte size). The declaration drives the bind group
//     layout, so a binding mismatch is caught host-side before dispatch
//     instead of surfacing as an opaque device error.
//   - `Kernel::bind_*` fills slots; rebinding a slot overwrites the previous
//     value (last write wins — the feedback loop rebinds its time-delta
//     every iteration without rebuilding the kernel).
//   - `Kernel::dispatch` validates that every slot is bound and that an
//     explicit local size evenly divides the global index space, then
//     submits. Dispatch is non-blocking: it returns once the work is on the
//     queue, not once it completes.
//
// SCALAR ARGUMENTS:
// WGSL has no by-value kernel parameters, so each scalar slot becomes a
// small uniform buffer at the same binding index, rebuilt from the slot's
// stored bytes at dispatch time. The WGSL side declares one
// `var<uniform>` per scalar slot.
//
// LOCAL SIZE:
// The workgroup size is baked into the pipeline at build time, so the
// builder declares it (matching the shader's `@workgroup_size`). A
// `local` of `None` covers the global space by ceiling division — the
// shader must guard out-of-range ids. An explicit `Some(local)` must equal
// the declared size and divide the global size evenly in every dimension,
// or the dispatch is rejected before submission.

use bytemuck::Pod;

use crate::buffer::{Access, BufferId, BufferManager};
use crate::device::GpuDevice;
use crate::error::{BindingFault, ComputeError, Result};
use crate::program::Program;

// ---------------------------------------------------------------------------
// Index spaces
// ---------------------------------------------------------------------------

/// A 1- or 2-dimensional dispatch index space. The extent equals the number
/// of elements processed (particles, or width×height pixels).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSpace {
    D1(u32),
    D2(u32, u32),
}

impl IndexSpace {
    /// Extents as (x, y); 1D spaces have y = 1.
    pub fn dims(&self) -> (u32, u32) {
        match *self {
            IndexSpace::D1(x) => (x, 1),
            IndexSpace::D2(x, y) => (x, y),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            IndexSpace::D1(_) => 1,
            IndexSpace::D2(..) => 2,
        }
    }
}

/// Compute the workgroup counts for a dispatch.
///
/// `workgroup` is the size baked into the pipeline. With `local = None` the
/// global space is covered by ceiling division; with an explicit local size
/// the counts are exact and divisibility is enforced.
pub fn workgroup_counts(
    workgroup: (u32, u32),
    global: IndexSpace,
    local: Option<IndexSpace>,
) -> Result<(u32, u32)> {
    let (gx, gy) = global.dims();
    if gx == 0 || gy == 0 {
        return Err(ComputeError::DispatchRejected {
            reason: "global index space has a zero extent".into(),
        });
    }

    match local {
        None => Ok((gx.div_ceil(workgroup.0), gy.div_ceil(workgroup.1))),
        Some(local) => {
            if local.rank() != global.rank() {
                return Err(ComputeError::DispatchRejected {
                    reason: format!(
                        "local space is {}D but global space is {}D",
                        local.rank(),
                        global.rank()
                    ),
                });
            }
            let (lx, ly) = local.dims();
            if (lx, ly) != workgroup {
                return Err(ComputeError::DispatchRejected {
                    reason: format!(
                        "local size {lx}×{ly} does not match the kernel's \
                         workgroup size {}×{}",
                        workgroup.0, workgroup.1
                    ),
                });
            }
            if gx % lx != 0 || gy % ly != 0 {
                return Err(ComputeError::DispatchRejected {
                    reason: format!(
                        "local size {lx}×{ly} does not evenly divide global size {gx}×{gy}"
                    ),
                });
            }
            Ok((gx / lx, gy / ly))
        }
    }
}

// ---------------------------------------------------------------------------
// Argument table
// ---------------------------------------------------------------------------

/// What a positional argument slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Buffer { access: Access },
    Scalar { size: u64 },
}

/// One declared argument slot.
#[derive(Debug, Clone)]
pub struct SlotDescriptor {
    pub name: &'static str,
    pub kind: SlotKind,
}

#[derive(Debug, Clone)]
enum SlotValue {
    Buffer(BufferId),
    Scalar(Vec<u8>),
}

/// The positional argument table: declarations plus current bindings.
/// Pure host-side state, kept separate from the pipeline so its contracts
/// are testable without a device.
#[derive(Debug, Clone, Default)]
pub(crate) struct ArgTable {
    slots: Vec<SlotDescriptor>,
    values: Vec<Option<SlotValue>>,
}

impl ArgTable {
    fn declare(&mut self, descriptor: SlotDescriptor) {
        self.slots.push(descriptor);
        self.values.push(None);
    }

    fn descriptor(&self, slot: usize) -> Result<&SlotDescriptor> {
        self.slots.get(slot).ok_or(ComputeError::ArgumentBindingFailed {
            slot,
            fault: BindingFault::NoSuchSlot { declared: self.slots.len() },
        })
    }

    fn bind_buffer(&mut self, slot: usize, id: BufferId) -> Result<()> {
        match self.descriptor(slot)?.kind {
            SlotKind::Buffer { .. } => {
                self.values[slot] = Some(SlotValue::Buffer(id));
                Ok(())
            }
            SlotKind::Scalar { .. } => Err(ComputeError::ArgumentBindingFailed {
                slot,
                fault: BindingFault::KindMismatch { expected: "inline scalar" },
            }),
        }
    }

    fn bind_scalar(&mut self, slot: usize, bytes: &[u8]) -> Result<()> {
        match self.descriptor(slot)?.kind {
            SlotKind::Scalar { size } => {
                if size != bytes.len() as u64 {
                    return Err(ComputeError::ArgumentBindingFailed {
                        slot,
                        fault: BindingFault::SizeMismatch {
                            expected: size,
                            got: bytes.len() as u64,
                        },
                    });
                }
                // Last write wins: an existing binding is simply replaced.
                self.values[slot] = Some(SlotValue::Scalar(bytes.to_vec()));
                Ok(())
            }
            SlotKind::Buffer { .. } => Err(ComputeError::ArgumentBindingFailed {
                slot,
                fault: BindingFault::KindMismatch { expected: "buffer" },
            }),
        }
    }

    /// Every slot must be bound before a dispatch may be issued.
    fn validate_bound(&self) -> Result<()> {
        for (slot, value) in self.values.iter().enumerate() {
            if value.is_none() {
                return Err(ComputeError::ArgumentBindingFailed {
                    slot,
                    fault: BindingFault::Unbound,
                });
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn scalar_bytes(&self, slot: usize) -> Option<&[u8]> {
        match self.values.get(slot)? {
            Some(SlotValue::Scalar(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// KernelBuilder
// ---------------------------------------------------------------------------

/// Declares a kernel's entry point, workgroup size and argument table, then
/// builds the compute pipeline.
///
/// Slot indices are assigned in declaration order and must match the
/// `@binding` indices in the WGSL source.
pub struct KernelBuilder {
    entry_point: String,
    workgroup_size: (u32, u32),
    args: ArgTable,
}

impl KernelBuilder {
    pub fn new(entry_point: &str) -> Self {
        KernelBuilder {
            entry_point: entry_point.to_string(),
            workgroup_size: (64, 1),
            args: ArgTable::default(),
        }
    }

    /// Declare the workgroup size baked into the shader's
    /// `@workgroup_size`. Defaults to 64×1.
    pub fn workgroup_size(mut self, x: u32, y: u32) -> Self {
        self.workgroup_size = (x.max(1), y.max(1));
        self
    }

    /// Declare the next slot as a buffer argument.
    pub fn buffer_slot(mut self, name: &'static str, access: Access) -> Self {
        self.args.declare(SlotDescriptor { name, kind: SlotKind::Buffer { access } });
        self
    }

    /// Declare the next slot as an inline scalar of type `T`.
    pub fn scalar_slot<T: Pod>(mut self, name: &'static str) -> Self {
        self.args.declare(SlotDescriptor {
            name,
            kind: SlotKind::Scalar { size: std::mem::size_of::<T>() as u64 },
        });
        self
    }

    /// Build the compute pipeline for `entry_point` against `program`.
    ///
    /// A missing entry point or a layout/shader mismatch is a compile-class
    /// failure and surfaces the validation log.
    pub fn build(self, gpu: &GpuDevice, program: &Program) -> Result<Kernel> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = self
            .args
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| wgpu::BindGroupLayoutEntry {
                binding: i as u32,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: match slot.kind {
                    SlotKind::Buffer { access } => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage {
                            read_only: access == Access::ReadOnly,
                        },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    SlotKind::Scalar { .. } => wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                },
                count: None,
            })
            .collect();

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gridwave kernel BGL"),
            entries: &entries,
        });
        let pipeline_layout =
            gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("gridwave kernel layout"),
                bind_group_layouts: &[&bgl],
                push_constant_ranges: &[],
            });

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(self.entry_point.as_str()),
            layout: Some(&pipeline_layout),
            module: &program.module,
            entry_point: &self.entry_point,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });
        if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
            let log = err.to_string();
            eprintln!("[gridwave] kernel '{}' build log:\n{log}", self.entry_point);
            return Err(ComputeError::CompileError { log });
        }

        Ok(Kernel {
            pipeline,
            bgl,
            args: self.args,
            entry_point: self.entry_point,
            workgroup_size: self.workgroup_size,
        })
    }
}

// ---------------------------------------------------------------------------
// Kernel
// ---------------------------------------------------------------------------

/// A named entry point with its compiled pipeline and argument bindings.
#[derive(Debug)]
pub struct Kernel {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    pub(crate) args: ArgTable,
    pub entry_point: String,
    pub workgroup_size: (u32, u32),
}

impl Kernel {
    /// Bind a buffer to a positional slot. Last write wins.
    pub fn bind_buffer(&mut self, slot: usize, id: BufferId) -> Result<()> {
        self.args.bind_buffer(slot, id)
    }

    /// Bind an inline scalar to a positional slot. Last write wins; the
    /// value's byte size must match the slot declaration exactly.
    pub fn bind_scalar<T: Pod>(&mut self, slot: usize, value: &T) -> Result<()> {
        self.args.bind_scalar(slot, bytemuck::bytes_of(value))
    }

    /// Submit one launch over `global`. Returns once the work is accepted
    /// onto the queue; completion is asynchronous until a barrier.
    pub fn dispatch(
        &self,
        gpu: &GpuDevice,
        buffers: &BufferManager,
        global: IndexSpace,
        local: Option<IndexSpace>,
    ) -> Result<()> {
        self.args.validate_bound()?;
        let (count_x, count_y) = workgroup_counts(self.workgroup_size, global, local)?;

        // Scalar slots become transient uniform buffers; created first so
        // the bind group entries can borrow them.
        use wgpu::util::DeviceExt;
        let stale = |slot| ComputeError::ArgumentBindingFailed {
            slot,
            fault: BindingFault::StaleBuffer,
        };
        let mut scalar_bufs: Vec<wgpu::Buffer> = Vec::new();
        for (slot, value) in self.args.values.iter().enumerate() {
            match value {
                Some(SlotValue::Scalar(bytes)) => {
                    scalar_bufs.push(gpu.device.create_buffer_init(
                        &wgpu::util::BufferInitDescriptor {
                            label: Some(self.args.slots[slot].name),
                            contents: bytes,
                            usage: wgpu::BufferUsages::UNIFORM,
                        },
                    ));
                }
                Some(SlotValue::Buffer(id)) => {
                    let buffer = buffers.get(*id).ok_or_else(|| stale(slot))?;
                    if let SlotKind::Buffer { access: Access::ReadWrite } =
                        self.args.slots[slot].kind
                    {
                        if buffer.access == Access::ReadOnly {
                            return Err(ComputeError::ArgumentBindingFailed {
                                slot,
                                fault: BindingFault::AccessMismatch,
                            });
                        }
                    }
                }
                // validate_bound ran above.
                None => {
                    return Err(ComputeError::ArgumentBindingFailed {
                        slot,
                        fault: BindingFault::Unbound,
                    })
                }
            }
        }

        let mut next_scalar = 0usize;
        let mut entries: Vec<wgpu::BindGroupEntry> =
            Vec::with_capacity(self.args.values.len());
        for (slot, value) in self.args.values.iter().enumerate() {
            let resource = match value {
                Some(SlotValue::Buffer(id)) => {
                    buffers.get(*id).ok_or_else(|| stale(slot))?.raw.as_entire_binding()
                }
                Some(SlotValue::Scalar(_)) => {
                    let buf = &scalar_bufs[next_scalar];
                    next_scalar += 1;
                    buf.as_entire_binding()
                }
                None => {
                    return Err(ComputeError::ArgumentBindingFailed {
                        slot,
                        fault: BindingFault::Unbound,
                    })
                }
            };
            entries.push(wgpu::BindGroupEntry { binding: slot as u32, resource });
        }

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gridwave kernel BG"),
            layout: &self.bgl,
            entries: &entries,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gridwave dispatch"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(self.entry_point.as_str()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(count_x, count_y, 1);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn particle_args() -> ArgTable {
        let mut args = ArgTable::default();
        args.declare(SlotDescriptor {
            name: "positions",
            kind: SlotKind::Buffer { access: Access::ReadWrite },
        });
        args.declare(SlotDescriptor {
            name: "dt",
            kind: SlotKind::Scalar { size: 4 },
        });
        args.declare(SlotDescriptor {
            name: "gravity",
            kind: SlotKind::Scalar { size: 8 },
        });
        args
    }

    // ---- binding contracts --------------------------------------------------

    #[test]
    fn rebinding_a_scalar_is_last_write_wins() {
        let mut args = particle_args();
        args.bind_scalar(1, bytemuck::bytes_of(&0.033f32)).unwrap();
        args.bind_scalar(1, bytemuck::bytes_of(&0.16f32)).unwrap();
        let bytes = args.scalar_bytes(1).unwrap();
        assert_eq!(bytes, bytemuck::bytes_of(&0.16f32));
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut args = particle_args();
        let err = args.bind_scalar(7, &[0u8; 4]).unwrap_err();
        match err {
            ComputeError::ArgumentBindingFailed { slot: 7, fault } => {
                assert_eq!(fault, BindingFault::NoSuchSlot { declared: 3 });
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn scalar_size_must_match_declaration() {
        let mut args = particle_args();
        // gravity is declared as 8 bytes (vec2<f32>); a bare f32 is wrong.
        let err = args.bind_scalar(2, bytemuck::bytes_of(&1.0f32)).unwrap_err();
        match err {
            ComputeError::ArgumentBindingFailed { slot: 2, fault } => {
                assert_eq!(fault, BindingFault::SizeMismatch { expected: 8, got: 4 });
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn buffer_and_scalar_slots_are_not_interchangeable() {
        let mut args = particle_args();
        let err = args.bind_scalar(0, &[0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::ArgumentBindingFailed {
                slot: 0,
                fault: BindingFault::KindMismatch { expected: "buffer" }
            }
        ));

        let err = args.bind_buffer(1, BufferId(0)).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::ArgumentBindingFailed {
                slot: 1,
                fault: BindingFault::KindMismatch { expected: "inline scalar" }
            }
        ));
    }

    #[test]
    fn dispatch_requires_every_slot_bound() {
        let mut args = particle_args();
        args.bind_buffer(0, BufferId(0)).unwrap();
        args.bind_scalar(1, bytemuck::bytes_of(&0.033f32)).unwrap();
        // Slot 2 (gravity) left unbound.
        let err = args.validate_bound().unwrap_err();
        assert!(matches!(
            err,
            ComputeError::ArgumentBindingFailed { slot: 2, fault: BindingFault::Unbound }
        ));

        args.bind_scalar(2, bytemuck::bytes_of(&[0.0f32, 9.8])).unwrap();
        args.validate_bound().unwrap();
    }

    // ---- workgroup count math ----------------------------------------------

    #[test]
    fn explicit_local_size_gives_exact_counts() {
        // The vector-add scenario: 512 elements, local size 4.
        let counts = workgroup_counts((4, 1), IndexSpace::D1(512), Some(IndexSpace::D1(4)));
        assert_eq!(counts.unwrap(), (128, 1));
    }

    #[test]
    fn default_local_size_covers_by_ceiling_division() {
        let counts = workgroup_counts((64, 1), IndexSpace::D1(1000), None).unwrap();
        assert_eq!(counts, (16, 1)); // 16 × 64 = 1024 ≥ 1000

        let counts = workgroup_counts((16, 16), IndexSpace::D2(100, 100), None).unwrap();
        assert_eq!(counts, (7, 7));
    }

    #[test]
    fn local_size_must_divide_global_evenly() {
        let err =
            workgroup_counts((4, 1), IndexSpace::D1(510), Some(IndexSpace::D1(4))).unwrap_err();
        assert!(matches!(err, ComputeError::DispatchRejected { .. }));
    }

    #[test]
    fn local_size_must_match_pipeline_workgroup() {
        let err =
            workgroup_counts((4, 1), IndexSpace::D1(512), Some(IndexSpace::D1(8))).unwrap_err();
        match err {
            ComputeError::DispatchRejected { reason } => {
                assert!(reason.contains("workgroup size"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn local_rank_must_match_global_rank() {
        let err = workgroup_counts(
            (4, 4),
            IndexSpace::D2(16, 16),
            Some(IndexSpace::D1(4)),
        )
        .unwrap_err();
        assert!(matches!(err, ComputeError::DispatchRejected { .. }));
    }

    #[test]
    fn zero_extent_global_space_is_rejected() {
        let err = workgroup_counts((4, 1), IndexSpace::D2(16, 0), None).unwrap_err();
        assert!(matches!(err, ComputeError::DispatchRejected { .. }));
    }
}
