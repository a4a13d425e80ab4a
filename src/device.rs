// device.rs — compute device selection and queue ownership.
//
// RESPONSIBILITIES
// ─────────────────
//   - Enumerate adapters and select one, preferring real GPU hardware and
//     falling back to a CPU-class adapter (software rasterizer) when no GPU
//     is present. The fallback is a designed alternative, not a retry: any
//     other enumeration failure is fatal to the process run.
//   - Own the wgpu Instance, Device and Queue for exactly one session's
//     lifetime. Nothing is shared across sessions.
//   - Expose `barrier()` — the queue-wide completion wait that must precede
//     any host read of device-written memory.
//
// ADAPTER SELECTION:
// `request_adapter`'s power-preference heuristics may grab a software
// rasterizer even when hardware exists, so we enumerate explicitly and pick
// in tiers: discrete/integrated/virtual GPU first, then anything that is
// left (llvmpipe etc.). The chosen adapter is logged so a surprising pick is
// visible at startup.

use std::fmt;

use crate::error::{ComputeError, Result};

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl AdapterInfo {
    /// True when the selected adapter is a CPU-class (software) device.
    pub fn is_cpu_fallback(&self) -> bool {
        self.device_type == wgpu::DeviceType::Cpu
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The selected compute device: adapter info, device handle, command queue.
///
/// Create via [`GpuDevice::select`]. One `GpuDevice` per session; it is
/// expensive to create and owns an exclusive resource set.
///
/// # Field drop order
/// Rust drops struct fields in declaration order (top → bottom), which here
/// encodes the mandated teardown sequence: the queue and device go before
/// `_instance`, so the platform handle outlives everything created under it.
/// `_instance` exists only to pin that ordering.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    /// Keeps the `wgpu::Instance` alive until `device` and `queue` are
    /// dropped. Never accessed directly.
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Enumerate adapters and select a device, GPU-class preferred.
    ///
    /// # Errors
    /// - [`ComputeError::PlatformUnavailable`] when no adapter of any kind
    ///   is visible.
    /// - [`ComputeError::DeviceUnavailable`] when the device request on the
    ///   selected adapter is refused.
    pub fn select() -> Result<Self> {
        pollster::block_on(Self::select_async())
    }

    async fn select_async() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let mut adapters = instance.enumerate_adapters(wgpu::Backends::PRIMARY);
        if adapters.is_empty() {
            return Err(ComputeError::PlatformUnavailable);
        }

        for a in &adapters {
            let info = a.get_info();
            eprintln!(
                "[gridwave] adapter: {} ({:?}, {:?})",
                info.name, info.backend, info.device_type
            );
        }

        // Tier 1: hardware GPU (or VM pass-through). Tier 2: whatever is
        // left — a CPU-class software device still runs every kernel,
        // just slowly.
        let gpu_class = adapters.iter().position(|a| {
            matches!(
                a.get_info().device_type,
                wgpu::DeviceType::DiscreteGpu
                    | wgpu::DeviceType::IntegratedGpu
                    | wgpu::DeviceType::VirtualGpu
            )
        });
        let adapter = match gpu_class {
            Some(i) => adapters.swap_remove(i),
            None => {
                eprintln!("[gridwave] no GPU-class adapter, falling back to CPU-class");
                adapters.swap_remove(0)
            }
        };

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        eprintln!("[gridwave] selected: {adapter_info}");

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gridwave"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(ComputeError::DeviceUnavailable)?;

        Ok(GpuDevice {
            device,
            queue,
            adapter_info,
            _instance: instance,
        })
    }

    /// Queue-wide completion barrier: blocks until every operation submitted
    /// so far has finished on the device.
    ///
    /// Dispatches and copies are enqueued in submission order but complete
    /// asynchronously; call this before the host touches any read-back
    /// memory or rebinds a read-back buffer as input to a later dispatch.
    pub fn barrier(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuDevice {{ adapter: {} }}", self.adapter_info)
    }
}
