// error.rs — the fail-fast error taxonomy.
//
// Every failure in a compute session is fatal to that session: a half
// configured device has no safe recovery path, so nothing here is retried.
// The one designed alternative (GPU-class adapter → CPU-class adapter) lives
// in device.rs and is a fallback, not a retry.
//
// Variants map one-to-one onto the lifecycle steps: platform/device
// enumeration, source loading, compilation, allocation, argument binding,
// dispatch, readback. Each Display message names the failed step so a demo
// can print it and exit non-zero without further decoration.

use std::fmt;
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ComputeError>;

/// Errors from the compute session lifecycle.
#[derive(Debug)]
pub enum ComputeError {
    /// No compute adapter visible at all — not even a software rasterizer.
    PlatformUnavailable,
    /// An adapter was found but the device request was refused
    /// (driver issue, unsupported limits).
    DeviceUnavailable(wgpu::RequestDeviceError),
    /// The kernel source file could not be read.
    SourceUnreadable { path: PathBuf, source: io::Error },
    /// The kernel source was rejected by the shader compiler.
    /// `log` carries the full diagnostic output; callers must not drop it.
    CompileError { log: String },
    /// The device refused a buffer allocation of `bytes` bytes.
    AllocationFailed { bytes: u64 },
    /// A kernel argument slot was misused; `slot` is the positional index.
    ArgumentBindingFailed { slot: usize, fault: BindingFault },
    /// The dispatch was rejected before submission.
    DispatchRejected { reason: String },
    /// Mapping a read-back buffer failed after the completion barrier.
    ReadbackFailed(wgpu::BufferAsyncError),
}

/// Why an argument binding (or its use at dispatch) was refused.
#[derive(Debug, PartialEq, Eq)]
pub enum BindingFault {
    /// Slot index is outside the kernel's declared argument table.
    NoSuchSlot { declared: usize },
    /// Inline scalar byte size does not match the slot declaration.
    SizeMismatch { expected: u64, got: u64 },
    /// A buffer was bound to a scalar slot or vice versa.
    KindMismatch { expected: &'static str },
    /// The slot was never bound before dispatch.
    Unbound,
    /// The bound buffer handle refers to a released or unknown buffer.
    StaleBuffer,
    /// A read-only buffer was bound to a slot the kernel writes through.
    AccessMismatch,
}

impl fmt::Display for ComputeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeError::PlatformUnavailable => {
                write!(f, "no compute platform available (no adapters enumerated)")
            }
            ComputeError::DeviceUnavailable(e) => {
                write!(f, "device request failed: {e}")
            }
            ComputeError::SourceUnreadable { path, source } => {
                write!(f, "couldn't read kernel source {}: {source}", path.display())
            }
            ComputeError::CompileError { log } => {
                write!(f, "kernel compilation failed:\n{log}")
            }
            ComputeError::AllocationFailed { bytes } => {
                write!(f, "device rejected a {bytes}-byte buffer allocation")
            }
            ComputeError::ArgumentBindingFailed { slot, fault } => {
                write!(f, "kernel argument slot {slot}: {fault}")
            }
            ComputeError::DispatchRejected { reason } => {
                write!(f, "dispatch rejected: {reason}")
            }
            ComputeError::ReadbackFailed(e) => {
                write!(f, "buffer readback failed: {e}")
            }
        }
    }
}

impl fmt::Display for BindingFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingFault::NoSuchSlot { declared } => {
                write!(f, "no such slot (kernel declares {declared})")
            }
            BindingFault::SizeMismatch { expected, got } => {
                write!(f, "scalar size mismatch (declared {expected} bytes, got {got})")
            }
            BindingFault::KindMismatch { expected } => {
                write!(f, "wrong argument kind (slot expects a {expected})")
            }
            BindingFault::Unbound => write!(f, "unbound at dispatch"),
            BindingFault::StaleBuffer => write!(f, "buffer handle is released or unknown"),
            BindingFault::AccessMismatch => {
                write!(f, "read-only buffer bound to a writable slot")
            }
        }
    }
}

impl std::error::Error for ComputeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComputeError::DeviceUnavailable(e) => Some(e),
            ComputeError::SourceUnreadable { source, .. } => Some(source),
            ComputeError::ReadbackFailed(e) => Some(e),
            _ => None,
        }
    }
}
