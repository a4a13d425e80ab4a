// program.rs — kernel source loading and compilation.
//
// A Program is compiled device code: WGSL text read from disk (path supplied
// by the caller, loaded once at session start) or passed inline, submitted
// to the shader compiler exactly once. There is no caching across runs.
//
// COMPILE DIAGNOSTICS:
// wgpu reports shader compilation problems through the validation error
// scope, not a Result. We wrap `create_shader_module` in a scope and turn a
// captured error into `CompileError { log }`, printing the log as well —
// the diagnostic must reach the user even if a caller maps the error away.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::device::GpuDevice;
use crate::error::{ComputeError, Result};

/// Read a kernel source file into a UTF-8 string.
///
/// Split out from [`Program::from_path`] so a session can fail on a missing
/// file before any device resource exists.
pub fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ComputeError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// A compiled device program. Entry points are extracted from it when a
/// kernel is built (see `kernel.rs`).
#[derive(Debug)]
pub struct Program {
    pub(crate) module: wgpu::ShaderModule,
    /// Where the source came from, for diagnostics. `None` for inline source.
    pub source_path: Option<PathBuf>,
}

impl Program {
    /// Load WGSL from `path` and compile it against the selected device.
    pub fn from_path(gpu: &GpuDevice, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = read_source(path)?;
        let mut program = Self::from_source(gpu, &source)?;
        program.source_path = Some(path.to_path_buf());
        Ok(program)
    }

    /// Compile inline WGSL source.
    pub fn from_source(gpu: &GpuDevice, source: &str) -> Result<Self> {
        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gridwave program"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
        });
        if let Some(err) = pollster::block_on(gpu.device.pop_error_scope()) {
            let log = err.to_string();
            eprintln!("[gridwave] kernel compile log:\n{log}");
            return Err(ComputeError::CompileError { log });
        }
        Ok(Program { module, source_path: None })
    }
}
