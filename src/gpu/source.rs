// gpu/source.rs — Where the kernel program text comes from.
//
// The kernel is an opaque WGSL artifact as far as the device context is
// concerned: it only needs the text and the name of the entry point. The
// default program is compiled into the binary; `File` lets a user iterate
// on a kernel without rebuilding.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use crate::error::InitError;

/// Entry point of the bundled kernel.
pub const DEFAULT_ENTRY_POINT: &str = "my_filter";

const EMBEDDED_KERNEL: &str = include_str!("../shaders/conv3x3.wgsl");

/// Kernel program source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KernelSource {
    /// The bundled `conv3x3.wgsl`.
    #[default]
    Embedded,
    /// A WGSL file read at initialization.
    File(PathBuf),
    /// Literal program text (tests, tooling).
    Inline(String),
}

impl KernelSource {
    /// Resolve the program text.
    ///
    /// # Errors
    /// `InitError::SourceUnavailable` if the file cannot be read.
    pub fn load(&self) -> Result<Cow<'_, str>, InitError> {
        match self {
            KernelSource::Embedded => Ok(Cow::Borrowed(EMBEDDED_KERNEL)),
            KernelSource::Inline(text) => Ok(Cow::Borrowed(text.as_str())),
            KernelSource::File(path) => std::fs::read_to_string(path)
                .map(Cow::Owned)
                .map_err(|source| InitError::SourceUnavailable {
                    path: path.clone(),
                    source,
                }),
        }
    }

    /// Label used for the shader module and in log lines.
    pub fn label(&self) -> String {
        match self {
            KernelSource::Embedded => "conv3x3.wgsl".to_string(),
            KernelSource::Inline(_) => "<inline>".to_string(),
            KernelSource::File(path) => path.display().to_string(),
        }
    }
}

impl fmt::Display for KernelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
