//! Package variants: how each source file is transformed into an archive entry.

use std::path::Path;
use std::sync::Arc;

use fwup_schema::VariantName;

use super::compiler::{CompileError, Compiler};

/// Name of the verbatim variant.
pub const SOURCE_VARIANT: &str = "src";
/// Name of the bytecode variant.
pub const PRECOMPILED_VARIANT: &str = "mpy_version/6.1";

/// One transformed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    /// Entry name inside the archive.
    pub name: String,
    /// Entry contents.
    pub data: Vec<u8>,
}

/// A package flavor: how each source file becomes an archive entry.
pub trait Variant: Send + Sync {
    /// Name recorded in the published manifest.
    fn name(&self) -> VariantName;

    /// Transform `source`, found at `relative` inside the app directory.
    fn transform(&self, source: &Path, relative: &str) -> Result<Transformed, CompileError>;
}

/// Files copied verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceVariant;

impl Variant for SourceVariant {
    fn name(&self) -> VariantName {
        VariantName::new(SOURCE_VARIANT)
    }

    fn transform(&self, source: &Path, relative: &str) -> Result<Transformed, CompileError> {
        Ok(Transformed {
            name: relative.to_string(),
            data: std::fs::read(source)?,
        })
    }
}

/// `.py` files compiled ahead of time to `.mpy`; everything else verbatim.
pub struct PrecompiledVariant {
    name: VariantName,
    compiler: Arc<dyn Compiler>,
}

impl PrecompiledVariant {
    /// Published as `name`, compiling with `compiler`.
    pub fn new(name: impl Into<VariantName>, compiler: Arc<dyn Compiler>) -> Self {
        Self {
            name: name.into(),
            compiler,
        }
    }
}

impl std::fmt::Debug for PrecompiledVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecompiledVariant")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Variant for PrecompiledVariant {
    fn name(&self) -> VariantName {
        self.name.clone()
    }

    fn transform(&self, source: &Path, relative: &str) -> Result<Transformed, CompileError> {
        match relative.strip_suffix(".py") {
            Some(stem) => Ok(Transformed {
                name: format!("{stem}.mpy"),
                data: self.compiler.compile(source)?,
            }),
            None => SourceVariant.transform(source, relative),
        }
    }
}
