//! WGSL shader compilation, caching and loading.
//!
//! Sources go through a small preprocessor, are parsed and validated by
//! `naga`, and come out as SPIR-V words plus reflection data. Results are
//! cached in memory (and optionally on disk) keyed by path, entry point,
//! stage, shader model and a hash of the define list.

mod cache;
mod compiler;
mod library;
mod preprocess;
mod reflection;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cache::{CacheEntry, CacheKey, ShaderCache};
pub use compiler::{CompileResult, ShaderCompiler};
pub use library::ShaderLibrary;
pub use preprocess::Preprocessor;
pub use reflection::{BoundResource, ConstantBufferInfo, Reflection, ResourceKind, VariableInfo};

use crate::desc::ShaderStage;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{file}:{line}: {message}")]
    Preprocess { file: String, line: usize, message: String },
    #[error("parse error:\n{0}")]
    Parse(String),
    #[error("validation error:\n{0}")]
    Validation(String),
    #[error("entry point `{entry}` for {stage:?} not found")]
    MissingEntryPoint { entry: String, stage: ShaderStage },
    #[error("{0:?} shaders are not supported by the WGSL toolchain")]
    UnsupportedStage(ShaderStage),
    #[error("code generation failed: {0}")]
    Codegen(String),
    #[error("warnings treated as errors:\n{0}")]
    Warnings(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum ShaderModel {
    Sm5_0,
    Sm5_1,
    Sm6_0,
    Sm6_1,
    Sm6_2,
    Sm6_3,
    Sm6_4,
    Sm6_5,
    #[default]
    Sm6_6,
}

impl ShaderModel {
    pub fn is_sm6(self) -> bool {
        self >= ShaderModel::Sm6_0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OptimizationLevel {
    O0,
    O1,
    O2,
    #[default]
    O3,
}

/// Everything that shapes one compile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileOptions {
    pub stage: ShaderStage,
    /// `None` uses the stage's default (`VSMain`, `PSMain`, ...).
    pub entry_point: Option<String>,
    pub shader_model: ShaderModel,
    pub optimization: OptimizationLevel,
    pub debug: bool,
    pub strict: bool,
    pub warnings_as_errors: bool,
    pub row_major: bool,
    pub defines: Vec<(String, String)>,
    pub include_paths: Vec<PathBuf>,
}

impl CompileOptions {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            entry_point: None,
            shader_model: ShaderModel::default(),
            optimization: OptimizationLevel::default(),
            debug: false,
            strict: false,
            warnings_as_errors: false,
            row_major: false,
            defines: Vec::new(),
            include_paths: Vec::new(),
        }
    }

    pub fn vertex() -> Self {
        Self::new(ShaderStage::Vertex)
    }

    pub fn pixel() -> Self {
        Self::new(ShaderStage::Pixel)
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry_point = Some(entry.into());
        self
    }

    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }

    pub fn entry_point_or_default(&self) -> String {
        self.entry_point.clone().unwrap_or_else(|| self.stage.default_entry_point().to_string())
    }
}
