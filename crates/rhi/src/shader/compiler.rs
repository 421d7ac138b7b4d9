use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::preprocess::Preprocessor;
use super::reflection::Reflection;
use super::{CompileOptions, ShaderError};
use crate::desc::ShaderStage;

/// Outcome of one compile. On failure `bytecode` is empty and `errors` is not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileResult {
    pub success: bool,
    /// SPIR-V words.
    pub bytecode: Vec<u32>,
    pub errors: String,
    pub warnings: String,
    pub reflection: Reflection,
}

impl CompileResult {
    fn failed(error: ShaderError) -> Self {
        Self { success: false, errors: error.to_string(), ..Default::default() }
    }
}

/// WGSL to SPIR-V through `naga`.
#[derive(Debug, Clone, Default)]
pub struct ShaderCompiler {
    include_paths: Vec<PathBuf>,
    virtual_files: HashMap<String, String>,
}

impl ShaderCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Global include path searched after each request's own paths.
    pub fn add_include_path(&mut self, path: impl Into<PathBuf>) {
        self.include_paths.push(path.into());
    }

    /// Registers an in-memory file that `#include "name"` resolves to.
    pub fn add_virtual_file(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.virtual_files.insert(name.into(), source.into());
    }

    pub fn compile_file(&self, path: &Path, options: &CompileOptions) -> CompileResult {
        match std::fs::read_to_string(path) {
            Ok(source) => self.compile_source(&source, &path.to_string_lossy(), options),
            Err(source) => CompileResult::failed(ShaderError::Io { path: path.to_path_buf(), source }),
        }
    }

    /// `origin` names the source in diagnostics and anchors relative includes.
    pub fn compile_source(&self, source: &str, origin: &str, options: &CompileOptions) -> CompileResult {
        match self.try_compile(source, origin, options) {
            Ok((bytecode, reflection, warnings)) => CompileResult {
                success: true,
                bytecode,
                errors: String::new(),
                warnings: warnings.join("\n"),
                reflection,
            },
            Err(e) => {
                tracing::error!(origin, error = %e, "shader compile failed");
                CompileResult::failed(e)
            }
        }
    }

    fn try_compile(
        &self,
        source: &str,
        origin: &str,
        options: &CompileOptions,
    ) -> Result<(Vec<u32>, Reflection, Vec<String>), ShaderError> {
        let stage = naga_stage(options.stage)?;
        let entry = options.entry_point_or_default();

        let mut include_paths = options.include_paths.clone();
        include_paths.extend(self.include_paths.iter().cloned());
        let expanded = Preprocessor::new(&options.defines, include_paths, &self.virtual_files).run(source, origin)?;

        let module = naga::front::wgsl::parse_str(&expanded).map_err(|e| ShaderError::Parse(e.emit_to_string(&expanded)))?;

        let capabilities = if options.shader_model.is_sm6() {
            naga::valid::Capabilities::all()
        } else {
            naga::valid::Capabilities::default()
        };
        let info = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), capabilities)
            .validate(&module)
            .map_err(|e| ShaderError::Validation(e.emit_to_string(&expanded)))?;

        if !module.entry_points.iter().any(|ep| ep.name == entry && ep.stage == stage) {
            return Err(ShaderError::MissingEntryPoint { entry, stage: options.stage });
        }

        let mut warnings = Vec::new();
        if options.row_major {
            warnings.push("row-major packing requested; WGSL matrices are always column-major".to_string());
        }
        if options.warnings_as_errors && !warnings.is_empty() {
            return Err(ShaderError::Warnings(warnings.join("\n")));
        }

        let mut spv_options = naga::back::spv::Options::default();
        spv_options.flags.remove(naga::back::spv::WriterFlags::ADJUST_COORDINATE_SPACE);
        spv_options.flags.set(naga::back::spv::WriterFlags::DEBUG, options.debug);
        let pipeline = naga::back::spv::PipelineOptions { shader_stage: stage, entry_point: entry.clone() };
        let bytecode = naga::back::spv::write_vec(&module, &info, &spv_options, Some(&pipeline))
            .map_err(|e| ShaderError::Codegen(e.to_string()))?;

        tracing::debug!(origin, entry = %entry, words = bytecode.len(), "shader compiled");
        Ok((bytecode, Reflection::from_module(&module), warnings))
    }
}

fn naga_stage(stage: ShaderStage) -> Result<naga::ShaderStage, ShaderError> {
    match stage {
        ShaderStage::Vertex => Ok(naga::ShaderStage::Vertex),
        ShaderStage::Pixel => Ok(naga::ShaderStage::Fragment),
        ShaderStage::Compute => Ok(naga::ShaderStage::Compute),
        other => Err(ShaderError::UnsupportedStage(other)),
    }
}
