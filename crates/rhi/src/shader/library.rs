use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use super::cache::{CacheEntry, CacheKey, ShaderCache};
use super::compiler::{CompileResult, ShaderCompiler};
use super::{CompileOptions, ShaderError};
use crate::backend::Backend;
use crate::desc::ShaderDesc;
use crate::device::Device;
use crate::resource::Shader;
use crate::sync::lock;

enum Origin {
    File(PathBuf),
    Embedded(String),
}

struct Loaded<B: Backend> {
    shader: Arc<Shader<B>>,
    origin: Origin,
    options: CompileOptions,
    timestamp: u64,
}

/// Compiler + cache + device: ask for a shader by path and options, get a
/// ready RHI shader or `None` (and a bumped error counter).
pub struct ShaderLibrary<B: Backend> {
    compiler: ShaderCompiler,
    cache: ShaderCache,
    loaded: Mutex<HashMap<CacheKey, Loaded<B>>>,
    errors: AtomicU64,
}

impl<B: Backend> ShaderLibrary<B> {
    pub fn new(compiler: ShaderCompiler, cache: ShaderCache) -> Self {
        Self { compiler, cache, loaded: Mutex::new(HashMap::new()), errors: AtomicU64::new(0) }
    }

    /// In-memory cache, or one persisted under `cache_dir`.
    pub fn with_cache_dir(compiler: ShaderCompiler, cache_dir: Option<&Path>) -> Result<Self, ShaderError> {
        let cache = match cache_dir {
            Some(dir) => ShaderCache::with_directory(dir)?,
            None => ShaderCache::new(),
        };
        Ok(Self::new(compiler, cache))
    }

    pub fn compiler(&self) -> &ShaderCompiler {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut ShaderCompiler {
        &mut self.compiler
    }

    pub fn cache(&self) -> &ShaderCache {
        &self.cache
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn loaded_count(&self) -> usize {
        lock(&self.loaded).len()
    }

    /// Loads a shader from disk, compiling only if the cache has nothing at
    /// least as new as the file.
    pub fn load(&self, device: &Device<B>, path: &Path, options: &CompileOptions) -> Option<Arc<Shader<B>>> {
        let timestamp = match modified_nanos(path) {
            Ok(ts) => ts,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(path = %path.display(), error = %e, "shader source unavailable");
                return None;
            }
        };
        let key = CacheKey::new(&path.to_string_lossy(), options);
        let entry = match self.cache.lookup(&key, timestamp) {
            Some(entry) => entry,
            None => {
                let result = self.compiler.compile_file(path, options);
                self.store_result(key.clone(), result, timestamp)?
            }
        };
        self.finish(device, key, entry, Origin::File(path.to_path_buf()), options, timestamp)
    }

    /// Compiles a source embedded in the binary. `name` is its virtual path;
    /// embedded sources never go stale.
    pub fn load_embedded(
        &self,
        device: &Device<B>,
        name: &str,
        source: &str,
        options: &CompileOptions,
    ) -> Option<Arc<Shader<B>>> {
        let key = CacheKey::new(name, options);
        let entry = match self.cache.lookup(&key, 0) {
            Some(entry) => entry,
            None => {
                let result = self.compiler.compile_source(source, name, options);
                self.store_result(key.clone(), result, 0)?
            }
        };
        self.finish(device, key, entry, Origin::Embedded(name.to_string()), options, 0)
    }

    /// Re-checks every file-backed shader and reloads those whose source
    /// changed. Returns the reloaded paths; callers re-fetch with `load`.
    pub fn reload_changed(&self, device: &Device<B>) -> Vec<PathBuf> {
        let stale: Vec<(PathBuf, CompileOptions)> = lock(&self.loaded)
            .values()
            .filter_map(|l| match &l.origin {
                Origin::File(path) => match modified_nanos(path) {
                    Ok(ts) if ts > l.timestamp => Some((path.clone(), l.options.clone())),
                    _ => None,
                },
                Origin::Embedded(_) => None,
            })
            .collect();
        stale
            .into_iter()
            .filter_map(|(path, options)| {
                tracing::info!(path = %path.display(), "reloading shader");
                self.load(device, &path, &options).map(|_| path)
            })
            .collect()
    }

    /// The most recently loaded shader for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Shader<B>>> {
        lock(&self.loaded).get(key).map(|l| Arc::clone(&l.shader))
    }

    fn store_result(&self, key: CacheKey, result: CompileResult, timestamp: u64) -> Option<Arc<CacheEntry>> {
        if !result.success {
            self.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(path = %key.path, entry = %key.entry_point, errors = %result.errors, "shader load failed");
            return None;
        }
        if !result.warnings.is_empty() {
            tracing::warn!(path = %key.path, warnings = %result.warnings, "shader compiled with warnings");
        }
        Some(self.cache.store(
            key,
            CacheEntry { bytecode: result.bytecode, timestamp, reflection: result.reflection, warnings: result.warnings },
        ))
    }

    fn finish(
        &self,
        device: &Device<B>,
        key: CacheKey,
        entry: Arc<CacheEntry>,
        origin: Origin,
        options: &CompileOptions,
        timestamp: u64,
    ) -> Option<Arc<Shader<B>>> {
        let desc = ShaderDesc {
            stage: options.stage,
            entry_point: &key.entry_point,
            bytecode: &entry.bytecode,
            label: &key.path,
        };
        let shader = match device.create_shader_reflected(&desc, Some(entry.reflection.clone())) {
            Ok(shader) => shader,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(path = %key.path, error = %e, "shader creation failed");
                return None;
            }
        };
        lock(&self.loaded).insert(
            key,
            Loaded { shader: Arc::clone(&shader), origin, options: options.clone(), timestamp },
        );
        Some(shader)
    }
}

fn modified_nanos(path: &Path) -> Result<u64, ShaderError> {
    let io = |source| ShaderError::Io { path: path.to_path_buf(), source };
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).map_err(io)?;
    Ok(modified.duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0))
}
