use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::reflection::Reflection;
use super::{CompileOptions, ShaderError, ShaderModel};
use crate::desc::ShaderStage;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub path: String,
    pub entry_point: String,
    pub stage: ShaderStage,
    pub shader_model: ShaderModel,
    pub define_hash: u64,
}

impl CacheKey {
    pub fn new(path: &str, options: &CompileOptions) -> Self {
        Self {
            path: path.to_string(),
            entry_point: options.entry_point_or_default(),
            stage: options.stage,
            shader_model: options.shader_model,
            define_hash: hash_defines(&options.defines),
        }
    }

    /// File stem of the on-disk entry.
    pub fn file_stem(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.path.as_bytes());
        h.update([0]);
        h.update(self.entry_point.as_bytes());
        h.update([0]);
        h.update(format!("{:?}/{:?}", self.stage, self.shader_model).as_bytes());
        h.update(self.define_hash.to_le_bytes());
        hex::encode(&h.finalize()[..16])
    }
}

/// Order-independent 64-bit hash of a define list.
pub fn hash_defines(defines: &[(String, String)]) -> u64 {
    let mut sorted: Vec<_> = defines.iter().collect();
    sorted.sort();
    let mut h = Sha256::new();
    for (name, value) in sorted {
        h.update(name.as_bytes());
        h.update(b"=");
        h.update(value.as_bytes());
        h.update(b"\n");
    }
    let digest = h.finalize();
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(first)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub bytecode: Vec<u32>,
    /// Source modification time (nanoseconds since the epoch) the bytecode was built from.
    pub timestamp: u64,
    pub reflection: Reflection,
    pub warnings: String,
}

#[derive(Serialize, Deserialize)]
struct Metadata {
    key: CacheKey,
    timestamp: u64,
    words: usize,
    warnings: String,
    reflection: Reflection,
}

/// Compiled-shader cache with hit/miss accounting.
pub struct ShaderCache {
    dir: Option<PathBuf>,
    entries: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ShaderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderCache {
    pub fn new() -> Self {
        Self { dir: None, entries: RwLock::new(HashMap::new()), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    /// A cache persisted under `dir`. Existing entries are loaded eagerly;
    /// unreadable ones are skipped.
    pub fn with_directory(dir: impl Into<PathBuf>) -> Result<Self, ShaderError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| ShaderError::Io { path: dir.clone(), source })?;
        let mut entries = HashMap::new();
        let listing = std::fs::read_dir(&dir).map_err(|source| ShaderError::Io { path: dir.clone(), source })?;
        for item in listing.flatten() {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_entry(&path) {
                Ok((key, entry)) => {
                    entries.insert(key, Arc::new(entry));
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping shader cache entry"),
            }
        }
        tracing::info!(dir = %dir.display(), entries = entries.len(), "shader cache loaded");
        Ok(Self { dir: Some(dir), entries: RwLock::new(entries), hits: AtomicU64::new(0), misses: AtomicU64::new(0) })
    }

    pub fn directory(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// True iff an entry exists and was built from a source at least as new as `timestamp`.
    pub fn has_valid(&self, key: &CacheKey, timestamp: u64) -> bool {
        self.read().get(key).is_some_and(|e| e.timestamp >= timestamp)
    }

    /// Valid entry for `key`, counting a hit or a miss.
    pub fn lookup(&self, key: &CacheKey, timestamp: u64) -> Option<Arc<CacheEntry>> {
        let found = self.read().get(key).filter(|e| e.timestamp >= timestamp).cloned();
        match found {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %key.path, entry = %key.entry_point, "shader cache hit");
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn store(&self, key: CacheKey, entry: CacheEntry) -> Arc<CacheEntry> {
        if let Some(dir) = &self.dir {
            if let Err(e) = save_entry(dir, &key, &entry) {
                tracing::warn!(path = %key.path, error = %e, "failed to persist shader cache entry");
            }
        }
        let entry = Arc::new(entry);
        self.entries.write().unwrap_or_else(|p| p.into_inner()).insert(key, Arc::clone(&entry));
        entry
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|p| p.into_inner()).clear();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<CacheKey, Arc<CacheEntry>>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ShaderError + '_ {
    move |source| ShaderError::Io { path: path.to_path_buf(), source }
}

fn save_entry(dir: &Path, key: &CacheKey, entry: &CacheEntry) -> Result<(), ShaderError> {
    let stem = key.file_stem();
    let spv = dir.join(format!("{stem}.spv"));
    let json = dir.join(format!("{stem}.json"));
    let bytes: Vec<u8> = entry.bytecode.iter().flat_map(|w| w.to_le_bytes()).collect();
    std::fs::write(&spv, bytes).map_err(io_err(&spv))?;
    let meta = Metadata {
        key: key.clone(),
        timestamp: entry.timestamp,
        words: entry.bytecode.len(),
        warnings: entry.warnings.clone(),
        reflection: entry.reflection.clone(),
    };
    let text = serde_json::to_string_pretty(&meta).map_err(|e| ShaderError::Codegen(e.to_string()))?;
    std::fs::write(&json, text).map_err(io_err(&json))
}

fn load_entry(json: &Path) -> Result<(CacheKey, CacheEntry), ShaderError> {
    let text = std::fs::read_to_string(json).map_err(io_err(json))?;
    let meta: Metadata = serde_json::from_str(&text).map_err(|e| ShaderError::Parse(e.to_string()))?;
    let spv = json.with_extension("spv");
    let bytes = std::fs::read(&spv).map_err(io_err(&spv))?;
    if bytes.len() != meta.words * 4 {
        return Err(ShaderError::Parse(format!("{}: expected {} words", spv.display(), meta.words)));
    }
    let bytecode = bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
    Ok((
        meta.key,
        CacheEntry { bytecode, timestamp: meta.timestamp, reflection: meta.reflection, warnings: meta.warnings },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: u64) -> CacheEntry {
        CacheEntry { bytecode: vec![0x0723_0203, 1, 2, 3], timestamp: ts, reflection: Reflection::default(), warnings: String::new() }
    }

    #[test]
    fn define_hash_ignores_order() {
        let a = vec![("A".to_string(), "1".to_string()), ("B".to_string(), "".to_string())];
        let b = vec![("B".to_string(), "".to_string()), ("A".to_string(), "1".to_string())];
        assert_eq!(hash_defines(&a), hash_defines(&b));
        assert_ne!(hash_defines(&a), hash_defines(&[]));
    }

    #[test]
    fn validity_follows_timestamps() {
        let cache = ShaderCache::new();
        let key = CacheKey::new("a.wgsl", &CompileOptions::vertex());
        assert!(!cache.has_valid(&key, 0));
        cache.store(key.clone(), entry(100));
        assert!(cache.has_valid(&key, 100));
        assert!(cache.has_valid(&key, 50));
        assert!(!cache.has_valid(&key, 101));
    }

    #[test]
    fn lookup_counts_hits_and_misses() {
        let cache = ShaderCache::new();
        let key = CacheKey::new("a.wgsl", &CompileOptions::vertex());
        assert!(cache.lookup(&key, 5).is_none());
        cache.store(key.clone(), entry(5));
        assert!(cache.lookup(&key, 5).is_some());
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn keys_differ_by_stage_and_defines() {
        let vs = CacheKey::new("a.wgsl", &CompileOptions::vertex());
        let ps = CacheKey::new("a.wgsl", &CompileOptions::pixel());
        let fog = CacheKey::new("a.wgsl", &CompileOptions::vertex().with_define("FOG", "1"));
        assert_ne!(vs, ps);
        assert_ne!(vs, fog);
        assert_ne!(vs.file_stem(), fog.file_stem());
    }

    #[test]
    fn entries_survive_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let key = CacheKey::new("water.wgsl", &CompileOptions::pixel());
        {
            let cache = ShaderCache::with_directory(dir.path()).unwrap();
            cache.store(key.clone(), entry(42));
        }
        let reloaded = ShaderCache::with_directory(dir.path()).unwrap();
        assert_eq!(reloaded.len(), 1);
        let e = reloaded.lookup(&key, 42).unwrap();
        assert_eq!(e.bytecode, vec![0x0723_0203, 1, 2, 3]);
    }
}
