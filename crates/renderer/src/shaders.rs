//! Embedded WGSL sources and how they are compiled.

use std::path::Path;
use std::sync::Arc;

use rhi::shader::{CompileOptions, ShaderCompiler, ShaderError, ShaderLibrary};
use rhi::{Backend, Device, Shader};

use crate::error::RenderError;

pub const COMMON: &str = include_str!("../../../shaders/common.wgsl");
pub const CREATURE: &str = include_str!("../../../shaders/creature.wgsl");
pub const CREATURE_SHADOW: &str = include_str!("../../../shaders/creature_shadow.wgsl");
pub const TREE: &str = include_str!("../../../shaders/tree.wgsl");
pub const GRASS: &str = include_str!("../../../shaders/grass.wgsl");
pub const TERRAIN: &str = include_str!("../../../shaders/terrain.wgsl");
pub const WATER: &str = include_str!("../../../shaders/water.wgsl");

/// A compiler that resolves `#include "common.wgsl"` without touching disk.
pub fn compiler() -> ShaderCompiler {
    let mut compiler = ShaderCompiler::new();
    compiler.add_virtual_file("common.wgsl", COMMON);
    compiler
}

pub fn library<B: Backend>(cache_dir: Option<&Path>) -> Result<ShaderLibrary<B>, ShaderError> {
    ShaderLibrary::with_cache_dir(compiler(), cache_dir)
}

/// Compiles one embedded source for `options.stage`.
pub fn load<B: Backend>(
    library: &ShaderLibrary<B>,
    device: &Device<B>,
    name: &str,
    source: &str,
    options: &CompileOptions,
) -> Result<Arc<Shader<B>>, RenderError> {
    library.load_embedded(device, name, source, options).ok_or_else(|| RenderError::Shader(name.to_string()))
}

/// Vertex and pixel stages of one embedded source.
pub fn load_pair<B: Backend>(
    library: &ShaderLibrary<B>,
    device: &Device<B>,
    name: &str,
    source: &str,
) -> Result<(Arc<Shader<B>>, Arc<Shader<B>>), RenderError> {
    let vs = load(library, device, name, source, &CompileOptions::vertex())?;
    let ps = load(library, device, name, source, &CompileOptions::pixel())?;
    Ok((vs, ps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi::headless::HeadlessBackend;
    use rhi::{DeviceDesc, ShaderStage};

    const SOURCES: [(&str, &str); 6] = [
        ("creature.wgsl", CREATURE),
        ("tree.wgsl", TREE),
        ("grass.wgsl", GRASS),
        ("terrain.wgsl", TERRAIN),
        ("water.wgsl", WATER),
        ("creature_shadow.wgsl", CREATURE_SHADOW),
    ];

    #[test]
    fn every_embedded_shader_compiles() {
        let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
        let library = library::<HeadlessBackend>(None).unwrap();
        for (name, source) in SOURCES {
            let vs = load(&library, &device, name, source, &CompileOptions::vertex()).unwrap();
            assert_eq!(vs.stage(), ShaderStage::Vertex);
            if name != "creature_shadow.wgsl" {
                let ps = load(&library, &device, name, source, &CompileOptions::pixel()).unwrap();
                assert_eq!(ps.entry_point(), "PSMain");
            }
        }
        assert_eq!(library.error_count(), 0);
    }

    #[test]
    fn reloading_hits_the_cache() {
        let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
        let library = library::<HeadlessBackend>(None).unwrap();
        let (a, _) = load_pair(&library, &device, "grass.wgsl", GRASS).unwrap();
        let hits = library.cache().hits();
        let (b, _) = load_pair(&library, &device, "grass.wgsl", GRASS).unwrap();
        assert_eq!(library.cache().hits(), hits + 2);
        assert_eq!(a.bytecode(), b.bytecode());
    }

    #[test]
    fn missing_entry_point_is_an_error() {
        let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
        let library = library::<HeadlessBackend>(None).unwrap();
        let err = load(&library, &device, "creature_shadow.wgsl", CREATURE_SHADOW, &CompileOptions::pixel()).unwrap_err();
        assert!(matches!(err, RenderError::Shader(_)));
        assert_eq!(library.error_count(), 1);
    }
}
