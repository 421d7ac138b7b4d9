use std::path::Path;

use rhi::headless::HeadlessBackend;
use rhi::shader::{CompileOptions, ShaderCompiler, ShaderLibrary};
use rhi::{Device, DeviceDesc, ShaderStage};

const QUAD: &str = r#"
struct VsOut { @builtin(position) pos: vec4<f32>, @location(0) uv: vec2<f32> }

@vertex
fn VSMain(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.pos = vec4<f32>(position, 1.0);
    out.uv = uv;
    return out;
}

@fragment
fn PSMain(in: VsOut) -> @location(0) vec4<f32> {
    return vec4<f32>(in.uv, 0.0, 1.0);
}
"#;

fn device() -> Device<HeadlessBackend> {
    Device::new(HeadlessBackend::new(), &DeviceDesc::default())
}

fn write_shader(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("quad.wgsl");
    std::fs::write(&path, QUAD).unwrap();
    path
}

#[test]
fn second_load_is_a_cache_hit_with_identical_bytecode() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_shader(dir.path());
    let device = device();
    let library = ShaderLibrary::<HeadlessBackend>::new(ShaderCompiler::new(), Default::default());

    let first = library.load(&device, &path, &CompileOptions::vertex()).unwrap();
    let (hits, misses) = (library.cache().hits(), library.cache().misses());
    let second = library.load(&device, &path, &CompileOptions::vertex()).unwrap();

    assert_eq!(library.cache().hits(), hits + 1);
    assert_eq!(library.cache().misses(), misses);
    assert_eq!(first.bytecode(), second.bytecode());
    assert_eq!(second.stage(), ShaderStage::Vertex);
    assert_eq!(second.entry_point(), "VSMain");
    assert_eq!(library.error_count(), 0);
}

#[test]
fn persisted_cache_serves_a_fresh_library() {
    let src = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let path = write_shader(src.path());
    let device = device();

    let bytecode = {
        let library = ShaderLibrary::<HeadlessBackend>::with_cache_dir(ShaderCompiler::new(), Some(cache_dir.path())).unwrap();
        library.load(&device, &path, &CompileOptions::pixel()).unwrap().bytecode().to_vec()
    };

    let library = ShaderLibrary::<HeadlessBackend>::with_cache_dir(ShaderCompiler::new(), Some(cache_dir.path())).unwrap();
    let shader = library.load(&device, &path, &CompileOptions::pixel()).unwrap();
    assert_eq!(library.cache().hits(), 1);
    assert_eq!(library.cache().misses(), 0);
    assert_eq!(shader.bytecode(), bytecode.as_slice());
}

#[test]
fn different_defines_compile_separately() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_shader(dir.path());
    let device = device();
    let library = ShaderLibrary::<HeadlessBackend>::new(ShaderCompiler::new(), Default::default());

    library.load(&device, &path, &CompileOptions::vertex()).unwrap();
    library.load(&device, &path, &CompileOptions::vertex().with_define("SHADOWS", "")).unwrap();
    assert_eq!(library.cache().misses(), 2);
    assert_eq!(library.loaded_count(), 2);
}

#[test]
fn failures_return_none_and_count_errors() {
    let dir = tempfile::tempdir().unwrap();
    let bad = dir.path().join("broken.wgsl");
    std::fs::write(&bad, "@vertex fn VSMain( -> {").unwrap();
    let device = device();
    let library = ShaderLibrary::<HeadlessBackend>::new(ShaderCompiler::new(), Default::default());

    assert!(library.load(&device, &bad, &CompileOptions::vertex()).is_none());
    assert!(library.load(&device, &dir.path().join("missing.wgsl"), &CompileOptions::vertex()).is_none());
    assert_eq!(library.error_count(), 2);
}

#[test]
fn embedded_sources_resolve_virtual_includes() {
    let mut compiler = ShaderCompiler::new();
    compiler.add_virtual_file("tint.wgsl", "const TINT_STRENGTH: f32 = 0.25;");
    let library = ShaderLibrary::<HeadlessBackend>::new(compiler, Default::default());
    let device = device();
    let source = "#include \"tint.wgsl\"\n@fragment fn PSMain() -> @location(0) vec4<f32> { return vec4<f32>(TINT_STRENGTH); }\n";

    let a = library.load_embedded(&device, "tinted.wgsl", source, &CompileOptions::pixel()).unwrap();
    let b = library.load_embedded(&device, "tinted.wgsl", source, &CompileOptions::pixel()).unwrap();
    assert_eq!(a.bytecode(), b.bytecode());
    assert_eq!(library.cache().hits(), 1);
}

#[test]
fn touched_sources_are_recompiled_on_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_shader(dir.path());
    let device = device();
    let library = ShaderLibrary::<HeadlessBackend>::new(ShaderCompiler::new(), Default::default());
    library.load(&device, &path, &CompileOptions::pixel()).unwrap();
    assert!(library.reload_changed(&device).is_empty());

    let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
    std::fs::File::options().write(true).open(&path).unwrap().set_modified(later).unwrap();
    let misses = library.cache().misses();
    assert_eq!(library.reload_changed(&device), vec![path.clone()]);
    assert_eq!(library.cache().misses(), misses + 1);
    assert!(library.reload_changed(&device).is_empty());
    assert_eq!(library.loaded_count(), 1);
}
