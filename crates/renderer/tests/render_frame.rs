use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use renderer::{Camera, RenderConfig, RenderError, Renderer, Scene, TreeLod};
use rhi::headless::HeadlessBackend;
use rhi::{Device, DeviceDesc};
use sim_core::{Creature, DiploidGenome, GenomeConfig};
use types::{MeshData, TreeKind, VegetationInstance};

fn small_config() -> RenderConfig {
    let mut config = RenderConfig::default();
    config.width = 64;
    config.height = 48;
    config.terrain.world_size = 256.0;
    config.terrain.chunks = 4;
    config.terrain.chunk_resolution = 4;
    config.water.cells = 8;
    config.creatures.shadow_map_size = 64;
    config.creatures.preload = false;
    config
}

fn creatures(n: usize, rng: &mut ChaCha8Rng) -> Vec<Creature> {
    (0..n)
        .map(|i| {
            let genome = DiploidGenome::founder(&GenomeConfig::default(), rng);
            let mut c = Creature::new(genome, Vec3::new(i as f32 * 0.5 - 2.0, 0.0, 0.0), 0);
            c.velocity = Vec3::new(1.0, 0.0, 0.5);
            c
        })
        .collect()
}

fn vegetation() -> Vec<VegetationInstance> {
    let mut plants = vec![
        VegetationInstance::tree(TreeKind::Oak, Vec3::new(3.0, 0.0, 2.0), 0.3, Vec3::new(1.0, 1.2, 1.0)),
        VegetationInstance::tree(TreeKind::Pine, Vec3::new(-4.0, 0.0, -1.0), 1.1, Vec3::ONE),
        VegetationInstance::tree(TreeKind::Pine, Vec3::new(-6.0, 0.0, 1.0), 2.0, Vec3::ONE),
        VegetationInstance::tree(TreeKind::Palm, Vec3::new(5000.0, 0.0, 0.0), 0.0, Vec3::ONE),
    ];
    for z in 0..20 {
        for x in 0..20 {
            plants.push(VegetationInstance::grass(Vec3::new(x as f32 * 0.5 - 5.0, 0.0, z as f32 * 0.5 - 5.0), 0.0, Vec3::ONE));
        }
    }
    plants
}

#[test]
fn frame_draws_every_renderer_without_validation_errors() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let config = small_config();
    let mut renderer = Renderer::new(&device, &config, None).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let mut population = creatures(8, &mut rng);
    population.push({
        let mut far = creatures(1, &mut rng).remove(0);
        far.position = Vec3::new(0.0, 0.0, 9000.0);
        far
    });
    let mut dead = creatures(1, &mut rng).remove(0);
    dead.alive = false;
    population.push(dead);
    let plants = vegetation();
    let camera = Camera::new(config.terrain.world_size);

    let mut total_draws = 0;
    for frame in 0..3 {
        let stats = renderer
            .render(&device, Scene { creatures: &population, vegetation: &plants }, &camera, frame as f64 / 60.0)
            .unwrap();
        assert_eq!(stats.creatures.visible, 8);
        assert_eq!(stats.creatures.culled, 1);
        assert_eq!(stats.trees.visible, 3);
        assert_eq!(stats.trees.culled, 1);
        assert_eq!(stats.trees.draw_calls, 2, "oak and pine share no batch");
        assert!(stats.grass.visible > 0);
        assert_eq!(stats.grass.visible + stats.grass.culled, 400);
        assert_eq!(stats.grass.draw_calls, 1);
        assert!(stats.terrain.visible > 0);
        assert_eq!(stats.terrain.visible + stats.terrain.culled, 16);
        assert_eq!(stats.water_draw_calls, 1);
        assert_eq!(stats.shadow_draw_calls, stats.creatures.draw_calls);
        total_draws += stats.draw_calls();
    }
    assert_eq!(renderer.frames_rendered(), 3);

    device.wait_idle();
    let gpu = device.backend().stats();
    assert_eq!(gpu.validation_errors, 0);
    assert_eq!(gpu.draw_calls as usize, total_draws);
    assert_eq!(gpu.render_passes, 6);
}

#[test]
fn creature_instances_follow_batches() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let config = small_config();
    let mut renderer = Renderer::new(&device, &config, None).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(12);
    let population = creatures(6, &mut rng);
    let camera = Camera::new(config.terrain.world_size);
    renderer.render(&device, Scene { creatures: &population, vegetation: &[] }, &camera, 2.0).unwrap();

    let staged = renderer.creatures().staged();
    assert_eq!(staged.len(), 6);
    for record in staged {
        assert_eq!(record.fade(), 1.0);
        assert!(record.phase() >= 0.0 && record.phase() < std::f32::consts::TAU);
        assert!(record.lod() < 3);
    }
    let per_lod: usize = renderer.stats().creatures.per_lod.iter().sum();
    assert_eq!(per_lod, 6);
}

#[test]
fn overflow_drops_instances_but_keeps_drawing() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let mut config = small_config();
    config.creatures.max_instances = 2;
    config.creatures.shadows = false;
    let mut renderer = Renderer::new(&device, &config, None).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(13);
    let population = creatures(5, &mut rng);
    let camera = Camera::new(config.terrain.world_size);

    let stats = renderer.render(&device, Scene { creatures: &population, vegetation: &[] }, &camera, 0.0).unwrap();
    assert_eq!(stats.creatures.visible, 5);
    assert_eq!(stats.creatures.dropped, 3);
    assert_eq!(stats.shadow_draw_calls, 0);
    assert!(renderer.creatures().shadow_map().is_none());
    assert_eq!(renderer.creatures().staged().len(), 2);

    device.wait_idle();
    let gpu = device.backend().stats();
    assert_eq!(gpu.validation_errors, 0);
    assert_eq!(gpu.render_passes, 1);
}

#[test]
fn shader_cache_directory_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let config = small_config();

    let first = Renderer::new(&device, &config, Some(dir.path())).unwrap();
    assert_eq!(first.shader_library().cache().hits(), 0);
    let compiled = first.shader_library().cache().misses();
    assert!(compiled > 0);

    let second = Renderer::new(&device, &config, Some(dir.path())).unwrap();
    assert_eq!(second.shader_library().cache().hits(), compiled);
    assert_eq!(second.shader_library().cache().misses(), 0);
}

#[test]
fn underwater_camera_reports_depth() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let config = small_config();
    let mut renderer = Renderer::new(&device, &config, None).unwrap();
    let mut camera = Camera::new(config.terrain.world_size);
    camera.pitch = -0.2;
    camera.target = Vec3::new(0.0, -2.0, 0.0);
    renderer.render(&device, Scene::default(), &camera, 0.0).unwrap();
    let water = renderer.water().unwrap();
    let eye_y = camera.eye_position().y;
    assert!(eye_y < 0.0);
    assert!((water.underwater_depth() - (water.water_height() - eye_y)).abs() < 1e-4);
}

#[test]
fn terrain_chunks_answer_position_queries() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let config = small_config();
    let renderer = Renderer::new(&device, &config, None).unwrap();
    let terrain = renderer.terrain();
    assert_eq!(terrain.chunk_count(), 16);

    let index = terrain.chunk_index(0.1, 70.0);
    assert_eq!(index, 3 * 4 + 2);
    let bounds = terrain.chunk_bounds(index).unwrap();
    assert_eq!((bounds.min.x, bounds.max.x), (0.0, 64.0));
    assert_eq!((bounds.min.z, bounds.max.z), (64.0, 128.0));
    assert_eq!(terrain.chunk_index(-5000.0, 5000.0), 3 * 4);
    assert!(terrain.chunk_bounds(16).is_none());
}

#[test]
fn tree_meshes_can_be_replaced() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc::default());
    let config = small_config();
    let mut renderer = Renderer::new(&device, &config, None).unwrap();
    let block = MeshData::cuboid(Vec3::new(0.3, 0.5, 0.3));

    renderer.trees_mut().set_mesh(&device, TreeKind::Oak, TreeLod::Simplified, &block).unwrap();
    let err = renderer
        .trees_mut()
        .set_mesh(&device, TreeKind::Oak, TreeLod::Full, &MeshData::default())
        .unwrap_err();
    assert!(matches!(err, RenderError::Mesh(_)));

    let plants = vegetation();
    let camera = Camera::new(config.terrain.world_size);
    let stats = renderer.render(&device, Scene { creatures: &[], vegetation: &plants }, &camera, 0.0).unwrap();
    assert_eq!(stats.trees.visible, 3);
    device.wait_idle();
    assert_eq!(device.backend().stats().validation_errors, 0);
}
