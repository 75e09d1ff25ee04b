//! 帧生命周期的端到端测试
//!
//! 立方体场景走完整的 begin_frame → 通道 → end_frame，检查绘制统计、
//! 资源最终状态、通道顺序、尺寸调整和上传路径。

use forward_render::core::error::{GraphicsError, PassError, RenderError};
use forward_render::core::Config;
use forward_render::render::{
    BasePass, PassRegistry, RenderScene, Renderer, ShadowPass, BASE_PASS, POST_PROCESS_PASS,
    SHADOW_PASS,
};
use forward_render::rhi::{DeviceContext, DeviceDesc, Format, ResourceState, TextureDesc, TraceEntry};
use forward_render::scene::{AssetManager, Scene, SceneDescription};

const CUBE_SCENE: &str = r#"
[[meshes]]
name = "Cube"
builtin = "cube"

[[nodes]]
name = "Root"
children = [1, 2, 3]

[[nodes]]
name = "CubeNode"
mesh = 0

[[nodes]]
name = "Camera"
translation = [0.0, 1.0, 6.0]
camera = { type = "perspective", yfov = 0.8, znear = 0.1, zfar = 100.0 }

[[nodes]]
name = "Sun"
rotation = [-0.3826834, 0.0, 0.0, 0.9238795]
light = { type = "directional", intensity = 3.0 }
"#;

fn config(width: u32, height: u32) -> Config {
    let mut config = Config::default();
    config.window.width = width;
    config.window.height = height;
    config.graphics.shadow_map_size = 16;
    config.graphics.shader_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/shaders").into();
    config
}

fn device(width: u32, height: u32) -> DeviceContext {
    DeviceContext::init(DeviceDesc::from(&config(width, height))).expect("device")
}

fn cube_scene(device: &mut DeviceContext) -> (Scene, AssetManager, RenderScene) {
    let mut assets = AssetManager::new(".");
    let desc = SceneDescription::from_toml_str(CUBE_SCENE).expect("scene description");
    let scene = Scene::from_description(&desc, &mut assets).expect("scene");
    let aspect = device.aspect_ratio();
    let render_scene = RenderScene::new(device, &scene, &mut assets, aspect).expect("render scene");
    (scene, assets, render_scene)
}

#[test]
fn cube_frame_draws_once_per_pass_and_presents() {
    let mut device = device(32, 16);
    let mut registry = PassRegistry::new();
    registry.create(Box::new(ShadowPass::new(&mut device).unwrap())).unwrap();
    registry.create(Box::new(BasePass::new(&mut device).unwrap())).unwrap();
    let mut renderer = Renderer::with_registry(registry);
    let (_, _, render_scene) = cube_scene(&mut device);
    assert_eq!(render_scene.primitives()[0].mesh().index_count(), 36);
    renderer.set_scene(render_scene);

    let back_buffer = device.current_back_buffer();
    renderer.render_frame(&mut device).unwrap();

    let stats = device.last_frame_stats();
    assert_eq!(stats.indexed_draws_in(SHADOW_PASS), vec![36]);
    assert_eq!(stats.indexed_draws_in(BASE_PASS), vec![36]);
    assert_eq!(stats.draws.len(), 2);
    assert_eq!(stats.presents, 1);
    assert_eq!(back_buffer.resource().executed_state(), ResourceState::Present);
    assert_eq!(back_buffer.resource().state(), ResourceState::Present);
    assert!(!device.is_recording());
}

#[test]
fn full_renderer_runs_several_frames() {
    let mut device = device(32, 16);
    let mut renderer = Renderer::new(&mut device).unwrap();
    let (scene, _assets, render_scene) = cube_scene(&mut device);
    renderer.set_scene(render_scene);

    let first = device.swap_chain().current_index();
    for _ in 0..3 {
        let aspect = device.aspect_ratio();
        renderer.scene_mut().unwrap().update(&scene, aspect).unwrap();
        renderer.render_frame(&mut device).unwrap();
        let stats = device.last_frame_stats();
        assert_eq!(stats.draws_in(POST_PROCESS_PASS).len(), 1);
        assert_eq!(stats.draws_in(POST_PROCESS_PASS)[0].vertex_count, 3);
    }
    assert_eq!(device.frame_index(), 3);
    assert_ne!(device.swap_chain().current_index(), first);
    for buffer in device.swap_chain().buffers() {
        assert_eq!(buffer.resource().executed_state(), ResourceState::Present);
    }

    renderer.shutdown(&mut device).unwrap();
    device.shutdown().unwrap();
}

#[test]
fn base_pass_reads_shadow_map_only_after_shadow_pass_ends() {
    let mut device = device(32, 16);
    let shadow = ShadowPass::new(&mut device).unwrap();
    let shadow_map = shadow.shadow_map().resource().id();
    let mut registry = PassRegistry::new();
    registry.create(Box::new(shadow)).unwrap();
    registry.create(Box::new(BasePass::new(&mut device).unwrap())).unwrap();
    let mut renderer = Renderer::with_registry(registry);
    let (_, _, render_scene) = cube_scene(&mut device);
    renderer.set_scene(render_scene);
    renderer.render_frame(&mut device).unwrap();

    let trace = device.last_frame_trace();
    let shadow_end = trace
        .iter()
        .position(|e| {
            matches!(e, TraceEntry::Barrier { resource, after: ResourceState::PixelShaderResource, .. }
                if *resource == shadow_map)
        })
        .expect("shadow map transitioned to shader-readable");
    let base_begin = trace
        .iter()
        .position(|e| matches!(e, TraceEntry::BeginEvent(name) if name == BASE_PASS))
        .expect("base pass event");
    let sampled = trace
        .iter()
        .position(|e| matches!(e, TraceEntry::SetShaderResource { resource, .. } if *resource == shadow_map))
        .expect("shadow map bound as shader input");
    assert!(shadow_end < base_begin);
    assert!(base_begin < sampled);
}

#[test]
fn consumer_registered_before_producer_fails() {
    let mut device = device(16, 16);
    let mut registry = PassRegistry::new();
    registry.create(Box::new(BasePass::new(&mut device).unwrap())).unwrap();
    registry.create(Box::new(ShadowPass::new(&mut device).unwrap())).unwrap();
    let mut renderer = Renderer::with_registry(registry);
    let (_, _, render_scene) = cube_scene(&mut device);
    renderer.set_scene(render_scene);

    match renderer.render_frame(&mut device) {
        Err(RenderError::Pass(PassError::MissingInput { consumer, producer })) => {
            assert_eq!(consumer, BASE_PASS);
            assert_eq!(producer, SHADOW_PASS);
        }
        other => panic!("expected a missing-input error, got {:?}", other),
    }
}

#[test]
fn resize_recreates_default_targets_without_new_descriptors() {
    let mut device = device(32, 16);
    let mut renderer = Renderer::new(&mut device).unwrap();
    let (scene, _assets, render_scene) = cube_scene(&mut device);
    renderer.set_scene(render_scene);
    renderer.render_frame(&mut device).unwrap();

    let rtv = device.rtv_heap_usage();
    let dsv = device.dsv_heap_usage();
    let srv = device.srv_heap_usage();

    for (width, height) in [(64, 48), (8, 8), (40, 30)] {
        renderer.resize(&mut device, width, height).unwrap();
        let aspect = device.aspect_ratio();
        renderer.scene_mut().unwrap().update(&scene, aspect).unwrap();
        renderer.render_frame(&mut device).unwrap();

        let depth = device.default_depth_stencil_buffer();
        assert_eq!((depth.texture().width(), depth.texture().height()), (width, height));
        for buffer in device.swap_chain().buffers() {
            assert_eq!((buffer.texture().width(), buffer.texture().height()), (width, height));
        }
    }

    assert_eq!(device.rtv_heap_usage(), rtv);
    assert_eq!(device.dsv_heap_usage(), dsv);
    assert_eq!(device.srv_heap_usage(), srv);
    assert!(rtv.allocated <= rtv.capacity);
}

#[test]
fn uploaded_buffers_read_back_identically() {
    let mut device = device(8, 8);
    let bytes: Vec<u8> = (0..=255u8).cycle().take(1200).collect();
    let vb = device.create_vertex_buffer("Bytes", 12, &bytes).unwrap();
    assert_eq!(vb.resource().state(), ResourceState::GenericRead);
    assert_eq!(device.read_back(vb.resource()).unwrap(), bytes);

    let ib = device
        .create_index_buffer("Narrow", Format::R8Uint, 4, &[0, 1, 2, 255])
        .unwrap();
    assert_eq!(ib.format(), Format::R16Uint);
    let stored = device.read_back(ib.resource()).unwrap();
    let indices: Vec<u16> = stored
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 255]);
}

#[test]
fn missing_initial_data_and_heap_exhaustion_are_errors() {
    let mut config = config(8, 8);
    config.graphics.descriptors.srv_capacity = 1;
    let mut device = DeviceContext::init(DeviceDesc::from(&config)).unwrap();

    assert!(matches!(
        device.create_vertex_buffer("Empty", 12, &[]),
        Err(RenderError::Graphics(GraphicsError::MissingInitialData(_)))
    ));

    let desc = TextureDesc::new("Texture", 2, 2, Format::R8G8B8A8Unorm);
    device.create_texture_2d(&desc, None).unwrap();
    assert!(matches!(
        device.create_texture_2d(&desc, None),
        Err(RenderError::Graphics(GraphicsError::DescriptorHeapExhausted { capacity: 1, .. }))
    ));
}
