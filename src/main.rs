//! ForwardRender - 无窗口帧驱动
//!
//! 加载配置与场景，初始化设备，运行若干帧后关闭。
//! 引擎不创建操作系统窗口：交换链的尺寸来自配置，可以在运行中途模拟一次窗口尺寸调整。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 命令行覆盖
//! cargo run -- --width 640 --height 360 --frames 10 --capture out/frame.png
//! ```
//!
//! # 架构概览
//!
//! ```text
//! ┌─────────────┐
//! │   main.rs   │  帧驱动
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │    Scene    │  场景描述 / 网格 / 场景图
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Render    │  渲染场景 / 渲染通道
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │     RHI     │  设备上下文 / 命令队列 / 交换链
//! └─────────────┘
//! ```

use std::path::Path;

use anyhow::Context;
use tracing::{error, info};

use forward_render::core::{log, Config};
use forward_render::render::{capture, RenderScene, Renderer};
use forward_render::rhi::{DeviceContext, DeviceDesc};
use forward_render::scene::{AssetManager, Scene};
use forward_render::engine_warn;

/// 应用程序入口点
///
/// # 初始化流程
///
/// 1. 加载引擎配置文件（config.toml）并应用命令行参数
/// 2. 初始化日志系统
/// 3. 创建设备上下文与渲染通道
/// 4. 加载场景，创建渲染场景
/// 5. 运行帧循环，关闭
///
/// # 命令行参数
///
/// - `--width <value>` / `--height <value>`: 视口尺寸
/// - `--frames <value>`: 运行帧数
/// - `--scene <path>`: 场景描述文件
/// - `--capture <path>`: 结束时保存场景颜色目标
fn main() {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // 2. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then(|| config.logging.log_file.as_str());
    if let Err(e) = log::init_logger(config.logging.level, config.logging.file_output, log_file) {
        eprintln!("Failed to initialize logging: {}", e);
    }
    info!(version = env!("CARGO_PKG_VERSION"), "ForwardRender starting...");

    if let Err(e) = run(&config) {
        error!("Fatal error: {:#}", e);
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// 初始化、运行帧循环并关闭
fn run(config: &Config) -> anyhow::Result<()> {
    let mut device = DeviceContext::init(DeviceDesc::from(config)).context("failed to initialize device")?;
    let mut renderer = Renderer::new(&mut device).context("failed to create render passes")?;

    let scene_path = &config.scene.path;
    let base_dir = scene_path.parent().unwrap_or(Path::new("."));
    let mut assets = AssetManager::new(base_dir);
    let scene = Scene::load(scene_path, &mut assets)
        .with_context(|| format!("failed to load scene {}", scene_path.display()))?;
    let aspect = device.aspect_ratio();
    renderer.set_scene(RenderScene::new(&mut device, &scene, &mut assets, aspect)?);

    info!(
        width = config.window.width,
        height = config.window.height,
        frames = config.render.frames,
        "Entering frame loop..."
    );

    for frame in 0..config.render.frames {
        if let Some(step) = config.render.resize_after.filter(|s| s.frame == frame) {
            renderer.resize(&mut device, step.width, step.height)?;
            if let Some(render_scene) = renderer.scene_mut() {
                render_scene.update(&scene, device.aspect_ratio())?;
            }
        }

        if config.render.recompute_view_each_frame {
            if let Some(render_scene) = renderer.scene_mut() {
                render_scene.update(&scene, device.aspect_ratio())?;
            }
        }

        renderer
            .render_frame(&mut device)
            .with_context(|| format!("frame {} failed", frame))?;
    }

    if let Some(path) = &config.render.capture_path {
        let scene_color = renderer
            .registry()
            .get(forward_render::render::BASE_PASS)?
            .output();
        match scene_color {
            Some(texture) => capture::save_png(&mut device, &texture, path)?,
            None => engine_warn!("Base pass has no output to capture"),
        }
    }

    let stats = device.last_frame_stats();
    info!(
        frames = device.frame_index(),
        draws = stats.draws.len(),
        barriers = stats.barriers,
        "Frame loop finished"
    );

    renderer.shutdown(&mut device)?;
    assets.release_render_data();
    device.shutdown()?;
    info!("ForwardRender exited cleanly");
    Ok(())
}
