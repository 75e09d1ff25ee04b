//! ForwardRender - 单设备前向渲染引擎
//!
//! 加载场景描述，构建场景图，并通过 D3D12 风格的设备抽象驱动帧循环：
//! 每帧依次执行阴影通道、基础通道和后处理通道。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（配置、错误处理、日志）
//! - `math`: 数学类型、矩阵辅助函数和包围体
//! - `rhi`: 设备抽象（描述符堆、资源、管线状态、命令队列、交换链、设备上下文）
//! - `render`: 渲染场景、渲染通道和帧驱动
//! - `scene`: 场景描述、网格加载、资产管理和场景图
//!
//! # 使用示例
//!
//! ```no_run
//! use forward_render::core::Config;
//! use forward_render::render::{RenderScene, Renderer};
//! use forward_render::rhi::{DeviceContext, DeviceDesc};
//! use forward_render::scene::{AssetManager, Scene};
//!
//! # fn main() -> forward_render::core::Result<()> {
//! let config = Config::default();
//! let mut device = DeviceContext::init(DeviceDesc::from(&config))?;
//! let mut renderer = Renderer::new(&mut device)?;
//!
//! let mut assets = AssetManager::new("assets");
//! let scene = Scene::load("assets/scene.toml", &mut assets)?;
//! let aspect = device.aspect_ratio();
//! renderer.set_scene(RenderScene::new(&mut device, &scene, &mut assets, aspect)?);
//!
//! renderer.render_frame(&mut device)?;
//! renderer.shutdown(&mut device)?;
//! device.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod math;
pub mod render;
pub mod rhi;
pub mod scene;
