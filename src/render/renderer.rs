//! 帧驱动
//!
//! [`Renderer`] 持有通道注册表和当前渲染场景，每一帧：
//!
//! ```text
//! begin_frame
//!   ShadowPass:      begin_event → begin → render → end → end_event → 发布阴影贴图
//!   BasePass:        begin_event → begin → render → end → end_event → 发布场景颜色
//!   PostProcessPass: begin_event → begin → render → end → end_event
//! end_frame（提交、呈现、冲刷）
//! ```
//!
//! 通道按注册顺序执行，阴影通道必须先于基础通道注册。

use tracing::{instrument, trace};

use super::base_pass::BasePass;
use super::pass::{PassContext, PassOutputs, PassRegistry};
use super::post_process_pass::PostProcessPass;
use super::scene::RenderScene;
use super::shadow_pass::ShadowPass;
use crate::core::error::{PassError, Result};
use crate::rhi::DeviceContext;
use crate::{engine_debug, engine_error, engine_info};

/// 帧驱动
pub struct Renderer {
    registry: PassRegistry,
    outputs: PassOutputs,
    scene: Option<RenderScene>,
}

impl Renderer {
    /// 按依赖顺序创建阴影、基础、后处理三个通道
    pub fn new(device: &mut DeviceContext) -> Result<Self> {
        let mut registry = PassRegistry::new();
        registry.create(Box::new(ShadowPass::new(device)?))?;
        registry.create(Box::new(BasePass::new(device)?))?;
        registry.create(Box::new(PostProcessPass::new(device)?))?;
        engine_info!(passes = ?registry.names(), "Renderer initialized");
        Ok(Self::with_registry(registry))
    }

    /// 使用调用方组装的注册表
    pub fn with_registry(registry: PassRegistry) -> Self {
        Self {
            registry,
            outputs: PassOutputs::new(),
            scene: None,
        }
    }

    /// 设置当前场景，返回之前的场景
    pub fn set_scene(&mut self, scene: RenderScene) -> Option<RenderScene> {
        self.scene.replace(scene)
    }

    pub fn scene(&self) -> Option<&RenderScene> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut RenderScene> {
        self.scene.as_mut()
    }

    pub fn registry(&self) -> &PassRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PassRegistry {
        &mut self.registry
    }

    /// 录制并呈现一帧
    pub fn render_frame(&mut self, device: &mut DeviceContext) -> Result<()> {
        let scene = self.scene.as_ref().ok_or(PassError::NoScene)?;

        device.begin_frame()?;
        self.outputs.clear();

        for pass in self.registry.iter_mut() {
            let name = pass.name().to_string();
            device.begin_event(&name)?;
            {
                let mut ctx = PassContext {
                    device: &mut *device,
                    scene,
                    inputs: &self.outputs,
                };
                pass.begin(&mut ctx)?;
                pass.render(&mut ctx)?;
                pass.end(&mut ctx)?;
            }
            device.end_event()?;
            if let Some(output) = pass.output() {
                self.outputs.publish(&name, output);
            }
            trace!(pass = %name, "Pass recorded");
        }

        device.end_frame()
    }

    /// 调整输出尺寸：设备先冲刷并重建交换链，然后通知各通道
    #[instrument(skip(self, device))]
    pub fn resize(&mut self, device: &mut DeviceContext, width: u32, height: u32) -> Result<()> {
        device.resize_window(width, height)?;
        for pass in self.registry.iter_mut() {
            pass.resize(device, width, height)?;
        }
        engine_debug!(width, height, "Render passes resized");
        Ok(())
    }

    /// 释放场景与全部通道
    pub fn shutdown(&mut self, device: &mut DeviceContext) -> Result<()> {
        if let Err(e) = self.registry.release_all(device) {
            engine_error!(error = %e, "Failed to release render passes");
            return Err(e);
        }
        self.outputs.clear();
        self.scene = None;
        engine_info!("Renderer shut down");
        Ok(())
    }
}
