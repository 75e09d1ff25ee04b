//! 基础通道
//!
//! 不透明物体的前向着色，写入场景颜色目标和默认深度缓冲。
//! 采样阴影通道发布的阴影贴图。

use std::sync::Arc;

use super::pass::{PassContext, RenderPass};
use super::shadow_pass::SHADOW_PASS;
use crate::core::error::Result;
use crate::math::Color;
use crate::rhi::{
    DeviceContext, Format, InputElementDesc, PipelineState, PipelineStateDesc, RenderTarget, RootSignature,
    ShaderDesc, Texture2D, TextureDesc, Viewport,
};

pub const BASE_PASS: &str = "BasePass";

/// 基础通道
pub struct BasePass {
    pipeline: Arc<PipelineState>,
    scene_color: RenderTarget,
    viewport: Viewport,
}

impl BasePass {
    pub fn new(device: &mut DeviceContext) -> Result<Self> {
        let (width, height) = (device.width(), device.height());
        let mut scene_color =
            device.create_render_target(&TextureDesc::new("SceneColor", width, height, Format::Unknown))?;
        scene_color.texture_mut().set_location_index(RootSignature::TEXTURE);

        let mut desc = PipelineStateDesc::new(BASE_PASS, ShaderDesc::new("BaseVS", "BasePass.hlsl", "VS"));
        desc.pixel_shader = Some(ShaderDesc::new("BasePS", "BasePass.hlsl", "PS"));
        // 槽位 0 为位置流，槽位 1 为打包的法线 + 纹理坐标
        desc.input_layout = vec![
            InputElementDesc::new("POSITION", Format::R32G32B32Float, 0, 0),
            InputElementDesc::new("NORMAL", Format::R32G32B32Float, 1, 0),
            InputElementDesc::new("TEXCOORD", Format::R32G32Float, 1, 12),
        ];
        desc.render_target_formats = vec![scene_color.texture().format()];
        desc.depth_stencil_format = device.depth_format();
        let pipeline = device.create_pipeline_state(desc)?;

        Ok(Self {
            pipeline,
            scene_color,
            viewport: Viewport::full(width, height),
        })
    }

    pub fn scene_color(&self) -> &RenderTarget {
        &self.scene_color
    }
}

impl RenderPass for BasePass {
    fn name(&self) -> &str {
        BASE_PASS
    }

    fn begin(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        let depth = ctx.device.default_depth_stencil_buffer();
        ctx.device.set_viewports(&[self.viewport])?;
        ctx.device.set_render_target(Some(&self.scene_color), Some(&depth))?;
        ctx.device.begin_pass()?;
        ctx.device.clear_render_target(Color::LIGHT_STEEL_BLUE)?;
        ctx.device.clear_depth_stencil_buffer()
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        let shadow_map = ctx.inputs.input(BASE_PASS, SHADOW_PASS)?;

        ctx.device.set_pipeline_state(&self.pipeline)?;
        ctx.device.set_texture_2d(shadow_map)?;
        ctx.device.set_const_buffer(ctx.scene.view_constants())?;

        for primitive in ctx.scene.primitives() {
            ctx.device.set_const_buffer(primitive.constants())?;
            let mesh = primitive.mesh();
            ctx.device
                .set_vertex_buffers(&[mesh.position_buffer(), mesh.attribute_buffer()])?;
            ctx.device.draw_indexed_primitive(mesh.index_buffer())?;
        }
        Ok(())
    }

    fn end(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        ctx.device.end_pass()
    }

    fn resize(&mut self, device: &mut DeviceContext, width: u32, height: u32) -> Result<()> {
        device.recreate_render_target(&mut self.scene_color, width, height)?;
        self.viewport = Viewport::full(width, height);
        Ok(())
    }

    fn output(&self) -> Option<Texture2D> {
        Some(self.scene_color.texture().clone())
    }
}
