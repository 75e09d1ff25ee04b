//! 后处理通道
//!
//! 以一个全屏三角形采样场景颜色，写入当前后台缓冲。
//! 三个顶点由顶点着色器按 `SV_VertexID` 生成，不绑定顶点缓冲。

use std::sync::Arc;

use super::base_pass::BASE_PASS;
use super::pass::{PassContext, RenderPass};
use crate::core::error::Result;
use crate::rhi::{
    CullMode, DepthStencilDesc, DeviceContext, PipelineState, PipelineStateDesc, RasterizerDesc, ShaderDesc,
    Viewport,
};

pub const POST_PROCESS_PASS: &str = "PostProcessPass";

/// 后处理通道
pub struct PostProcessPass {
    pipeline: Arc<PipelineState>,
    viewport: Viewport,
}

impl PostProcessPass {
    pub fn new(device: &mut DeviceContext) -> Result<Self> {
        let mut desc = PipelineStateDesc::new(
            POST_PROCESS_PASS,
            ShaderDesc::new("FullscreenVS", "PostProcess.hlsl", "VS"),
        );
        desc.pixel_shader = Some(ShaderDesc::new("PostProcessPS", "PostProcess.hlsl", "PS"));
        desc.rasterizer = RasterizerDesc {
            cull_mode: CullMode::None,
            ..RasterizerDesc::default()
        };
        desc.depth_stencil = DepthStencilDesc {
            depth_enable: false,
            depth_write: false,
            ..DepthStencilDesc::default()
        };
        desc.render_target_formats = vec![device.back_buffer_format()];
        let pipeline = device.create_pipeline_state(desc)?;

        Ok(Self {
            pipeline,
            viewport: Viewport::full(device.width(), device.height()),
        })
    }
}

impl RenderPass for PostProcessPass {
    fn name(&self) -> &str {
        POST_PROCESS_PASS
    }

    fn begin(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        let back_buffer = ctx.device.current_back_buffer();
        ctx.device.set_viewports(&[self.viewport])?;
        ctx.device.set_render_target(Some(&back_buffer), None)?;
        ctx.device.begin_pass()
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        let scene_color = ctx.inputs.input(POST_PROCESS_PASS, BASE_PASS)?;
        ctx.device.set_pipeline_state(&self.pipeline)?;
        ctx.device.set_texture_2d(scene_color)?;
        ctx.device.draw_primitive(3)
    }

    fn end(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        ctx.device.end_pass()
    }

    fn resize(&mut self, _device: &mut DeviceContext, width: u32, height: u32) -> Result<()> {
        self.viewport = Viewport::full(width, height);
        Ok(())
    }
}
