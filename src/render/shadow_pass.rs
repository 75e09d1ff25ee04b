//! 阴影通道
//!
//! 从方向光视角只写深度，结果作为基础通道的阴影贴图输入。
//! 阴影贴图的 SRV 绑定在纹理槽位（位置 2）。

use std::sync::Arc;

use super::pass::{PassContext, RenderPass};
use crate::core::error::Result;
use crate::rhi::{
    DepthStencilBuffer, DeviceContext, Format, InputElementDesc, PipelineState, PipelineStateDesc,
    RasterizerDesc, RootSignature, ShaderDesc, Texture2D, TextureDesc, Viewport,
};

pub const SHADOW_PASS: &str = "ShadowPass";

/// 阴影通道
pub struct ShadowPass {
    pipeline: Arc<PipelineState>,
    shadow_map: DepthStencilBuffer,
    viewport: Viewport,
}

impl ShadowPass {
    pub fn new(device: &mut DeviceContext) -> Result<Self> {
        let size = device.shadow_map_size();
        let mut shadow_map =
            device.create_depth_stencil_buffer(&TextureDesc::new("ShadowMap", size, size, Format::Unknown))?;
        shadow_map.texture_mut().set_location_index(RootSignature::TEXTURE);

        let mut desc = PipelineStateDesc::new(SHADOW_PASS, ShaderDesc::new("ShadowVS", "ShadowPass.hlsl", "VS"));
        desc.input_layout = vec![InputElementDesc::new("POSITION", Format::R32G32B32Float, 0, 0)];
        // 深度偏移，减轻阴影粉刺
        desc.rasterizer = RasterizerDesc {
            depth_bias: 100_000,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 1.0,
            ..RasterizerDesc::default()
        };
        desc.depth_stencil_format = shadow_map.texture().format();
        let pipeline = device.create_pipeline_state(desc)?;

        Ok(Self {
            pipeline,
            shadow_map,
            viewport: Viewport::full(size, size),
        })
    }

    pub fn shadow_map(&self) -> &DepthStencilBuffer {
        &self.shadow_map
    }

    pub fn pipeline(&self) -> &Arc<PipelineState> {
        &self.pipeline
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &str {
        SHADOW_PASS
    }

    fn begin(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        ctx.device.set_viewports(&[self.viewport])?;
        ctx.device.set_render_target(None, Some(&self.shadow_map))?;
        ctx.device.begin_pass()?;
        ctx.device.clear_depth_stencil_buffer()
    }

    fn render(&mut self, ctx: &mut PassContext<'_>) -> Result<()> {
        ctx.device.set_pipeline_state(&self.pipeline)?;
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

    fn output(&self) -> Option<Texture2D> {
        Some(self.shadow_map.texture().clone())
    }
}
