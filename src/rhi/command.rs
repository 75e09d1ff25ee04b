//! 命令录制模块
//!
//! 单一的命令分配器/命令列表对。命令列表在录制期做调试层式的校验：
//! 访问资源的命令要求资源处于兼容状态，绘制要求管线、视口、与管线匹配的
//! 渲染目标格式以及每个输入槽位的顶点缓冲都已绑定。
//!
//! # 命令列表状态
//!
//! ```text
//! Closed --reset--> Recording --close--> Closed
//! ```
//!
//! 分配器只有在上一次提交的 fence 值完成后才能重置。

use std::sync::Arc;

use super::pipeline::{PipelineState, RootParameter, RootSignature};
use super::resource::{ResourceDimension, ResourceId, ResourceRef};
use super::sync::{Fence, FenceValue};
use super::types::{Format, HeapKind, ResourceState, Viewport};
use crate::core::error::{GraphicsError, Result};

/// 顶点缓冲视图
#[derive(Debug, Clone)]
pub struct VertexBufferView {
    pub resource: ResourceRef,
    pub stride: u32,
    pub size: u64,
}

/// 索引缓冲视图
#[derive(Debug, Clone)]
pub struct IndexBufferView {
    pub resource: ResourceRef,
    pub format: Format,
    pub count: u32,
}

/// 录制的 GPU 命令
///
/// 命令持有资源引用，资源至少存活到命令在 GPU 时间线上执行完毕。
#[derive(Debug, Clone)]
pub enum Command {
    Barrier {
        resource: ResourceRef,
        before: ResourceState,
        after: ResourceState,
    },
    CopyBuffer {
        dst: ResourceRef,
        src: ResourceRef,
        bytes: u64,
    },
    ClearRenderTarget {
        target: ResourceRef,
        color: [f32; 4],
    },
    ClearDepthStencil {
        target: ResourceRef,
        depth: f32,
        stencil: u8,
    },
    SetDescriptorHeaps,
    SetRootSignature(Arc<RootSignature>),
    SetViewports(Vec<Viewport>),
    SetPipelineState(Arc<PipelineState>),
    SetRenderTargets {
        color: Option<ResourceRef>,
        depth: Option<ResourceRef>,
    },
    SetConstantBuffer {
        slot: u32,
        resource: ResourceRef,
    },
    SetShaderResource {
        slot: u32,
        resource: ResourceRef,
    },
    SetVertexBuffers(Vec<VertexBufferView>),
    SetIndexBuffer(IndexBufferView),
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    Draw {
        vertex_count: u32,
    },
    BeginEvent(String),
    EndEvent,
}

/// 已执行命令的轻量记录（只含资源 id，不持有资源）
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEntry {
    Barrier {
        resource: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
    Copy {
        dst: ResourceId,
        src: ResourceId,
        bytes: u64,
    },
    ClearRenderTarget(ResourceId),
    ClearDepthStencil(ResourceId),
    SetRenderTargets {
        color: Option<ResourceId>,
        depth: Option<ResourceId>,
    },
    SetPipelineState(String),
    SetConstantBuffer {
        slot: u32,
        resource: ResourceId,
    },
    SetShaderResource {
        slot: u32,
        resource: ResourceId,
    },
    DrawIndexed {
        index_count: u32,
    },
    Draw {
        vertex_count: u32,
    },
    BeginEvent(String),
    EndEvent,
    Present(ResourceId),
    /// 不涉及资源的状态设置
    State(&'static str),
}

impl Command {
    pub fn trace(&self) -> TraceEntry {
        match self {
            Command::Barrier { resource, before, after } => TraceEntry::Barrier {
                resource: resource.id(),
                before: *before,
                after: *after,
            },
            Command::CopyBuffer { dst, src, bytes } => TraceEntry::Copy {
                dst: dst.id(),
                src: src.id(),
                bytes: *bytes,
            },
            Command::ClearRenderTarget { target, .. } => TraceEntry::ClearRenderTarget(target.id()),
            Command::ClearDepthStencil { target, .. } => TraceEntry::ClearDepthStencil(target.id()),
            Command::SetRenderTargets { color, depth } => TraceEntry::SetRenderTargets {
                color: color.as_ref().map(|r| r.id()),
                depth: depth.as_ref().map(|r| r.id()),
            },
            Command::SetPipelineState(pso) => TraceEntry::SetPipelineState(pso.name().to_string()),
            Command::SetConstantBuffer { slot, resource } => TraceEntry::SetConstantBuffer {
                slot: *slot,
                resource: resource.id(),
            },
            Command::SetShaderResource { slot, resource } => TraceEntry::SetShaderResource {
                slot: *slot,
                resource: resource.id(),
            },
            Command::DrawIndexed { index_count, .. } => TraceEntry::DrawIndexed {
                index_count: *index_count,
            },
            Command::Draw { vertex_count } => TraceEntry::Draw {
                vertex_count: *vertex_count,
            },
            Command::BeginEvent(name) => TraceEntry::BeginEvent(name.clone()),
            Command::EndEvent => TraceEntry::EndEvent,
            Command::SetDescriptorHeaps => TraceEntry::State("SetDescriptorHeaps"),
            Command::SetRootSignature(_) => TraceEntry::State("SetRootSignature"),
            Command::SetViewports(_) => TraceEntry::State("SetViewports"),
            Command::SetVertexBuffers(_) => TraceEntry::State("SetVertexBuffers"),
            Command::SetIndexBuffer(_) => TraceEntry::State("SetIndexBuffer"),
        }
    }
}

/// 命令分配器
///
/// 记录最近一次使用它的提交对应的 fence 值。
#[derive(Debug, Default)]
pub struct CommandAllocator {
    last_submission: FenceValue,
}

impl CommandAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 重置分配器
    ///
    /// GPU 尚未完成上一次提交时返回错误。
    pub fn reset(&mut self, fence: &Fence) -> Result<()> {
        if !fence.is_completed(self.last_submission) {
            return Err(GraphicsError::CommandRecording(format!(
                "command allocator reset while fence {} is still in flight (completed {})",
                self.last_submission.value(),
                fence.completed_value().value()
            ))
            .into());
        }
        Ok(())
    }

    pub(crate) fn mark_submitted(&mut self, value: FenceValue) {
        self.last_submission = value;
    }

    pub fn last_submission(&self) -> FenceValue {
        self.last_submission
    }
}

/// 录制期绑定状态，用于校验
#[derive(Debug, Default)]
struct BoundState {
    root_signature: Option<Arc<RootSignature>>,
    pipeline: Option<Arc<PipelineState>>,
    color: Option<ResourceRef>,
    depth: Option<ResourceRef>,
    vertex_buffers: usize,
    index_buffer: Option<IndexBufferView>,
    viewport_set: bool,
    event_depth: u32,
}

/// 命令列表
#[derive(Debug, Default)]
pub struct CommandList {
    commands: Vec<Command>,
    open: bool,
    bound: BoundState,
}

impl CommandList {
    /// 创建处于关闭状态的命令列表
    pub fn new() -> Self {
        Self::default()
    }

    /// 重置并开始录制
    pub fn reset(&mut self, allocator: &mut CommandAllocator, fence: &Fence) -> Result<()> {
        if self.open {
            return Err(recording("reset called on an open command list"));
        }
        allocator.reset(fence)?;
        self.commands.clear();
        self.bound = BoundState::default();
        self.open = true;
        Ok(())
    }

    /// 结束录制并取出命令
    pub fn close(&mut self) -> Result<Vec<Command>> {
        self.ensure_open()?;
        if self.bound.event_depth != 0 {
            return Err(recording("command list closed with an unbalanced event marker"));
        }
        self.open = false;
        self.bound = BoundState::default();
        Ok(std::mem::take(&mut self.commands))
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// 已录制的命令
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// 资源状态转换
    ///
    /// 已处于目标状态时不录制屏障。
    pub fn transition(&mut self, resource: &ResourceRef, after: ResourceState) -> Result<()> {
        self.ensure_open()?;
        let before = resource.state();
        if before == after {
            return Ok(());
        }
        resource.set_state(after);
        self.commands.push(Command::Barrier {
            resource: resource.clone(),
            before,
            after,
        });
        Ok(())
    }

    /// 缓冲拷贝
    pub fn copy_buffer(&mut self, dst: &ResourceRef, src: &ResourceRef, bytes: u64) -> Result<()> {
        self.ensure_open()?;
        expect_state(dst, ResourceState::CopyDest)?;
        let src_readable = match src.heap() {
            HeapKind::Upload => src.state() == ResourceState::GenericRead,
            _ => src.state() == ResourceState::CopySource,
        };
        if !src_readable {
            return Err(state_error(src, "a copy-source state"));
        }
        if bytes > dst.size() || bytes > src.size() {
            return Err(recording(&format!(
                "copy of {} bytes exceeds '{}' ({}) or '{}' ({})",
                bytes,
                dst.name(),
                dst.size(),
                src.name(),
                src.size()
            )));
        }
        self.commands.push(Command::CopyBuffer {
            dst: dst.clone(),
            src: src.clone(),
            bytes,
        });
        Ok(())
    }

    pub fn clear_render_target(&mut self, target: &ResourceRef, color: [f32; 4]) -> Result<()> {
        self.ensure_open()?;
        expect_state(target, ResourceState::RenderTarget)?;
        self.commands.push(Command::ClearRenderTarget {
            target: target.clone(),
            color,
        });
        Ok(())
    }

    pub fn clear_depth_stencil(&mut self, target: &ResourceRef, depth: f32, stencil: u8) -> Result<()> {
        self.ensure_open()?;
        expect_state(target, ResourceState::DepthWrite)?;
        self.commands.push(Command::ClearDepthStencil {
            target: target.clone(),
            depth,
            stencil,
        });
        Ok(())
    }

    pub fn set_descriptor_heaps(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.commands.push(Command::SetDescriptorHeaps);
        Ok(())
    }

    pub fn set_root_signature(&mut self, root_signature: &Arc<RootSignature>) -> Result<()> {
        self.ensure_open()?;
        self.bound.root_signature = Some(root_signature.clone());
        self.commands.push(Command::SetRootSignature(root_signature.clone()));
        Ok(())
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) -> Result<()> {
        self.ensure_open()?;
        if viewports.is_empty() {
            return Err(recording("at least one viewport is required"));
        }
        self.bound.viewport_set = true;
        self.commands.push(Command::SetViewports(viewports.to_vec()));
        Ok(())
    }

    pub fn set_pipeline_state(&mut self, pipeline: &Arc<PipelineState>) -> Result<()> {
        self.ensure_open()?;
        let root = self.root_signature()?;
        if !Arc::ptr_eq(root, pipeline.root_signature()) {
            return Err(recording(&format!(
                "pipeline '{}' was built against a different binding layout",
                pipeline.name()
            )));
        }
        self.bound.pipeline = Some(pipeline.clone());
        self.commands.push(Command::SetPipelineState(pipeline.clone()));
        Ok(())
    }

    /// 绑定渲染目标与深度缓冲
    pub fn set_render_targets(&mut self, color: Option<&ResourceRef>, depth: Option<&ResourceRef>) -> Result<()> {
        self.ensure_open()?;
        if let Some(color) = color {
            expect_state(color, ResourceState::RenderTarget)?;
        }
        if let Some(depth) = depth {
            expect_state(depth, ResourceState::DepthWrite)?;
        }
        self.bound.color = color.cloned();
        self.bound.depth = depth.cloned();
        self.commands.push(Command::SetRenderTargets {
            color: color.cloned(),
            depth: depth.cloned(),
        });
        Ok(())
    }

    /// 绑定根常量缓冲
    pub fn set_constant_buffer(&mut self, slot: u32, resource: &ResourceRef) -> Result<()> {
        self.ensure_open()?;
        match self.root_signature()?.parameter(slot) {
            Some(RootParameter::ConstantBuffer { .. }) => {}
            other => {
                return Err(recording(&format!(
                    "slot {} is {:?}, not a constant buffer",
                    slot, other
                )))
            }
        }
        if resource.heap() != HeapKind::Upload {
            return Err(recording(&format!(
                "constant buffer '{}' must live in the upload heap",
                resource.name()
            )));
        }
        expect_state(resource, ResourceState::GenericRead)?;
        self.commands.push(Command::SetConstantBuffer {
            slot,
            resource: resource.clone(),
        });
        Ok(())
    }

    /// 绑定着色器读取的纹理
    ///
    /// 纹理必须处于着色器可读状态，生产者通道的 End 必须已经录制。
    pub fn set_shader_resource(&mut self, slot: u32, resource: &ResourceRef) -> Result<()> {
        self.ensure_open()?;
        match self.root_signature()?.parameter(slot) {
            Some(RootParameter::ShaderResourceTable { .. }) => {}
            other => {
                return Err(recording(&format!(
                    "slot {} is {:?}, not a shader resource table",
                    slot, other
                )))
            }
        }
        if !resource.state().is_shader_readable() {
            return Err(state_error(resource, "a shader-readable state"));
        }
        self.commands.push(Command::SetShaderResource {
            slot,
            resource: resource.clone(),
        });
        Ok(())
    }

    pub fn set_vertex_buffers(&mut self, views: &[VertexBufferView]) -> Result<()> {
        self.ensure_open()?;
        for view in views {
            if !view.resource.state().is_buffer_readable() {
                return Err(state_error(&view.resource, "GenericRead"));
            }
        }
        self.bound.vertex_buffers = views.len();
        self.commands.push(Command::SetVertexBuffers(views.to_vec()));
        Ok(())
    }

    pub fn set_index_buffer(&mut self, view: &IndexBufferView) -> Result<()> {
        self.ensure_open()?;
        if !matches!(view.format, Format::R16Uint | Format::R32Uint) {
            return Err(GraphicsError::UnsupportedFormat(format!(
                "{} index buffers are not supported by primitive assembly",
                view.format.name()
            ))
            .into());
        }
        if !view.resource.state().is_buffer_readable() {
            return Err(state_error(&view.resource, "GenericRead"));
        }
        self.bound.index_buffer = Some(view.clone());
        self.commands.push(Command::SetIndexBuffer(view.clone()));
        Ok(())
    }

    /// 索引绘制
    pub fn draw_indexed(&mut self, index_count: u32, start_index: u32, base_vertex: i32) -> Result<()> {
        self.ensure_open()?;
        let pipeline = self.validate_draw()?;
        if self.bound.vertex_buffers < pipeline.input_slot_count() as usize {
            return Err(recording(&format!(
                "pipeline '{}' reads {} vertex streams, {} bound",
                pipeline.name(),
                pipeline.input_slot_count(),
                self.bound.vertex_buffers
            )));
        }
        let indices = self
            .bound
            .index_buffer
            .as_ref()
            .ok_or_else(|| recording("indexed draw without an index buffer"))?;
        if start_index as u64 + index_count as u64 > indices.count as u64 {
            return Err(recording(&format!(
                "draw reads indices {}..{} of {}",
                start_index,
                start_index + index_count,
                indices.count
            )));
        }
        self.commands.push(Command::DrawIndexed {
            index_count,
            start_index,
            base_vertex,
        });
        Ok(())
    }

    /// 非索引绘制（顶点由着色器生成，例如全屏三角形）
    pub fn draw(&mut self, vertex_count: u32) -> Result<()> {
        self.ensure_open()?;
        let pipeline = self.validate_draw()?;
        if self.bound.vertex_buffers < pipeline.input_slot_count() as usize {
            return Err(recording(&format!(
                "pipeline '{}' reads vertex streams but none are bound",
                pipeline.name()
            )));
        }
        self.commands.push(Command::Draw { vertex_count });
        Ok(())
    }

    /// 开始一段命名事件（统计按事件归属到渲染通道）
    pub fn begin_event(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        self.bound.event_depth += 1;
        self.commands.push(Command::BeginEvent(name.to_string()));
        Ok(())
    }

    pub fn end_event(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.bound.event_depth == 0 {
            return Err(recording("end_event without a matching begin_event"));
        }
        self.bound.event_depth -= 1;
        self.commands.push(Command::EndEvent);
        Ok(())
    }

    fn validate_draw(&self) -> Result<Arc<PipelineState>> {
        let pipeline = self
            .bound
            .pipeline
            .clone()
            .ok_or_else(|| recording("draw without a pipeline state"))?;
        if !self.bound.viewport_set {
            return Err(recording("draw without a viewport"));
        }

        let color_formats: Vec<Format> = self.bound.color.iter().map(|r| texture_format(r)).collect();
        if color_formats != pipeline.render_target_formats() {
            return Err(recording(&format!(
                "pipeline '{}' expects render targets {:?}, bound {:?}",
                pipeline.name(),
                pipeline.render_target_formats(),
                color_formats
            )));
        }
        let depth_format = self
            .bound
            .depth
            .as_ref()
            .map(texture_format)
            .unwrap_or(Format::Unknown);
        if depth_format != pipeline.depth_stencil_format() {
            return Err(recording(&format!(
                "pipeline '{}' expects depth {}, bound {}",
                pipeline.name(),
                pipeline.depth_stencil_format().name(),
                depth_format.name()
            )));
        }
        Ok(pipeline)
    }

    fn root_signature(&self) -> Result<&Arc<RootSignature>> {
        self.bound
            .root_signature
            .as_ref()
            .ok_or_else(|| recording("no root signature bound"))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(recording("command list is not recording"))
        }
    }
}

fn texture_format(resource: &ResourceRef) -> Format {
    match resource.dimension() {
        ResourceDimension::Texture2D { format, .. } => format,
        ResourceDimension::Buffer => Format::Unknown,
    }
}

fn expect_state(resource: &ResourceRef, expected: ResourceState) -> Result<()> {
    if resource.state() == expected {
        Ok(())
    } else {
        Err(state_error(resource, &format!("{:?}", expected)))
    }
}

fn state_error(resource: &ResourceRef, expected: &str) -> crate::core::error::RenderError {
    GraphicsError::InvalidResourceState {
        resource: resource.name().to_string(),
        expected: expected.to_string(),
        actual: resource.state(),
    }
    .into()
}

fn recording(message: &str) -> crate::core::error::RenderError {
    GraphicsError::CommandRecording(message.to_string()).into()
}
