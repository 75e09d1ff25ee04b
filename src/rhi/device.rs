//! 设备上下文
//!
//! [`DeviceContext`] 是唯一的帧与命令权威：持有命令队列、单一的命令分配器/命令列表、
//! fence、交换链、描述符堆和共享绑定布局，对外提供资源创建与命令录制入口。
//!
//! # 帧状态机
//!
//! ```text
//! Idle --begin_frame--> Recording --end_frame (submit, present, flush)--> Idle
//! ```
//!
//! 同一时刻只有一帧在途：`end_frame` 会阻塞到 GPU 完成本帧，
//! 所以下一次 `begin_frame` 重置分配器总是安全的。
//!
//! # 通道绑定
//!
//! `set_render_target` 只声明本通道的目标，`begin_pass` 才录制状态转换和绑定，
//! `end_pass` 把目标转回着色器可读状态（后台缓冲除外，它在 `end_frame` 转为 `Present`）。

use std::path::PathBuf;
use std::sync::Arc;

use bytemuck::Pod;
use tracing::{debug, info, instrument, trace};

use super::buffer::{normalize_indices, ConstBuffer, IndexBuffer, VertexBuffer};
use super::command::{CommandAllocator, CommandList, TraceEntry};
use super::descriptor::{DescriptorHandle, DescriptorHeap, DescriptorHeapDesc, DescriptorHeapUsage, ViewRecord};
use super::pipeline::{PipelineState, PipelineStateDesc, RootSignature};
use super::queue::{CommandQueue, FrameStats};
use super::resource::{Resource, ResourceDesc, ResourceRef};
use super::swap_chain::SwapChain;
use super::texture::{DepthStencilBuffer, RenderTarget, Texture2D, TextureDesc};
use super::types::{Format, HeapKind, ResourceState, Viewport};
use crate::core::config::{Config, DescriptorCapacities};
use crate::core::error::{GraphicsError, RenderError, Result};
use crate::math::Color;

/// 设备初始化参数
#[derive(Debug, Clone)]
pub struct DeviceDesc {
    pub width: u32,
    pub height: u32,
    pub back_buffer_format: Format,
    pub depth_format: Format,
    pub shadow_map_size: u32,
    pub descriptors: DescriptorCapacities,
    /// 相对着色器路径的基准目录
    pub shader_dir: PathBuf,
}

impl From<&Config> for DeviceDesc {
    fn from(config: &Config) -> Self {
        Self {
            width: config.window.width,
            height: config.window.height,
            back_buffer_format: config.graphics.back_buffer_format,
            depth_format: config.graphics.depth_format,
            shadow_map_size: config.graphics.shadow_map_size,
            descriptors: config.graphics.descriptors,
            shader_dir: config.graphics.shader_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Recording,
}

/// 设备上下文
pub struct DeviceContext {
    desc: DeviceDesc,
    queue: CommandQueue,
    allocator: CommandAllocator,
    command_list: CommandList,
    rtv_heap: DescriptorHeap,
    dsv_heap: DescriptorHeap,
    srv_heap: DescriptorHeap,
    root_signature: Arc<RootSignature>,
    swap_chain: SwapChain,
    default_depth: DepthStencilBuffer,
    /// 帧内上传的暂存资源，`end_frame` 冲刷后释放
    pending_staging: Vec<ResourceRef>,
    pass_color: Option<RenderTarget>,
    pass_depth: Option<DepthStencilBuffer>,
    pass_open: bool,
    frame_state: FrameState,
    frame_index: u64,
    last_frame_stats: FrameStats,
    last_frame_trace: Vec<TraceEntry>,
}

impl DeviceContext {
    /// 初始化设备
    ///
    /// 创建命令队列、描述符堆、共享绑定布局、交换链和默认深度缓冲。
    #[instrument(skip_all, fields(width = desc.width, height = desc.height))]
    pub fn init(desc: DeviceDesc) -> Result<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GraphicsError::DeviceCreation(format!(
                "viewport {}x{} is empty",
                desc.width, desc.height
            ))
            .into());
        }
        if !desc.depth_format.is_depth() {
            return Err(GraphicsError::DeviceCreation(format!(
                "{} is not a depth format",
                desc.depth_format.name()
            ))
            .into());
        }

        let queue = CommandQueue::new()?;
        let mut rtv_heap = DescriptorHeap::new(DescriptorHeapDesc::rtv(desc.descriptors.rtv_capacity))?;
        let mut dsv_heap = DescriptorHeap::new(DescriptorHeapDesc::dsv(desc.descriptors.dsv_capacity))?;
        let srv_heap = DescriptorHeap::new(DescriptorHeapDesc::srv(desc.descriptors.srv_capacity))?;

        let swap_chain = SwapChain::new(&mut rtv_heap, desc.width, desc.height, desc.back_buffer_format)?;

        let dsv = dsv_heap.allocate()?;
        let depth = depth_resource("DefaultDepthStencil", desc.width, desc.height, desc.depth_format)?;
        dsv_heap.write_view(&dsv, ViewRecord { resource: depth.id(), format: desc.depth_format })?;
        let default_depth = DepthStencilBuffer::new(Texture2D::new(depth, None), dsv);

        info!(
            width = desc.width,
            height = desc.height,
            back_buffer = desc.back_buffer_format.name(),
            depth = desc.depth_format.name(),
            shadow_map_size = desc.shadow_map_size,
            "Device context initialized"
        );

        Ok(Self {
            desc,
            queue,
            allocator: CommandAllocator::new(),
            command_list: CommandList::new(),
            rtv_heap,
            dsv_heap,
            srv_heap,
            root_signature: RootSignature::standard(),
            swap_chain,
            default_depth,
            pending_staging: Vec::new(),
            pass_color: None,
            pass_depth: None,
            pass_open: false,
            frame_state: FrameState::Idle,
            frame_index: 0,
            last_frame_stats: FrameStats::default(),
            last_frame_trace: Vec::new(),
        })
    }

    /// 关闭设备：等待 GPU 空闲后释放全部对象
    pub fn shutdown(mut self) -> Result<()> {
        if self.frame_state == FrameState::Recording {
            return Err(recording("shutdown while a frame is recording"));
        }
        self.flush_rendering_commands()?;
        info!(frames = self.frame_index, "Device context shut down");
        Ok(())
    }

    /// 阻塞直到 GPU 完成全部已提交的工作
    pub fn flush_rendering_commands(&mut self) -> Result<()> {
        let value = self.queue.flush()?;
        self.allocator.mark_submitted(value);
        if self.frame_state == FrameState::Idle {
            self.pending_staging.clear();
        }
        Ok(())
    }

    /// 调整输出尺寸
    ///
    /// 先冲刷管线，再重建后台缓冲和默认深度缓冲。描述符槽位原地复用。
    #[instrument(skip(self))]
    pub fn resize_window(&mut self, width: u32, height: u32) -> Result<()> {
        if self.frame_state == FrameState::Recording {
            return Err(recording("resize while a frame is recording"));
        }
        if width == 0 || height == 0 {
            return Err(GraphicsError::SwapchainError(format!("cannot resize to {}x{}", width, height)).into());
        }

        self.flush_rendering_commands()?;

        self.swap_chain.resize(&mut self.rtv_heap, width, height)?;

        let dsv = self.default_depth.dsv();
        let depth = depth_resource("DefaultDepthStencil", width, height, self.desc.depth_format)?;
        self.dsv_heap
            .write_view(&dsv, ViewRecord { resource: depth.id(), format: self.desc.depth_format })?;
        self.default_depth = DepthStencilBuffer::new(Texture2D::new(depth, None), dsv);

        self.desc.width = width;
        self.desc.height = height;
        info!(width, height, "Window resized");
        Ok(())
    }

    /// 开始一帧
    pub fn begin_frame(&mut self) -> Result<()> {
        if self.frame_state == FrameState::Recording {
            return Err(recording("begin_frame called twice without end_frame"));
        }

        // 帧外上传产生的记录不属于任何一帧
        self.queue.take_stats();
        self.queue.take_trace();

        self.command_list.reset(&mut self.allocator, self.queue.fence())?;
        self.frame_state = FrameState::Recording;
        self.command_list.set_descriptor_heaps()?;
        self.command_list.set_root_signature(&self.root_signature)?;
        let back_buffer = self.swap_chain.current_back_buffer().resource().clone();
        self.command_list.transition(&back_buffer, ResourceState::RenderTarget)?;

        trace!(frame = self.frame_index, back_buffer = self.swap_chain.current_index(), "Frame begun");
        Ok(())
    }

    /// 结束一帧：提交、呈现、切换后台缓冲并冲刷
    pub fn end_frame(&mut self) -> Result<()> {
        self.ensure_recording()?;
        if self.pass_open {
            return Err(recording("end_frame called inside an open pass"));
        }

        let back_buffer = self.swap_chain.current_back_buffer().resource().clone();
        self.command_list.transition(&back_buffer, ResourceState::Present)?;
        let commands = self.command_list.close()?;
        self.frame_state = FrameState::Idle;
        self.pass_color = None;
        self.pass_depth = None;

        let command_count = commands.len();
        self.queue.execute(commands)?;
        self.queue.present(back_buffer)?;
        self.swap_chain.advance();
        self.flush_rendering_commands()?;

        self.last_frame_stats = self.queue.take_stats();
        self.last_frame_trace = self.queue.take_trace();
        debug!(
            frame = self.frame_index,
            commands = command_count,
            draws = self.last_frame_stats.draws.len(),
            "Frame presented"
        );
        self.frame_index += 1;
        Ok(())
    }

    /// 创建常量缓冲（大小向上对齐到 256 字节）
    pub fn create_const_buffer<T: Pod>(&mut self, name: &str, data: &T, location_index: u32) -> Result<ConstBuffer<T>> {
        ConstBuffer::new(name, data, location_index)
    }

    /// 创建顶点缓冲并上传初始数据
    pub fn create_vertex_buffer(&mut self, name: &str, stride: u32, data: &[u8]) -> Result<VertexBuffer> {
        if data.is_empty() {
            return Err(GraphicsError::MissingInitialData(format!("vertex buffer '{}'", name)).into());
        }
        if stride == 0 || data.len() % stride as usize != 0 {
            return Err(GraphicsError::ResourceCreation(format!(
                "vertex buffer '{}' of {} bytes is not a multiple of stride {}",
                name,
                data.len(),
                stride
            ))
            .into());
        }
        let resource = self.upload_buffer(name, data, ResourceState::GenericRead)?;
        Ok(VertexBuffer::new(resource, stride))
    }

    /// 创建索引缓冲并上传初始数据
    ///
    /// 8 位索引在上传前扩展为 16 位。
    pub fn create_index_buffer(&mut self, name: &str, format: Format, count: u32, data: &[u8]) -> Result<IndexBuffer> {
        if count == 0 || data.is_empty() {
            return Err(GraphicsError::MissingInitialData(format!("index buffer '{}'", name)).into());
        }
        let (format, bytes) = normalize_indices(format, count, data)?;
        let resource = self.upload_buffer(name, &bytes, ResourceState::GenericRead)?;
        Ok(IndexBuffer::new(resource, format, count))
    }

    /// 创建二维纹理
    ///
    /// 提供数据时经暂存资源上传，最终处于 `PixelShaderResource`。
    pub fn create_texture_2d(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<Texture2D> {
        let format = self.resolve_format(desc.format, self.desc.back_buffer_format);
        let resource_desc = ResourceDesc::texture_2d(desc.name.clone(), desc.width, desc.height, format);

        let resource = match data {
            Some(data) => {
                if data.len() as u64 != resource_desc.size {
                    return Err(GraphicsError::ResourceCreation(format!(
                        "texture '{}' expects {} bytes, got {}",
                        desc.name,
                        resource_desc.size,
                        data.len()
                    ))
                    .into());
                }
                let resource = Resource::new(resource_desc, ResourceState::Common)?;
                self.upload(&resource, data, ResourceState::PixelShaderResource)?;
                resource
            }
            None => Resource::new(resource_desc, ResourceState::PixelShaderResource)?,
        };

        let srv = self.srv_heap.allocate()?;
        self.srv_heap.write_view(&srv, ViewRecord { resource: resource.id(), format })?;
        Ok(Texture2D::new(resource, Some(srv)))
    }

    /// 创建深度模板缓冲（DSV + SRV），初始处于 `DepthWrite`
    pub fn create_depth_stencil_buffer(&mut self, desc: &TextureDesc) -> Result<DepthStencilBuffer> {
        let format = self.resolve_format(desc.format, self.desc.depth_format);
        if !format.is_depth() {
            return Err(GraphicsError::UnsupportedFormat(format!(
                "depth-stencil buffer '{}' cannot use {}",
                desc.name,
                format.name()
            ))
            .into());
        }
        let resource = depth_resource(&desc.name, desc.width, desc.height, format)?;
        let dsv = self.dsv_heap.allocate()?;
        self.dsv_heap.write_view(&dsv, ViewRecord { resource: resource.id(), format })?;
        let srv = self.srv_heap.allocate()?;
        self.srv_heap.write_view(&srv, ViewRecord { resource: resource.id(), format })?;
        Ok(DepthStencilBuffer::new(Texture2D::new(resource, Some(srv)), dsv))
    }

    /// 创建离屏渲染目标（RTV + SRV），初始处于 `PixelShaderResource`
    pub fn create_render_target(&mut self, desc: &TextureDesc) -> Result<RenderTarget> {
        let format = self.resolve_format(desc.format, self.desc.back_buffer_format);
        if !format.is_color() {
            return Err(GraphicsError::UnsupportedFormat(format!(
                "render target '{}' cannot use {}",
                desc.name,
                format.name()
            ))
            .into());
        }
        let resource = Resource::new(
            ResourceDesc::texture_2d(desc.name.clone(), desc.width, desc.height, format),
            ResourceState::PixelShaderResource,
        )?;
        let rtv = self.rtv_heap.allocate()?;
        self.rtv_heap.write_view(&rtv, ViewRecord { resource: resource.id(), format })?;
        let srv = self.srv_heap.allocate()?;
        self.srv_heap.write_view(&srv, ViewRecord { resource: resource.id(), format })?;
        Ok(RenderTarget::new(Texture2D::new(resource, Some(srv)), rtv, false))
    }

    /// 以新尺寸重建渲染目标，RTV/SRV 槽位与绑定位置保持不变
    pub fn recreate_render_target(&mut self, target: &mut RenderTarget, width: u32, height: u32) -> Result<()> {
        if self.frame_state == FrameState::Recording {
            return Err(recording("render target recreated while a frame is recording"));
        }
        self.flush_rendering_commands()?;

        let format = target.texture().format();
        let name = target.resource().name().to_string();
        let resource = Resource::new(
            ResourceDesc::texture_2d(name, width, height, format),
            ResourceState::PixelShaderResource,
        )?;
        let rtv = target.rtv();
        self.rtv_heap.write_view(&rtv, ViewRecord { resource: resource.id(), format })?;
        let srv = target.texture().srv();
        if let Some(srv) = &srv {
            self.srv_heap.write_view(srv, ViewRecord { resource: resource.id(), format })?;
        }

        let location_index = target.texture().location_index();
        let mut texture = Texture2D::new(resource, srv);
        texture.set_location_index(location_index);
        *target = RenderTarget::new(texture, rtv, target.is_back_buffer());
        debug!(target = target.resource().name(), width, height, "Render target recreated");
        Ok(())
    }

    /// 构建管线状态，绑定到共享绑定布局
    pub fn create_pipeline_state(&mut self, desc: PipelineStateDesc) -> Result<Arc<PipelineState>> {
        let pipeline = PipelineState::new(desc, self.root_signature.clone(), &self.desc.shader_dir)?;
        Ok(Arc::new(pipeline))
    }

    pub fn set_pipeline_state(&mut self, pipeline: &Arc<PipelineState>) -> Result<()> {
        self.ensure_recording()?;
        self.command_list.set_pipeline_state(pipeline)
    }

    /// 按常量缓冲的位置索引绑定
    pub fn set_const_buffer<T: Pod>(&mut self, buffer: &ConstBuffer<T>) -> Result<()> {
        self.ensure_recording()?;
        self.command_list
            .set_constant_buffer(buffer.location_index(), buffer.resource())
    }

    /// 绑定顶点流，下标即输入槽位
    pub fn set_vertex_buffers(&mut self, buffers: &[&VertexBuffer]) -> Result<()> {
        self.ensure_recording()?;
        let views: Vec<_> = buffers.iter().map(|b| b.view()).collect();
        self.command_list.set_vertex_buffers(&views)
    }

    /// 绑定索引缓冲并绘制全部索引
    pub fn draw_indexed_primitive(&mut self, index_buffer: &IndexBuffer) -> Result<()> {
        self.ensure_recording()?;
        self.command_list.set_index_buffer(&index_buffer.view())?;
        self.command_list.draw_indexed(index_buffer.count(), 0, 0)
    }

    /// 非索引绘制
    pub fn draw_primitive(&mut self, vertex_count: u32) -> Result<()> {
        self.ensure_recording()?;
        self.command_list.draw(vertex_count)
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) -> Result<()> {
        self.ensure_recording()?;
        self.command_list.set_viewports(viewports)
    }

    /// 声明接下来的通道写入的目标
    pub fn set_render_target(&mut self, color: Option<&RenderTarget>, depth: Option<&DepthStencilBuffer>) -> Result<()> {
        self.ensure_recording()?;
        if self.pass_open {
            return Err(recording("render targets changed inside an open pass"));
        }
        self.pass_color = color.cloned();
        self.pass_depth = depth.cloned();
        Ok(())
    }

    /// 开始通道：目标转为可写状态并绑定
    pub fn begin_pass(&mut self) -> Result<()> {
        self.ensure_recording()?;
        if self.pass_open {
            return Err(recording("begin_pass called inside an open pass"));
        }
        let color = self.pass_color.as_ref().map(|rt| rt.resource().clone());
        let depth = self.pass_depth.as_ref().map(|ds| ds.resource().clone());
        if let Some(color) = &color {
            self.command_list.transition(color, ResourceState::RenderTarget)?;
        }
        if let Some(depth) = &depth {
            self.command_list.transition(depth, ResourceState::DepthWrite)?;
        }
        self.command_list.set_render_targets(color.as_ref(), depth.as_ref())?;
        self.pass_open = true;
        Ok(())
    }

    /// 结束通道：目标转回着色器可读状态
    pub fn end_pass(&mut self) -> Result<()> {
        self.ensure_recording()?;
        if !self.pass_open {
            return Err(recording("end_pass without a matching begin_pass"));
        }
        if let Some(color) = &self.pass_color {
            if !color.is_back_buffer() {
                let color = color.resource().clone();
                self.command_list.transition(&color, ResourceState::PixelShaderResource)?;
            }
        }
        if let Some(depth) = &self.pass_depth {
            let depth = depth.resource().clone();
            self.command_list.transition(&depth, ResourceState::PixelShaderResource)?;
        }
        self.pass_open = false;
        Ok(())
    }

    /// 清除当前通道的颜色目标
    pub fn clear_render_target(&mut self, color: Color) -> Result<()> {
        self.ensure_recording()?;
        let target = self
            .pass_color
            .as_ref()
            .map(|rt| rt.resource().clone())
            .ok_or_else(|| recording("clear_render_target without a bound render target"))?;
        self.command_list.clear_render_target(&target, color.to_array())
    }

    /// 清除当前通道的深度缓冲（深度 1.0，模板 0）
    pub fn clear_depth_stencil_buffer(&mut self) -> Result<()> {
        self.ensure_recording()?;
        let target = self
            .pass_depth
            .as_ref()
            .map(|ds| ds.resource().clone())
            .ok_or_else(|| recording("clear_depth_stencil_buffer without a bound depth buffer"))?;
        self.command_list.clear_depth_stencil(&target, 1.0, 0)
    }

    /// 按纹理的位置索引绑定着色器输入
    pub fn set_texture_2d(&mut self, texture: &Texture2D) -> Result<()> {
        self.ensure_recording()?;
        self.command_list
            .set_shader_resource(texture.location_index(), texture.resource())
    }

    pub fn begin_event(&mut self, name: &str) -> Result<()> {
        self.ensure_recording()?;
        self.command_list.begin_event(name)
    }

    pub fn end_event(&mut self) -> Result<()> {
        self.ensure_recording()?;
        self.command_list.end_event()
    }

    /// 调试读回：把资源内容拷贝到 `Readback` 堆并返回字节
    ///
    /// 只能在帧外调用，调用会冲刷 GPU。
    pub fn read_back(&mut self, resource: &ResourceRef) -> Result<Vec<u8>> {
        if self.frame_state == FrameState::Recording {
            return Err(recording("read_back while a frame is recording"));
        }
        if resource.heap().is_cpu_visible() {
            self.flush_rendering_commands()?;
            return resource.read_bytes();
        }

        let readback = Resource::new(
            ResourceDesc::buffer(format!("{} readback", resource.name()), HeapKind::Readback, resource.size()),
            ResourceState::CopyDest,
        )?;
        let source = resource.clone();
        let target = readback.clone();
        self.submit_immediate(move |list| {
            let previous = source.state();
            list.transition(&source, ResourceState::CopySource)?;
            list.copy_buffer(&target, &source, source.size())?;
            list.transition(&source, previous)
        })?;
        readback.read_bytes()
    }

    /// 当前后台缓冲
    pub fn current_back_buffer(&self) -> RenderTarget {
        self.swap_chain.current_back_buffer().clone()
    }

    pub fn default_depth_stencil_buffer(&self) -> DepthStencilBuffer {
        self.default_depth.clone()
    }

    pub fn swap_chain(&self) -> &SwapChain {
        &self.swap_chain
    }

    pub fn rtv_heap_usage(&self) -> DescriptorHeapUsage {
        (&self.rtv_heap).into()
    }

    pub fn dsv_heap_usage(&self) -> DescriptorHeapUsage {
        (&self.dsv_heap).into()
    }

    pub fn srv_heap_usage(&self) -> DescriptorHeapUsage {
        (&self.srv_heap).into()
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// 输出宽高比
    pub fn aspect_ratio(&self) -> f32 {
        self.desc.width as f32 / self.desc.height as f32
    }

    pub fn shadow_map_size(&self) -> u32 {
        self.desc.shadow_map_size
    }

    pub fn back_buffer_format(&self) -> Format {
        self.desc.back_buffer_format
    }

    pub fn depth_format(&self) -> Format {
        self.desc.depth_format
    }

    pub fn root_signature(&self) -> &Arc<RootSignature> {
        &self.root_signature
    }

    /// 已呈现的帧数
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn is_recording(&self) -> bool {
        self.frame_state == FrameState::Recording
    }

    /// 上一帧在 GPU 时间线上的统计
    pub fn last_frame_stats(&self) -> &FrameStats {
        &self.last_frame_stats
    }

    /// 上一帧执行过的命令记录
    pub fn last_frame_trace(&self) -> &[TraceEntry] {
        &self.last_frame_trace
    }

    /// 资源的 SRV 是否存在于着色器可见堆
    pub fn srv_view(&self, handle: &DescriptorHandle) -> Option<ViewRecord> {
        self.srv_heap.view(handle)
    }

    fn upload_buffer(&mut self, name: &str, data: &[u8], final_state: ResourceState) -> Result<ResourceRef> {
        let resource = Resource::new(
            ResourceDesc::buffer(name, HeapKind::Default, data.len() as u64),
            ResourceState::Common,
        )?;
        self.upload(&resource, data, final_state)?;
        Ok(resource)
    }

    /// 暂存上传：`Common` -> `CopyDest` -> 拷贝 -> `final_state`
    ///
    /// 帧外立即提交并冲刷；帧内录制到本帧命令列表，暂存资源保留到 `end_frame`。
    fn upload(&mut self, dst: &ResourceRef, data: &[u8], final_state: ResourceState) -> Result<()> {
        let staging = Resource::new(
            ResourceDesc::buffer(format!("{} staging", dst.name()), HeapKind::Upload, data.len() as u64),
            ResourceState::GenericRead,
        )?;
        staging.write_bytes(0, data)?;

        let record = {
            let dst = dst.clone();
            let staging = staging.clone();
            let bytes = data.len() as u64;
            move |list: &mut CommandList| -> Result<()> {
                list.transition(&dst, ResourceState::CopyDest)?;
                list.copy_buffer(&dst, &staging, bytes)?;
                list.transition(&dst, final_state)
            }
        };

        match self.frame_state {
            FrameState::Recording => {
                record(&mut self.command_list)?;
                self.pending_staging.push(staging);
            }
            FrameState::Idle => self.submit_immediate(record)?,
        }
        trace!(resource = dst.name(), bytes = data.len(), "Upload recorded");
        Ok(())
    }

    /// 录制一段命令，立即提交并等待完成
    fn submit_immediate<F>(&mut self, record: F) -> Result<()>
    where
        F: FnOnce(&mut CommandList) -> Result<()>,
    {
        self.command_list.reset(&mut self.allocator, self.queue.fence())?;
        let recorded = record(&mut self.command_list);
        let commands = self.command_list.close()?;
        recorded?;
        self.queue.execute(commands)?;
        self.flush_rendering_commands()
    }

    fn resolve_format(&self, requested: Format, fallback: Format) -> Format {
        if requested == Format::Unknown {
            fallback
        } else {
            requested
        }
    }

    fn ensure_recording(&self) -> Result<()> {
        match self.frame_state {
            FrameState::Recording => Ok(()),
            FrameState::Idle => Err(recording("no frame is recording; call begin_frame first")),
        }
    }
}

fn depth_resource(name: &str, width: u32, height: u32, format: Format) -> Result<ResourceRef> {
    Resource::new(ResourceDesc::texture_2d(name, width, height, format), ResourceState::DepthWrite)
}

fn recording(message: &str) -> RenderError {
    GraphicsError::CommandRecording(message.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_device() -> DeviceContext {
        let mut config = Config::default();
        config.window.width = 8;
        config.window.height = 4;
        config.graphics.shadow_map_size = 16;
        DeviceContext::init(DeviceDesc::from(&config)).unwrap()
    }

    #[test]
    fn test_init_allocates_back_buffers_and_depth() {
        let device = small_device();
        assert_eq!(device.rtv_heap_usage().allocated, 2);
        assert_eq!(device.dsv_heap_usage().allocated, 1);
        assert_eq!(device.srv_heap_usage().allocated, 0);
        assert_eq!(device.current_back_buffer().texture().state(), ResourceState::Present);
        let depth = device.default_depth_stencil_buffer();
        assert_eq!(depth.texture().state(), ResourceState::DepthWrite);
        assert_eq!((depth.texture().width(), depth.texture().height()), (8, 4));
    }

    #[test]
    fn test_vertex_upload_round_trip() {
        let mut device = small_device();
        let data: Vec<u8> = (0..48u8).collect();
        let vb = device.create_vertex_buffer("positions", 12, &data).unwrap();
        assert_eq!(vb.count(), 4);
        assert_eq!(vb.resource().state(), ResourceState::GenericRead);
        assert_eq!(device.read_back(vb.resource()).unwrap(), data);
        assert_eq!(vb.resource().state(), ResourceState::GenericRead);
    }

    #[test]
    fn test_index_buffer_widens_8bit() {
        let mut device = small_device();
        let ib = device
            .create_index_buffer("indices", Format::R8Uint, 4, &[0, 1, 2, 255])
            .unwrap();
        assert_eq!(ib.format(), Format::R16Uint);
        let bytes = device.read_back(ib.resource()).unwrap();
        let indices: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 255]);
    }

    #[test]
    fn test_missing_initial_data_is_fatal() {
        let mut device = small_device();
        let err = device.create_vertex_buffer("empty", 12, &[]).unwrap_err();
        assert!(matches!(err, RenderError::Graphics(GraphicsError::MissingInitialData(_))));
        assert!(device.create_index_buffer("empty", Format::R16Uint, 0, &[]).is_err());
    }

    #[test]
    fn test_empty_frame_presents() {
        let mut device = small_device();
        let first = device.current_back_buffer();
        device.begin_frame().unwrap();
        assert_eq!(first.texture().state(), ResourceState::RenderTarget);
        device.end_frame().unwrap();

        assert_eq!(first.resource().executed_state(), ResourceState::Present);
        assert_eq!(device.swap_chain().current_index(), 1);
        assert_eq!(device.last_frame_stats().presents, 1);
        assert_eq!(device.frame_index(), 1);
    }

    #[test]
    fn test_clear_back_buffer_is_visible_after_frame() {
        let mut device = small_device();
        let back_buffer = device.current_back_buffer();
        device.begin_frame().unwrap();
        device.set_render_target(Some(&back_buffer), None).unwrap();
        device.begin_pass().unwrap();
        device.clear_render_target(Color::LIGHT_STEEL_BLUE).unwrap();
        device.end_pass().unwrap();
        assert_eq!(back_buffer.texture().state(), ResourceState::RenderTarget);
        device.end_frame().unwrap();

        let pixels = device.read_back(back_buffer.resource()).unwrap();
        assert_eq!(&pixels[..4], &Color::LIGHT_STEEL_BLUE.to_rgba8());
        assert_eq!(back_buffer.texture().state(), ResourceState::Present);
    }

    #[test]
    fn test_pass_targets_return_to_shader_readable() {
        let mut device = small_device();
        let rt = device
            .create_render_target(&TextureDesc::new("SceneColor", 8, 4, Format::Unknown))
            .unwrap();
        let depth = device.default_depth_stencil_buffer();
        device.begin_frame().unwrap();
        device.set_render_target(Some(&rt), Some(&depth)).unwrap();
        device.begin_pass().unwrap();
        assert_eq!(rt.texture().state(), ResourceState::RenderTarget);
        device.clear_depth_stencil_buffer().unwrap();
        device.end_pass().unwrap();
        assert_eq!(rt.texture().state(), ResourceState::PixelShaderResource);
        assert_eq!(depth.texture().state(), ResourceState::PixelShaderResource);
        device.end_frame().unwrap();
    }

    #[test]
    fn test_frame_rules() {
        let mut device = small_device();
        assert!(device.end_frame().is_err());
        assert!(device.set_viewports(&[Viewport::full(8, 4)]).is_err());

        device.begin_frame().unwrap();
        assert!(device.begin_frame().is_err());
        assert!(device.resize_window(16, 16).is_err());
        let depth = device.default_depth_stencil_buffer();
        device.set_render_target(None, Some(&depth)).unwrap();
        device.begin_pass().unwrap();
        assert!(device.end_frame().is_err());
        device.end_pass().unwrap();
        device.end_frame().unwrap();
    }

    #[test]
    fn test_resize_reuses_descriptor_slots() {
        let mut device = small_device();
        let dsv = device.default_depth_stencil_buffer().dsv();
        device.begin_frame().unwrap();
        device.end_frame().unwrap();

        device.resize_window(32, 16).unwrap();
        let depth = device.default_depth_stencil_buffer();
        assert_eq!((depth.texture().width(), depth.texture().height()), (32, 16));
        assert_eq!(depth.dsv(), dsv);
        assert_eq!(device.rtv_heap_usage().allocated, 2);
        assert_eq!(device.dsv_heap_usage().allocated, 1);
        assert_eq!(device.swap_chain().current_index(), 0);
        assert!(device
            .swap_chain()
            .buffers()
            .iter()
            .all(|b| b.texture().width() == 32 && b.texture().state() == ResourceState::Present));
    }

    #[test]
    fn test_recreate_render_target_keeps_slots() {
        let mut device = small_device();
        let mut rt = device
            .create_render_target(&TextureDesc::new("SceneColor", 8, 4, Format::Unknown))
            .unwrap();
        rt.texture_mut().set_location_index(2);
        let (rtv, srv) = (rt.rtv(), rt.texture().srv());
        let usage = device.srv_heap_usage();

        device.recreate_render_target(&mut rt, 20, 10).unwrap();
        assert_eq!((rt.texture().width(), rt.texture().height()), (20, 10));
        assert_eq!((rt.rtv(), rt.texture().srv()), (rtv, srv));
        assert_eq!(rt.texture().location_index(), 2);
        assert_eq!(device.srv_heap_usage(), usage);
        let view = srv.and_then(|h| device.srv_view(&h)).unwrap();
        assert_eq!(view.resource, rt.resource().id());
    }

    #[test]
    fn test_srv_heap_exhaustion_is_fatal() {
        let mut config = Config::default();
        config.window.width = 4;
        config.window.height = 4;
        config.graphics.descriptors.srv_capacity = 1;
        let mut device = DeviceContext::init(DeviceDesc::from(&config)).unwrap();
        device
            .create_texture_2d(&TextureDesc::new("a", 1, 1, Format::Unknown), None)
            .unwrap();
        let err = device
            .create_texture_2d(&TextureDesc::new("b", 1, 1, Format::Unknown), None)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Graphics(GraphicsError::DescriptorHeapExhausted { capacity: 1, .. })
        ));
    }

    #[test]
    fn test_texture_upload_inside_frame_keeps_staging_until_end() {
        let mut device = small_device();
        device.begin_frame().unwrap();
        let texture = device
            .create_texture_2d(&TextureDesc::new("albedo", 1, 1, Format::Unknown), Some(&[1, 2, 3, 4]))
            .unwrap();
        assert_eq!(device.pending_staging.len(), 1);
        assert_eq!(texture.state(), ResourceState::PixelShaderResource);
        device.end_frame().unwrap();
        assert!(device.pending_staging.is_empty());
        assert_eq!(device.read_back(texture.resource()).unwrap(), vec![1, 2, 3, 4]);
    }
}
