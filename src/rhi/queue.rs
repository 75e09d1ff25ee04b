//! 命令队列与 GPU 时间线
//!
//! 队列把关闭后的命令列表通过 `crossbeam-channel` 发送给专用的 GPU 时间线线程，
//! 该线程按提交顺序执行命令：
//!
//! - 屏障：校验声明的前置状态与已执行状态一致，然后推进执行状态
//! - 拷贝：搬运字节
//! - 清除：按格式填充渲染目标/深度内存
//! - 绘制：校验后计入按渲染通道归属的统计，不执行着色器
//! - Present：要求后台缓冲处于 `Present` 状态
//!
//! 执行期违例记录在时间线状态里，下一次 [`CommandQueue::flush`] 以致命错误返回。

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, error, trace};

use super::command::{Command, TraceEntry};
use super::lock;
use super::resource::{ResourceDimension, ResourceRef};
use super::sync::{Fence, FenceValue};
use super::texture::encode_depth_clear;
use super::types::{Format, ResourceState};
use crate::core::error::{GraphicsError, Result};
use crate::math::Color;

enum QueueMessage {
    Execute(Vec<Command>),
    Present(ResourceRef),
    Signal(FenceValue),
    Shutdown,
}

/// 一次绘制的统计记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    /// 绘制发生时所在的事件（渲染通道）名
    pub pass: Option<String>,
    /// 索引绘制的索引数，非索引绘制为 `None`
    pub index_count: Option<u32>,
    pub vertex_count: u32,
    pub pipeline: Option<String>,
}

/// GPU 时间线上的执行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draws: Vec<DrawRecord>,
    pub barriers: u32,
    pub copies: u32,
    pub clears: u32,
    pub presents: u32,
}

impl FrameStats {
    /// 某个渲染通道里每次索引绘制的索引数
    pub fn indexed_draws_in(&self, pass: &str) -> Vec<u32> {
        self.draws
            .iter()
            .filter(|d| d.pass.as_deref() == Some(pass))
            .filter_map(|d| d.index_count)
            .collect()
    }

    /// 某个渲染通道里的全部绘制
    pub fn draws_in(&self, pass: &str) -> Vec<&DrawRecord> {
        self.draws.iter().filter(|d| d.pass.as_deref() == Some(pass)).collect()
    }
}

#[derive(Debug, Default)]
struct TimelineState {
    error: Option<String>,
    stats: FrameStats,
    trace: Vec<TraceEntry>,
}

/// 命令队列
///
/// 持有 GPU 时间线线程，析构时通知线程退出并等待其结束。
pub struct CommandQueue {
    sender: Sender<QueueMessage>,
    worker: Option<JoinHandle<()>>,
    fence: Arc<Fence>,
    last_signaled: FenceValue,
    timeline: Arc<Mutex<TimelineState>>,
}

impl CommandQueue {
    /// 创建队列并启动 GPU 时间线线程
    pub fn new() -> Result<Self> {
        let (sender, receiver) = unbounded();
        let fence = Fence::new();
        let timeline = Arc::new(Mutex::new(TimelineState::default()));

        let worker = {
            let fence = Arc::clone(&fence);
            let timeline = Arc::clone(&timeline);
            thread::Builder::new()
                .name("gpu-timeline".to_string())
                .spawn(move || run_timeline(receiver, fence, timeline))
                .map_err(|e| GraphicsError::DeviceCreation(format!("failed to start GPU timeline: {}", e)))?
        };

        debug!("Command queue created");
        Ok(Self {
            sender,
            worker: Some(worker),
            fence,
            last_signaled: FenceValue::default(),
            timeline,
        })
    }

    /// 提交命令列表
    pub fn execute(&self, commands: Vec<Command>) -> Result<()> {
        self.send(QueueMessage::Execute(commands))
    }

    /// 提交呈现请求
    pub fn present(&self, back_buffer: ResourceRef) -> Result<()> {
        self.send(QueueMessage::Present(back_buffer))
    }

    /// 在已提交的工作之后 signal 下一个 fence 值
    pub fn signal(&mut self) -> Result<FenceValue> {
        let value = self.last_signaled.next();
        self.send(QueueMessage::Signal(value))?;
        self.last_signaled = value;
        Ok(value)
    }

    /// 阻塞直到 GPU 完成 `value`
    pub fn wait(&self, value: FenceValue) {
        self.fence.wait(value);
    }

    /// signal + wait，然后检查执行期错误
    pub fn flush(&mut self) -> Result<FenceValue> {
        let value = self.signal()?;
        self.wait(value);
        if let Some(message) = lock(&self.timeline).error.take() {
            return Err(GraphicsError::CommandExecution(message).into());
        }
        Ok(value)
    }

    pub fn fence(&self) -> &Arc<Fence> {
        &self.fence
    }

    /// 最近一次 signal 的值
    pub fn last_signaled(&self) -> FenceValue {
        self.last_signaled
    }

    /// 取出并清空累计的执行统计
    pub fn take_stats(&self) -> FrameStats {
        std::mem::take(&mut lock(&self.timeline).stats)
    }

    /// 取出并清空累计的执行记录
    pub fn take_trace(&self) -> Vec<TraceEntry> {
        std::mem::take(&mut lock(&self.timeline).trace)
    }

    fn send(&self, message: QueueMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| GraphicsError::CommandExecution("GPU timeline has stopped".to_string()).into())
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        let _ = self.sender.send(QueueMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("GPU timeline thread panicked");
            }
        }
    }
}

/// 执行期上下文：当前事件栈与管线
#[derive(Default)]
struct ExecutionContext {
    events: Vec<String>,
    pipeline: Option<String>,
}

fn run_timeline(receiver: Receiver<QueueMessage>, fence: Arc<Fence>, timeline: Arc<Mutex<TimelineState>>) {
    let mut ctx = ExecutionContext::default();
    while let Ok(message) = receiver.recv() {
        match message {
            QueueMessage::Execute(commands) => {
                let mut state = lock(&timeline);
                for command in &commands {
                    state.trace.push(command.trace());
                    if let Err(message) = execute(command, &mut ctx, &mut state.stats) {
                        error!(%message, "GPU command failed");
                        state.error.get_or_insert(message);
                    }
                }
                ctx = ExecutionContext::default();
            }
            QueueMessage::Present(back_buffer) => {
                let mut state = lock(&timeline);
                state.trace.push(TraceEntry::Present(back_buffer.id()));
                state.stats.presents += 1;
                let actual = back_buffer.executed_state();
                if actual != ResourceState::Present {
                    let message = format!("present of '{}' in state {:?}", back_buffer.name(), actual);
                    state.error.get_or_insert(message);
                }
            }
            QueueMessage::Signal(value) => {
                trace!(value = value.value(), "Fence signaled");
                fence.signal(value);
            }
            QueueMessage::Shutdown => break,
        }
    }
    debug!("GPU timeline stopped");
}

fn execute(command: &Command, ctx: &mut ExecutionContext, stats: &mut FrameStats) -> std::result::Result<(), String> {
    match command {
        Command::Barrier { resource, before, after } => {
            stats.barriers += 1;
            let actual = resource.executed_state();
            if actual != *before {
                return Err(format!(
                    "barrier on '{}' declares {:?} -> {:?} but resource is {:?}",
                    resource.name(),
                    before,
                    after,
                    actual
                ));
            }
            resource.set_executed_state(*after);
        }
        Command::CopyBuffer { dst, src, bytes } => {
            stats.copies += 1;
            require_executed(dst, ResourceState::CopyDest)?;
            let len = *bytes as usize;
            let source = src.gpu_memory()[..len].to_vec();
            dst.gpu_memory()[..len].copy_from_slice(&source);
        }
        Command::ClearRenderTarget { target, color } => {
            stats.clears += 1;
            require_executed(target, ResourceState::RenderTarget)?;
            let pixel = Color::new(color[0], color[1], color[2], color[3]).to_rgba8();
            fill_pixels(target, &pixel);
        }
        Command::ClearDepthStencil { target, depth, stencil } => {
            stats.clears += 1;
            require_executed(target, ResourceState::DepthWrite)?;
            let format = match target.dimension() {
                ResourceDimension::Texture2D { format, .. } => format,
                ResourceDimension::Buffer => Format::Unknown,
            };
            fill_pixels(target, &encode_depth_clear(format, *depth, *stencil));
        }
        Command::SetShaderResource { resource, .. } => {
            if !resource.executed_state().is_shader_readable() {
                return Err(format!(
                    "'{}' sampled while in state {:?}",
                    resource.name(),
                    resource.executed_state()
                ));
            }
        }
        Command::SetPipelineState(pipeline) => ctx.pipeline = Some(pipeline.name().to_string()),
        Command::DrawIndexed { index_count, .. } => stats.draws.push(DrawRecord {
            pass: ctx.events.last().cloned(),
            index_count: Some(*index_count),
            vertex_count: *index_count,
            pipeline: ctx.pipeline.clone(),
        }),
        Command::Draw { vertex_count } => stats.draws.push(DrawRecord {
            pass: ctx.events.last().cloned(),
            index_count: None,
            vertex_count: *vertex_count,
            pipeline: ctx.pipeline.clone(),
        }),
        Command::BeginEvent(name) => ctx.events.push(name.clone()),
        Command::EndEvent => {
            ctx.events.pop();
        }
        Command::SetDescriptorHeaps
        | Command::SetRootSignature(_)
        | Command::SetViewports(_)
        | Command::SetRenderTargets { .. }
        | Command::SetConstantBuffer { .. }
        | Command::SetVertexBuffers(_)
        | Command::SetIndexBuffer(_) => {}
    }
    Ok(())
}

fn require_executed(resource: &ResourceRef, expected: ResourceState) -> std::result::Result<(), String> {
    let actual = resource.executed_state();
    if actual == expected {
        Ok(())
    } else {
        Err(format!("'{}' accessed in state {:?}, expected {:?}", resource.name(), actual, expected))
    }
}

fn fill_pixels(target: &ResourceRef, pixel: &[u8]) {
    let mut memory = target.gpu_memory();
    for chunk in memory.chunks_exact_mut(pixel.len()) {
        chunk.copy_from_slice(pixel);
    }
}
