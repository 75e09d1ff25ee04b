//! 渲染硬件接口（RHI）
//!
//! 单一的参考设备，遵循 D3D12 语义：显式的资源状态转换、描述符堆、
//! 单一命令列表和 fence 同步。GPU 时间线运行在独立线程上，测试无需真实显卡。
//!
//! # 模块组织
//!
//! - `types`：堆类型、资源状态、格式、视口
//! - `descriptor`：描述符堆线性分配器
//! - `resource`：GPU 资源
//! - `buffer` / `texture`：类型化的缓冲与纹理包装
//! - `pipeline`：共享绑定布局、着色器加载和管线状态
//! - `command` / `queue` / `sync`：命令录制、GPU 时间线和 fence
//! - `swap_chain`：后台缓冲
//! - `device`：设备上下文，帧与命令的唯一权威

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod pipeline;
pub mod queue;
pub mod resource;
pub mod swap_chain;
pub mod sync;
pub mod texture;
pub mod types;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use buffer::{ConstBuffer, IndexBuffer, VertexBuffer};
pub use command::TraceEntry;
pub use descriptor::{DescriptorHandle, DescriptorHeap, DescriptorHeapUsage};
pub use device::{DeviceContext, DeviceDesc};
pub use pipeline::{
    ComparisonFunc, CullMode, DepthStencilDesc, InputElementDesc, PipelineState, PipelineStateDesc,
    RasterizerDesc, RootSignature, ShaderDesc,
};
pub use queue::{DrawRecord, FrameStats};
pub use resource::{ResourceId, ResourceRef};
pub use texture::{DepthStencilBuffer, RenderTarget, Texture2D, TextureDesc};
pub use types::{Format, HeapKind, ResourceState, Viewport};

/// 加锁；持锁线程 panic 后数据仍然可用
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
