//! GPU 资源模块
//!
//! [`Resource`] 拥有一块 GPU 内存分配，带有堆类型和当前使用状态。
//!
//! 状态分两份跟踪：
//! - **录制状态**：命令录制时由屏障推进，用于录制期校验
//! - **执行状态**：GPU 时间线线程执行屏障后推进，用于执行期校验
//!
//! 单帧在途的前提下，`EndFrame` 冲刷之后两者一致。

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use super::lock;
use super::types::{Format, HeapKind, ResourceState};
use crate::core::error::{GraphicsError, Result};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// 资源唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// 资源维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceDimension {
    Buffer,
    Texture2D { width: u32, height: u32, format: Format },
}

/// 资源描述
#[derive(Debug, Clone)]
pub struct ResourceDesc {
    /// 调试名称
    pub name: String,
    pub heap: HeapKind,
    /// 字节大小
    pub size: u64,
    pub dimension: ResourceDimension,
}

impl ResourceDesc {
    /// 缓冲资源描述
    pub fn buffer(name: impl Into<String>, heap: HeapKind, size: u64) -> Self {
        Self {
            name: name.into(),
            heap,
            size,
            dimension: ResourceDimension::Buffer,
        }
    }

    /// 二维纹理资源描述（设备本地，线性布局）
    pub fn texture_2d(name: impl Into<String>, width: u32, height: u32, format: Format) -> Self {
        Self {
            name: name.into(),
            heap: HeapKind::Default,
            size: width as u64 * height as u64 * format.bytes_per_element() as u64,
            dimension: ResourceDimension::Texture2D { width, height, format },
        }
    }
}

/// GPU 资源
///
/// 通过 `Arc` 共享：包装对象持有一份，在途命令列表持有一份，
/// 命令分配器重置后在途引用随之释放。
#[derive(Debug)]
pub struct Resource {
    id: ResourceId,
    desc: ResourceDesc,
    memory: Mutex<Vec<u8>>,
    state: Mutex<ResourceState>,
    executed_state: Mutex<ResourceState>,
    mapped: AtomicBool,
}

/// 共享的资源引用
pub type ResourceRef = Arc<Resource>;

impl Resource {
    /// 分配资源，内存清零
    pub fn new(desc: ResourceDesc, initial_state: ResourceState) -> Result<ResourceRef> {
        if desc.size == 0 {
            return Err(GraphicsError::ResourceCreation(format!(
                "resource '{}' has zero size",
                desc.name
            ))
            .into());
        }

        let id = ResourceId(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed));
        trace!(id = id.0, name = %desc.name, heap = ?desc.heap, size = desc.size, "Resource allocated");

        Ok(Arc::new(Self {
            id,
            memory: Mutex::new(vec![0; desc.size as usize]),
            desc,
            state: Mutex::new(initial_state),
            executed_state: Mutex::new(initial_state),
            mapped: AtomicBool::new(false),
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn heap(&self) -> HeapKind {
        self.desc.heap
    }

    /// 分配的字节大小
    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn dimension(&self) -> ResourceDimension {
        self.desc.dimension
    }

    /// 录制期跟踪的状态
    pub fn state(&self) -> ResourceState {
        *lock(&self.state)
    }

    /// GPU 已执行到的状态
    pub fn executed_state(&self) -> ResourceState {
        *lock(&self.executed_state)
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        *lock(&self.state) = state;
    }

    pub(crate) fn set_executed_state(&self, state: ResourceState) {
        *lock(&self.executed_state) = state;
    }

    /// 映射 CPU 可见内存
    ///
    /// 只有 `Upload` 和 `Readback` 堆可以映射，守卫释放即解除映射。
    pub fn map(&self) -> Result<MappedMemory<'_>> {
        if !self.desc.heap.is_cpu_visible() {
            return Err(GraphicsError::MapFailed(self.desc.name.clone()).into());
        }
        let guard = lock(&self.memory);
        self.mapped.store(true, Ordering::Release);
        Ok(MappedMemory { guard, flag: &self.mapped })
    }

    /// 是否处于映射状态
    pub fn is_mapped(&self) -> bool {
        self.mapped.load(Ordering::Acquire)
    }

    /// 通过映射写入字节
    pub fn write_bytes(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut mapped = self.map()?;
        let end = offset + data.len();
        if end > mapped.len() {
            return Err(GraphicsError::ResourceCreation(format!(
                "write of {} bytes at {} overflows '{}' ({} bytes)",
                data.len(),
                offset,
                self.desc.name,
                self.desc.size
            ))
            .into());
        }
        mapped[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// 通过映射读取全部字节
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.map()?.to_vec())
    }

    /// GPU 时间线访问原始内存（不检查堆类型）
    pub(crate) fn gpu_memory(&self) -> MutexGuard<'_, Vec<u8>> {
        lock(&self.memory)
    }
}

impl Drop for Resource {
    fn drop(&mut self) {
        trace!(id = self.id.0, name = %self.desc.name, "Resource released");
    }
}

/// 映射的内存区间
pub struct MappedMemory<'a> {
    guard: MutexGuard<'a, Vec<u8>>,
    flag: &'a AtomicBool,
}

impl Deref for MappedMemory<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard
    }
}

impl DerefMut for MappedMemory<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard
    }
}

impl Drop for MappedMemory<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
