//! 描述符堆管理模块
//!
//! 固定容量的线性（bump）分配器，产生成对的 CPU/GPU 描述符句柄。
//!
//! # 分配规则
//!
//! - 容量在创建时确定，之后不会增长
//! - `allocate` 单调推进游标，分配出的槽位永不回收
//! - 容量耗尽返回 [`GraphicsError::DescriptorHeapExhausted`]，属于致命错误
//! - RTV/DSV 堆始终只对 CPU 可见，即使请求了着色器可见
//!
//! # DirectX 12 描述符类型
//!
//! - **RTV** (Render Target View)：渲染目标视图
//! - **DSV** (Depth Stencil View)：深度模板视图
//! - **SRV** (Shader Resource View)：着色资源视图，着色器采样纹理时使用

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use super::resource::ResourceId;
use super::types::Format;
use crate::core::error::{GraphicsError, Result};

/// 每个堆在模拟地址空间里占用的跨度
const HEAP_ADDRESS_SPAN: usize = 1 << 24;

static NEXT_HEAP_ID: AtomicUsize = AtomicUsize::new(1);

/// 描述符类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// 渲染目标视图 (RTV)
    RenderTargetView,
    /// 深度模板视图 (DSV)
    DepthStencilView,
    /// 着色资源视图 (SRV)
    ShaderResourceView,
}

impl DescriptorType {
    /// 该类型的描述符能否放在着色器可见的堆中
    pub fn can_be_shader_visible(&self) -> bool {
        matches!(self, DescriptorType::ShaderResourceView)
    }

    /// 单个描述符的字节跨度
    pub fn increment_size(&self) -> u32 {
        match self {
            DescriptorType::RenderTargetView | DescriptorType::DepthStencilView => 32,
            DescriptorType::ShaderResourceView => 64,
        }
    }

    /// 获取描述符类型名称
    pub fn name(&self) -> &'static str {
        match self {
            DescriptorType::RenderTargetView => "RTV",
            DescriptorType::DepthStencilView => "DSV",
            DescriptorType::ShaderResourceView => "SRV",
        }
    }
}

/// 描述符堆描述信息
#[derive(Debug, Clone)]
pub struct DescriptorHeapDesc {
    /// 描述符类型
    pub descriptor_type: DescriptorType,
    /// 容量
    pub capacity: u32,
    /// 是否请求着色器可见
    pub shader_visible: bool,
    /// 调试名称
    pub name: String,
}

impl DescriptorHeapDesc {
    pub fn new(descriptor_type: DescriptorType, capacity: u32, shader_visible: bool) -> Self {
        Self {
            descriptor_type,
            capacity,
            shader_visible,
            name: format!("{} Heap", descriptor_type.name()),
        }
    }

    /// 创建 RTV 堆描述符
    pub fn rtv(capacity: u32) -> Self {
        Self::new(DescriptorType::RenderTargetView, capacity, false)
    }

    /// 创建 DSV 堆描述符
    pub fn dsv(capacity: u32) -> Self {
        Self::new(DescriptorType::DepthStencilView, capacity, false)
    }

    /// 创建着色器可见的 SRV 堆描述符
    pub fn srv(capacity: u32) -> Self {
        Self::new(DescriptorType::ShaderResourceView, capacity, true)
    }
}

/// 描述符句柄（CPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: usize,
    /// 描述符索引
    pub index: u32,
}

impl CpuDescriptorHandle {
    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + (count * increment_size) as usize,
            index: self.index + count,
        }
    }
}

/// 描述符句柄（GPU 可见）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuDescriptorHandle {
    /// 句柄指针值
    pub ptr: u64,
    /// 描述符索引
    pub index: u32,
}

impl GpuDescriptorHandle {
    /// 偏移句柄
    pub fn offset(&self, count: u32, increment_size: u32) -> Self {
        Self {
            ptr: self.ptr + (count * increment_size) as u64,
            index: self.index + count,
        }
    }
}

/// 描述符句柄对（CPU + GPU）
///
/// 来自非着色器可见堆的句柄没有 GPU 部分。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    /// CPU 可见句柄
    pub cpu: CpuDescriptorHandle,
    /// GPU 可见句柄（仅对着色器可见的堆有效）
    pub gpu: Option<GpuDescriptorHandle>,
}

impl DescriptorHandle {
    /// 句柄在堆中的索引
    pub fn index(&self) -> u32 {
        self.cpu.index
    }
}

/// 写入某个槽位的视图内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewRecord {
    /// 视图引用的资源
    pub resource: ResourceId,
    /// 视图格式
    pub format: Format,
}

/// 描述符堆
///
/// 线性分配，不回收。非线程安全：`allocate` 需要 `&mut self`。
#[derive(Debug)]
pub struct DescriptorHeap {
    desc: DescriptorHeapDesc,
    shader_visible: bool,
    cpu_start: CpuDescriptorHandle,
    gpu_start: Option<GpuDescriptorHandle>,
    cursor: u32,
    views: Vec<Option<ViewRecord>>,
}

impl DescriptorHeap {
    /// 创建描述符堆
    ///
    /// # 参数
    ///
    /// * `desc` - 堆描述，RTV/DSV 的着色器可见请求会被忽略
    pub fn new(desc: DescriptorHeapDesc) -> Result<Self> {
        if desc.capacity == 0 {
            return Err(GraphicsError::ResourceCreation(format!(
                "{} must have a non-zero capacity",
                desc.name
            ))
            .into());
        }

        let shader_visible = desc.shader_visible && desc.descriptor_type.can_be_shader_visible();
        if desc.shader_visible && !shader_visible {
            warn!(heap = %desc.name, "Render-target/depth heaps are CPU-only; ignoring shader visibility");
        }

        let heap_id = NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed);
        let base = heap_id * HEAP_ADDRESS_SPAN;
        let cpu_start = CpuDescriptorHandle { ptr: base, index: 0 };
        let gpu_start = shader_visible.then(|| GpuDescriptorHandle {
            ptr: (base as u64) << 8,
            index: 0,
        });

        debug!(
            heap = %desc.name,
            capacity = desc.capacity,
            shader_visible,
            "Descriptor heap created"
        );

        Ok(Self {
            views: vec![None; desc.capacity as usize],
            desc,
            shader_visible,
            cpu_start,
            gpu_start,
            cursor: 0,
        })
    }

    /// 分配下一个槽位
    ///
    /// # 返回值
    ///
    /// 新的句柄对；容量耗尽时返回错误（不可恢复）
    pub fn allocate(&mut self) -> Result<DescriptorHandle> {
        if self.cursor >= self.desc.capacity {
            return Err(GraphicsError::DescriptorHeapExhausted {
                heap: self.desc.name.clone(),
                capacity: self.desc.capacity,
            }
            .into());
        }

        let index = self.cursor;
        self.cursor += 1;
        let size = self.descriptor_size();
        Ok(DescriptorHandle {
            cpu: self.cpu_start.offset(index, size),
            gpu: self.gpu_start.map(|gpu| gpu.offset(index, size)),
        })
    }

    /// 在已分配的槽位上写入（或覆盖）视图
    pub fn write_view(&mut self, handle: &DescriptorHandle, view: ViewRecord) -> Result<()> {
        let index = self.checked_index(handle)?;
        self.views[index] = Some(view);
        Ok(())
    }

    /// 读取槽位当前描述的视图
    pub fn view(&self, handle: &DescriptorHandle) -> Option<ViewRecord> {
        self.checked_index(handle).ok().and_then(|i| self.views[i])
    }

    fn checked_index(&self, handle: &DescriptorHandle) -> Result<usize> {
        let size = self.descriptor_size() as usize;
        let owned = handle.cpu.ptr >= self.cpu_start.ptr
            && handle.cpu.ptr < self.cpu_start.ptr + self.cursor as usize * size;
        if !owned {
            return Err(GraphicsError::ResourceCreation(format!(
                "descriptor {} does not belong to {}",
                handle.index(),
                self.desc.name
            ))
            .into());
        }
        Ok(handle.index() as usize)
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.desc.descriptor_type
    }

    pub fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    /// 堆起始 CPU 句柄
    pub fn cpu_start(&self) -> CpuDescriptorHandle {
        self.cpu_start
    }

    /// 堆起始 GPU 句柄（非着色器可见的堆为 `None`）
    pub fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        self.gpu_start
    }

    pub fn descriptor_size(&self) -> u32 {
        self.desc.descriptor_type.increment_size()
    }

    pub fn capacity(&self) -> u32 {
        self.desc.capacity
    }

    /// 已分配的槽位数
    pub fn allocated(&self) -> u32 {
        self.cursor
    }

    pub fn remaining(&self) -> u32 {
        self.desc.capacity - self.cursor
    }
}

/// 描述符堆使用统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapUsage {
    pub allocated: u32,
    pub capacity: u32,
}

impl From<&DescriptorHeap> for DescriptorHeapUsage {
    fn from(heap: &DescriptorHeap) -> Self {
        Self {
            allocated: heap.allocated(),
            capacity: heap.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RenderError;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_until_exhausted() {
        let mut heap = DescriptorHeap::new(DescriptorHeapDesc::srv(8)).unwrap();
        let mut seen = HashSet::new();
        for i in 0..8 {
            let handle = heap.allocate().unwrap();
            assert_eq!(handle.index(), i);
            assert!(seen.insert(handle.cpu.ptr), "handles must not overlap");
        }
        assert_eq!(heap.remaining(), 0);

        let err = heap.allocate().unwrap_err();
        assert!(matches!(
            err,
            RenderError::Graphics(GraphicsError::DescriptorHeapExhausted { capacity: 8, .. })
        ));
    }

    #[test]
    fn test_handles_are_spaced_by_descriptor_size() {
        let mut heap = DescriptorHeap::new(DescriptorHeapDesc::srv(4)).unwrap();
        let a = heap.allocate().unwrap();
        let b = heap.allocate().unwrap();
        let size = heap.descriptor_size();
        assert_eq!(b.cpu.ptr - a.cpu.ptr, size as usize);
        let (ga, gb) = (a.gpu.unwrap(), b.gpu.unwrap());
        assert_eq!(gb.ptr - ga.ptr, size as u64);
        assert_eq!(heap.gpu_start().unwrap().ptr, ga.ptr);
    }

    #[test]
    fn test_rtv_and_dsv_heaps_are_cpu_only() {
        let rtv_desc = DescriptorHeapDesc::new(DescriptorType::RenderTargetView, 2, true);
        let mut rtv = DescriptorHeap::new(rtv_desc).unwrap();
        assert!(!rtv.is_shader_visible());
        assert!(rtv.gpu_start().is_none());
        assert!(rtv.allocate().unwrap().gpu.is_none());

        let mut dsv = DescriptorHeap::new(DescriptorHeapDesc::dsv(1)).unwrap();
        assert!(dsv.allocate().unwrap().gpu.is_none());
    }

    #[test]
    fn test_heaps_do_not_share_addresses() {
        let mut a = DescriptorHeap::new(DescriptorHeapDesc::rtv(4)).unwrap();
        let mut b = DescriptorHeap::new(DescriptorHeapDesc::rtv(4)).unwrap();
        let ha = a.allocate().unwrap();
        let hb = b.allocate().unwrap();
        assert_ne!(ha.cpu.ptr, hb.cpu.ptr);
        assert!(b.write_view(&ha, ViewRecord { resource: ResourceId(1), format: Format::R8G8B8A8Unorm }).is_err());
    }

    #[test]
    fn test_write_view_overwrites_in_place() {
        let mut heap = DescriptorHeap::new(DescriptorHeapDesc::rtv(2)).unwrap();
        let handle = heap.allocate().unwrap();
        let first = ViewRecord { resource: ResourceId(7), format: Format::R8G8B8A8Unorm };
        let second = ViewRecord { resource: ResourceId(9), format: Format::R8G8B8A8Unorm };
        heap.write_view(&handle, first).unwrap();
        heap.write_view(&handle, second).unwrap();
        assert_eq!(heap.view(&handle), Some(second));
        assert_eq!(heap.allocated(), 1);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(DescriptorHeap::new(DescriptorHeapDesc::dsv(0)).is_err());
    }
}
