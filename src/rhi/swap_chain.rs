//! 交换链
//!
//! 固定两个后台缓冲，初始状态为 `Present`。每个后台缓冲的 RTV 只在创建时分配一次，
//! 窗口尺寸变化后重建资源并把新视图写回原来的槽位。

use tracing::{debug, info};

use super::descriptor::{DescriptorHeap, ViewRecord};
use super::resource::{Resource, ResourceDesc};
use super::texture::{RenderTarget, Texture2D};
use super::types::{Format, ResourceState};
use crate::core::error::{GraphicsError, Result};

/// 后台缓冲数量
pub const SWAP_CHAIN_BUFFER_COUNT: usize = 2;

/// 交换链
#[derive(Debug)]
pub struct SwapChain {
    buffers: Vec<RenderTarget>,
    current: usize,
    format: Format,
    width: u32,
    height: u32,
}

impl SwapChain {
    /// 创建交换链并为每个后台缓冲分配 RTV
    pub fn new(rtv_heap: &mut DescriptorHeap, width: u32, height: u32, format: Format) -> Result<Self> {
        if !format.is_color() {
            return Err(GraphicsError::SwapchainError(format!(
                "{} is not a presentable format",
                format.name()
            ))
            .into());
        }

        let mut buffers = Vec::with_capacity(SWAP_CHAIN_BUFFER_COUNT);
        for index in 0..SWAP_CHAIN_BUFFER_COUNT {
            let rtv = rtv_heap.allocate()?;
            let texture = create_back_buffer(index, width, height, format)?;
            rtv_heap.write_view(&rtv, ViewRecord { resource: texture.resource().id(), format })?;
            buffers.push(RenderTarget::new(texture, rtv, true));
        }

        info!(width, height, format = format.name(), buffers = SWAP_CHAIN_BUFFER_COUNT, "Swap chain created");
        Ok(Self {
            buffers,
            current: 0,
            format,
            width,
            height,
        })
    }

    /// 调整后台缓冲尺寸
    ///
    /// 调用方需保证 GPU 已空闲且没有帧在录制。RTV 槽位保持不变。
    pub fn resize(&mut self, rtv_heap: &mut DescriptorHeap, width: u32, height: u32) -> Result<()> {
        for (index, buffer) in self.buffers.iter_mut().enumerate() {
            let rtv = buffer.rtv();
            let texture = create_back_buffer(index, width, height, self.format)?;
            rtv_heap.write_view(&rtv, ViewRecord { resource: texture.resource().id(), format: self.format })?;
            *buffer = RenderTarget::new(texture, rtv, true);
        }
        self.current = 0;
        self.width = width;
        self.height = height;
        debug!(width, height, "Swap chain resized");
        Ok(())
    }

    /// 当前后台缓冲
    pub fn current_back_buffer(&self) -> &RenderTarget {
        &self.buffers[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// 呈现后切换到下一个后台缓冲
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.buffers.len();
    }

    pub fn buffers(&self) -> &[RenderTarget] {
        &self.buffers
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

fn create_back_buffer(index: usize, width: u32, height: u32, format: Format) -> Result<Texture2D> {
    let resource = Resource::new(
        ResourceDesc::texture_2d(format!("BackBuffer{}", index), width, height, format),
        ResourceState::Present,
    )?;
    Ok(Texture2D::new(resource, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::descriptor::DescriptorHeapDesc;

    #[test]
    fn test_back_buffers_start_in_present() {
        let mut heap = DescriptorHeap::new(DescriptorHeapDesc::rtv(4)).unwrap();
        let swap_chain = SwapChain::new(&mut heap, 8, 4, Format::R8G8B8A8Unorm).unwrap();
        assert_eq!(swap_chain.buffers().len(), SWAP_CHAIN_BUFFER_COUNT);
        assert!(swap_chain.buffers().iter().all(|b| b.texture().state() == ResourceState::Present));
        assert!(swap_chain.current_back_buffer().is_back_buffer());
        assert_eq!(heap.allocated(), 2);
    }

    #[test]
    fn test_advance_wraps() {
        let mut heap = DescriptorHeap::new(DescriptorHeapDesc::rtv(2)).unwrap();
        let mut swap_chain = SwapChain::new(&mut heap, 2, 2, Format::R8G8B8A8Unorm).unwrap();
        let first = swap_chain.current_back_buffer().resource().id();
        swap_chain.advance();
        assert_eq!(swap_chain.current_index(), 1);
        swap_chain.advance();
        assert_eq!(swap_chain.current_back_buffer().resource().id(), first);
    }

    #[test]
    fn test_resize_reuses_rtv_slots() {
        let mut heap = DescriptorHeap::new(DescriptorHeapDesc::rtv(2)).unwrap();
        let mut swap_chain = SwapChain::new(&mut heap, 4, 4, Format::R8G8B8A8Unorm).unwrap();
        let rtvs: Vec<_> = swap_chain.buffers().iter().map(|b| b.rtv()).collect();
        swap_chain.advance();

        swap_chain.resize(&mut heap, 16, 8).unwrap();
        assert_eq!(heap.allocated(), 2);
        assert_eq!(swap_chain.current_index(), 0);
        for (buffer, rtv) in swap_chain.buffers().iter().zip(&rtvs) {
            assert_eq!(buffer.rtv(), *rtv);
            assert_eq!((buffer.texture().width(), buffer.texture().height()), (16, 8));
            assert_eq!(heap.view(rtv).map(|v| v.resource), Some(buffer.resource().id()));
        }
    }

    #[test]
    fn test_depth_format_rejected() {
        let mut heap = DescriptorHeap::new(DescriptorHeapDesc::rtv(2)).unwrap();
        assert!(SwapChain::new(&mut heap, 4, 4, Format::D32Float).is_err());
    }
}
