//! 缓冲对象
//!
//! 常量缓冲、顶点缓冲与索引缓冲，都是 [`Resource`] 之上的类型化包装。
//!
//! - 常量缓冲位于 `Upload` 堆，创建后常驻映射，通过 CPU 拷贝更新
//! - 顶点/索引缓冲位于 `Default` 堆，通过暂存资源上传一次，之后不可变

use std::borrow::Cow;
use std::marker::PhantomData;

use bytemuck::Pod;

use super::command::{IndexBufferView, VertexBufferView};
use super::resource::{Resource, ResourceDesc, ResourceRef};
use super::types::{Format, HeapKind, ResourceState};
use crate::core::error::{GraphicsError, Result};

/// 常量缓冲的最小分配对齐
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// 向上对齐到 `alignment`（必须是 2 的幂）
pub fn align_up(size: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (size + alignment - 1) & !(alignment - 1)
}

/// 常量缓冲
///
/// `location_index` 决定绑定到共享绑定布局的哪个槽位。
#[derive(Debug)]
pub struct ConstBuffer<T: Pod> {
    resource: ResourceRef,
    location_index: u32,
    _marker: PhantomData<T>,
}

impl<T: Pod> ConstBuffer<T> {
    pub(crate) fn new(name: &str, data: &T, location_index: u32) -> Result<Self> {
        let size = align_up(std::mem::size_of::<T>() as u64, CONSTANT_BUFFER_ALIGNMENT);
        let resource = Resource::new(
            ResourceDesc::buffer(name, HeapKind::Upload, size),
            ResourceState::GenericRead,
        )?;
        let buffer = Self {
            resource,
            location_index,
            _marker: PhantomData,
        };
        buffer.update(data)?;
        Ok(buffer)
    }

    /// 用新数据覆盖缓冲内容
    pub fn update(&self, data: &T) -> Result<()> {
        self.resource.write_bytes(0, bytemuck::bytes_of(data))
    }

    /// 读回当前内容
    pub fn read(&self) -> Result<T> {
        let mapped = self.resource.map()?;
        Ok(bytemuck::pod_read_unaligned(&mapped[..std::mem::size_of::<T>()]))
    }

    pub fn location_index(&self) -> u32 {
        self.location_index
    }

    pub fn set_location_index(&mut self, location_index: u32) {
        self.location_index = location_index;
    }

    /// 对齐后的分配大小
    pub fn size(&self) -> u64 {
        self.resource.size()
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }
}

/// 顶点缓冲
#[derive(Debug, Clone)]
pub struct VertexBuffer {
    resource: ResourceRef,
    stride: u32,
    count: u32,
}

impl VertexBuffer {
    pub(crate) fn new(resource: ResourceRef, stride: u32) -> Self {
        let count = (resource.size() / stride as u64) as u32;
        Self { resource, stride, count }
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// 顶点数量
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn view(&self) -> VertexBufferView {
        VertexBufferView {
            resource: self.resource.clone(),
            stride: self.stride,
            size: self.resource.size(),
        }
    }
}

/// 索引缓冲
///
/// 格式只可能是 16 位或 32 位，8 位索引在创建时已被扩展。
#[derive(Debug, Clone)]
pub struct IndexBuffer {
    resource: ResourceRef,
    format: Format,
    count: u32,
}

impl IndexBuffer {
    pub(crate) fn new(resource: ResourceRef, format: Format, count: u32) -> Self {
        Self { resource, format, count }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// 索引数量
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn view(&self) -> IndexBufferView {
        IndexBufferView {
            resource: self.resource.clone(),
            format: self.format,
            count: self.count,
        }
    }
}

/// 规范化索引数据
///
/// 8 位索引扩展为 16 位，16/32 位原样返回。
///
/// # 返回值
///
/// 规范化后的格式和字节（恰好 `count` 个索引）
pub fn normalize_indices(format: Format, count: u32, data: &[u8]) -> Result<(Format, Cow<'_, [u8]>)> {
    if !format.is_index() {
        return Err(GraphicsError::UnsupportedFormat(format!(
            "{} is not an index format",
            format.name()
        ))
        .into());
    }

    let needed = count as usize * format.bytes_per_element() as usize;
    if data.len() < needed {
        return Err(GraphicsError::ResourceCreation(format!(
            "index data holds {} bytes, {} indices of {} need {}",
            data.len(),
            count,
            format.name(),
            needed
        ))
        .into());
    }
    let data = &data[..needed];

    match format {
        Format::R8Uint => {
            let widened: Vec<u8> = data
                .iter()
                .flat_map(|&i| (i as u16).to_le_bytes())
                .collect();
            Ok((Format::R16Uint, Cow::Owned(widened)))
        }
        _ => Ok((format, Cow::Borrowed(data))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
    struct Params {
        color: [f32; 4],
        scale: f32,
        _pad: [f32; 3],
    }

    #[test]
    fn test_align_up_properties() {
        for size in [1u64, 16, 80, 255, 256, 257, 511, 1000, 4096] {
            let rounded = align_up(size, CONSTANT_BUFFER_ALIGNMENT);
            assert!(rounded >= size);
            assert_eq!(rounded % CONSTANT_BUFFER_ALIGNMENT, 0);
            assert!(rounded - size < CONSTANT_BUFFER_ALIGNMENT);
        }
    }

    #[test]
    fn test_const_buffer_rounds_and_updates() {
        let params = Params { color: [1.0, 0.5, 0.25, 1.0], scale: 2.0, _pad: [0.0; 3] };
        let cb = ConstBuffer::new("params", &params, 1).unwrap();
        assert_eq!(cb.size(), 256);
        assert_eq!(cb.location_index(), 1);
        assert_eq!(cb.read().unwrap(), params);

        let changed = Params { scale: 3.0, ..params };
        cb.update(&changed).unwrap();
        assert_eq!(cb.read().unwrap().scale, 3.0);
    }

    #[test]
    fn test_normalize_8bit_indices() {
        let (format, data) = normalize_indices(Format::R8Uint, 4, &[0, 1, 2, 255]).unwrap();
        assert_eq!(format, Format::R16Uint);
        let indices: Vec<u16> = data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 255]);
    }

    #[test]
    fn test_normalize_keeps_wide_indices() {
        let bytes: Vec<u8> = [7u32, 8, 9].iter().flat_map(|i| i.to_le_bytes()).collect();
        let (format, data) = normalize_indices(Format::R32Uint, 3, &bytes).unwrap();
        assert_eq!(format, Format::R32Uint);
        assert!(matches!(data, Cow::Borrowed(_)));
        assert_eq!(data.len(), 12);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        assert!(normalize_indices(Format::R32G32B32Float, 1, &[0; 12]).is_err());
        assert!(normalize_indices(Format::R16Uint, 4, &[0; 6]).is_err());
    }
}
