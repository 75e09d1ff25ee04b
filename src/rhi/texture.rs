//! 纹理、渲染目标与深度模板缓冲
//!
//! 三者都是 `Default` 堆上的二维资源，区别在于各自持有的视图：
//! - [`Texture2D`]：可选的 SRV，着色器采样使用
//! - [`RenderTarget`]：RTV + 纹理
//! - [`DepthStencilBuffer`]：DSV + 纹理
//!
//! 这些包装只持有资源引用和描述符句柄，克隆开销很小，用于绑定时传递。

use super::descriptor::DescriptorHandle;
use super::resource::{ResourceDimension, ResourceRef};
use super::types::{Format, ResourceState};

/// 二维纹理创建描述
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// `Format::Unknown` 时使用设备的默认格式
    pub format: Format,
}

impl TextureDesc {
    pub fn new(name: impl Into<String>, width: u32, height: u32, format: Format) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
        }
    }
}

/// 二维纹理
#[derive(Debug, Clone)]
pub struct Texture2D {
    resource: ResourceRef,
    width: u32,
    height: u32,
    format: Format,
    srv: Option<DescriptorHandle>,
    location_index: u32,
}

impl Texture2D {
    pub(crate) fn new(resource: ResourceRef, srv: Option<DescriptorHandle>) -> Self {
        let (width, height, format) = match resource.dimension() {
            ResourceDimension::Texture2D { width, height, format } => (width, height, format),
            ResourceDimension::Buffer => (0, 0, Format::Unknown),
        };
        Self {
            resource,
            width,
            height,
            format,
            srv,
            location_index: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// 当前（录制期）资源状态
    pub fn state(&self) -> ResourceState {
        self.resource.state()
    }

    pub fn srv(&self) -> Option<DescriptorHandle> {
        self.srv
    }

    /// 着色器绑定槽位
    pub fn location_index(&self) -> u32 {
        self.location_index
    }

    pub fn set_location_index(&mut self, location_index: u32) {
        self.location_index = location_index;
    }
}

/// 渲染目标
#[derive(Debug, Clone)]
pub struct RenderTarget {
    texture: Texture2D,
    rtv: DescriptorHandle,
    is_back_buffer: bool,
}

impl RenderTarget {
    pub(crate) fn new(texture: Texture2D, rtv: DescriptorHandle, is_back_buffer: bool) -> Self {
        Self { texture, rtv, is_back_buffer }
    }

    pub fn texture(&self) -> &Texture2D {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut Texture2D {
        &mut self.texture
    }

    pub fn rtv(&self) -> DescriptorHandle {
        self.rtv
    }

    pub fn resource(&self) -> &ResourceRef {
        self.texture.resource()
    }

    /// 是否为交换链的后台缓冲
    pub fn is_back_buffer(&self) -> bool {
        self.is_back_buffer
    }
}

/// 深度模板缓冲
#[derive(Debug, Clone)]
pub struct DepthStencilBuffer {
    texture: Texture2D,
    dsv: DescriptorHandle,
}

impl DepthStencilBuffer {
    pub(crate) fn new(texture: Texture2D, dsv: DescriptorHandle) -> Self {
        Self { texture, dsv }
    }

    pub fn texture(&self) -> &Texture2D {
        &self.texture
    }

    pub fn texture_mut(&mut self) -> &mut Texture2D {
        &mut self.texture
    }

    pub fn dsv(&self) -> DescriptorHandle {
        self.dsv
    }

    pub fn resource(&self) -> &ResourceRef {
        self.texture.resource()
    }
}

/// 深度清除值编码为一个像素的字节
///
/// D24S8 打包为低 24 位深度、高 8 位模板。
pub(crate) fn encode_depth_clear(format: Format, depth: f32, stencil: u8) -> Vec<u8> {
    match format {
        Format::D32Float => depth.to_le_bytes().to_vec(),
        _ => {
            let depth_bits = (depth.clamp(0.0, 1.0) * 0x00FF_FFFF as f32).round() as u32;
            (depth_bits | (stencil as u32) << 24).to_le_bytes().to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhi::resource::{Resource, ResourceDesc};

    #[test]
    fn test_texture_reads_dimension_from_resource() {
        let resource = Resource::new(
            ResourceDesc::texture_2d("shadow", 64, 32, Format::D24UnormS8Uint),
            ResourceState::DepthWrite,
        )
        .unwrap();
        let mut texture = Texture2D::new(resource, None);
        assert_eq!((texture.width(), texture.height()), (64, 32));
        assert_eq!(texture.format(), Format::D24UnormS8Uint);
        assert_eq!(texture.state(), ResourceState::DepthWrite);
        texture.set_location_index(2);
        assert_eq!(texture.location_index(), 2);
    }

    #[test]
    fn test_depth_clear_encoding() {
        assert_eq!(encode_depth_clear(Format::D24UnormS8Uint, 1.0, 0), vec![0xFF, 0xFF, 0xFF, 0x00]);
        assert_eq!(encode_depth_clear(Format::D24UnormS8Uint, 0.0, 3), vec![0, 0, 0, 3]);
        assert_eq!(encode_depth_clear(Format::D32Float, 1.0, 0), 1.0f32.to_le_bytes().to_vec());
    }
}
