//! RHI 基础类型
//!
//! 堆类型、资源状态、像素/顶点格式和视口等被各层共享的小类型。

use serde::{Deserialize, Serialize};

/// GPU 内存堆类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// CPU 可写的暂存内存
    Upload,
    /// 设备本地内存，CPU 不可访问
    Default,
    /// CPU 可读的回读内存（仅调试路径使用）
    Readback,
}

impl HeapKind {
    /// CPU 是否可以映射
    pub fn is_cpu_visible(self) -> bool {
        !matches!(self, HeapKind::Default)
    }
}

/// 资源使用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    CopyDest,
    CopySource,
    GenericRead,
    RenderTarget,
    DepthWrite,
    PixelShaderResource,
    Present,
}

impl ResourceState {
    /// 着色器是否可以读取处于该状态的资源
    pub fn is_shader_readable(self) -> bool {
        matches!(self, ResourceState::PixelShaderResource | ResourceState::GenericRead)
    }

    /// 作为顶点/索引/常量缓冲读取是否合法
    pub fn is_buffer_readable(self) -> bool {
        matches!(self, ResourceState::GenericRead)
    }
}

/// 像素与顶点元素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Format {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "r8g8b8a8_unorm")]
    R8G8B8A8Unorm,
    #[serde(rename = "d24_unorm_s8_uint")]
    D24UnormS8Uint,
    #[serde(rename = "d32_float")]
    D32Float,
    #[serde(rename = "r32g32b32_float")]
    R32G32B32Float,
    #[serde(rename = "r32g32_float")]
    R32G32Float,
    #[serde(rename = "r8_uint")]
    R8Uint,
    #[serde(rename = "r16_uint")]
    R16Uint,
    #[serde(rename = "r32_uint")]
    R32Uint,
}

impl Format {
    /// 每个元素（像素/顶点分量/索引）占用的字节数
    pub fn bytes_per_element(self) -> u32 {
        match self {
            Format::Unknown => 0,
            Format::R8Uint => 1,
            Format::R16Uint => 2,
            Format::R8G8B8A8Unorm | Format::D24UnormS8Uint | Format::D32Float | Format::R32Uint => 4,
            Format::R32G32Float => 8,
            Format::R32G32B32Float => 12,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32Float)
    }

    pub fn is_color(self) -> bool {
        matches!(self, Format::R8G8B8A8Unorm)
    }

    /// 是否可作为索引格式
    pub fn is_index(self) -> bool {
        matches!(self, Format::R8Uint | Format::R16Uint | Format::R32Uint)
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Unknown => "UNKNOWN",
            Format::R8G8B8A8Unorm => "R8G8B8A8_UNORM",
            Format::D24UnormS8Uint => "D24_UNORM_S8_UINT",
            Format::D32Float => "D32_FLOAT",
            Format::R32G32B32Float => "R32G32B32_FLOAT",
            Format::R32G32Float => "R32G32_FLOAT",
            Format::R8Uint => "R8_UINT",
            Format::R16Uint => "R16_UINT",
            Format::R32Uint => "R32_UINT",
        }
    }
}

/// 视口
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// 覆盖整个目标的视口
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 图元拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sizes() {
        assert_eq!(Format::R8G8B8A8Unorm.bytes_per_element(), 4);
        assert_eq!(Format::R32G32B32Float.bytes_per_element(), 12);
        assert_eq!(Format::R16Uint.bytes_per_element(), 2);
        assert!(Format::D24UnormS8Uint.is_depth());
        assert!(!Format::R8G8B8A8Unorm.is_depth());
    }

    #[test]
    fn test_readable_states() {
        assert!(ResourceState::PixelShaderResource.is_shader_readable());
        assert!(!ResourceState::DepthWrite.is_shader_readable());
        assert!(!ResourceState::CopyDest.is_buffer_readable());
        assert!(!HeapKind::Default.is_cpu_visible());
    }
}
