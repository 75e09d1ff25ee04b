//! 网格的 GPU 数据
//!
//! 每个网格一份：索引缓冲、位置流和属性流。创建后不可变，
//! 由资产管理器以 `Arc` 共享给引用该网格的所有渲染图元。

use tracing::debug;

use crate::core::error::Result;
use crate::rhi::{DeviceContext, IndexBuffer, VertexBuffer};
use crate::scene::mesh::MeshData;

/// 网格渲染数据
#[derive(Debug)]
pub struct MeshRenderData {
    name: String,
    index_buffer: IndexBuffer,
    position_buffer: VertexBuffer,
    attribute_buffer: VertexBuffer,
}

impl MeshRenderData {
    /// 上传网格的三条字节流
    pub fn new(device: &mut DeviceContext, mesh: &MeshData) -> Result<Self> {
        mesh.validate()?;
        let index_buffer = device.create_index_buffer(
            &format!("{} indices", mesh.name),
            mesh.indices.format,
            mesh.indices.count,
            &mesh.indices.data,
        )?;
        let position_buffer = device.create_vertex_buffer(
            &format!("{} positions", mesh.name),
            mesh.positions.stride,
            &mesh.positions.data,
        )?;
        let attribute_buffer = device.create_vertex_buffer(
            &format!("{} attributes", mesh.name),
            mesh.attributes.stride,
            &mesh.attributes.data,
        )?;

        debug!(mesh = %mesh.name, vertices = mesh.vertex_count(), indices = mesh.index_count(), "Mesh render data created");
        Ok(Self {
            name: mesh.name.clone(),
            index_buffer,
            position_buffer,
            attribute_buffer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_buffer(&self) -> &IndexBuffer {
        &self.index_buffer
    }

    /// 输入槽位 0
    pub fn position_buffer(&self) -> &VertexBuffer {
        &self.position_buffer
    }

    /// 输入槽位 1
    pub fn attribute_buffer(&self) -> &VertexBuffer {
        &self.attribute_buffer
    }

    pub fn index_count(&self) -> u32 {
        self.index_buffer.count()
    }
}
