//! 网格数据结构模块
//!
//! CPU 侧的网格数据容器：索引流、位置流和打包的其他属性流（法线 + 纹理坐标），
//! 以字节形式保存，可以直接交给设备上传。

use bytemuck::{Pod, Zeroable};

use crate::core::error::{AssetError, Result};
use crate::math::{BoundingBox, Bounds, Vector3};
use crate::rhi::buffer::normalize_indices;
use crate::rhi::types::Format;

/// 位置流步长（float3）
pub const POSITION_STRIDE: u32 = 12;
/// 属性流步长（float3 法线 + float2 纹理坐标）
pub const ATTRIBUTE_STRIDE: u32 = 20;

/// 属性流中的单个顶点
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PackedAttribute {
    pub normal: [f32; 3],
    pub texcoord: [f32; 2],
}

/// 一段顶点属性字节流
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeData {
    /// 元素数量
    pub count: u32,
    /// 每个元素的字节数
    pub stride: u32,
    pub data: Vec<u8>,
}

impl AttributeData {
    pub fn from_pod<T: Pod>(elements: &[T]) -> Self {
        Self {
            count: elements.len() as u32,
            stride: std::mem::size_of::<T>() as u32,
            data: bytemuck::cast_slice(elements).to_vec(),
        }
    }
}

/// 索引字节流
#[derive(Debug, Clone, PartialEq)]
pub struct IndexData {
    pub count: u32,
    /// 索引格式（R8/R16/R32）
    pub format: Format,
    pub data: Vec<u8>,
}

impl IndexData {
    /// 按最大索引选择 16 位或 32 位
    pub fn from_indices(indices: &[u32]) -> Self {
        let max = indices.iter().copied().max().unwrap_or(0);
        if max <= u16::MAX as u32 {
            let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
            Self {
                count: indices.len() as u32,
                format: Format::R16Uint,
                data: bytemuck::cast_slice(&narrow).to_vec(),
            }
        } else {
            Self {
                count: indices.len() as u32,
                format: Format::R32Uint,
                data: bytemuck::cast_slice(indices).to_vec(),
            }
        }
    }

    /// 每个索引的字节数
    pub fn stride(&self) -> u32 {
        self.format.bytes_per_element()
    }

    /// 解码为 u32 索引
    pub fn to_u32(&self) -> Vec<u32> {
        match self.format {
            Format::R8Uint => self.data.iter().map(|&i| i as u32).collect(),
            Format::R16Uint => self
                .data
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .collect(),
            _ => self
                .data
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }
}

/// 材质参数
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub base_color_factor: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: "DefaultMaterial".to_string(),
            base_color_factor: [1.0; 4],
            metallic: 0.0,
            roughness: 1.0,
        }
    }
}

/// CPU 侧网格数据
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub indices: IndexData,
    pub positions: AttributeData,
    /// 法线 + 纹理坐标
    pub attributes: AttributeData,
    pub material: MaterialData,
    pub bounds: Bounds,
}

impl MeshData {
    /// 从分离的顶点数组构建
    ///
    /// 法线与纹理坐标数组必须与位置数组等长。
    pub fn from_vertices(
        name: impl Into<String>,
        positions: &[[f32; 3]],
        normals: &[[f32; 3]],
        texcoords: &[[f32; 2]],
        indices: &[u32],
    ) -> Result<Self> {
        let name = name.into();
        if normals.len() != positions.len() || texcoords.len() != positions.len() {
            return Err(AssetError::InvalidGeometry(format!(
                "mesh '{}' has {} positions, {} normals and {} texcoords",
                name,
                positions.len(),
                normals.len(),
                texcoords.len()
            ))
            .into());
        }

        let attributes: Vec<PackedAttribute> = normals
            .iter()
            .zip(texcoords)
            .map(|(&normal, &texcoord)| PackedAttribute { normal, texcoord })
            .collect();

        let mut bbox = BoundingBox::empty();
        for p in positions {
            let p = Vector3::from(*p);
            bbox.merge(&BoundingBox { min: p, max: p });
        }

        let mesh = Self {
            name,
            indices: IndexData::from_indices(indices),
            positions: AttributeData::from_pod(positions),
            attributes: AttributeData::from_pod(&attributes),
            material: MaterialData::default(),
            bounds: if bbox.is_empty() { Bounds::default() } else { Bounds::from_box(bbox) },
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// 立方体：24 个顶点（每面 4 个，法线各自独立），36 个 16 位索引
    pub fn cube(name: impl Into<String>, half_extent: f32) -> Self {
        let h = half_extent;
        // (法线, 切向 u, 切向 v)
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        let corners = [(-1.0, -1.0, [0.0, 1.0]), (1.0, -1.0, [1.0, 1.0]), (1.0, 1.0, [1.0, 0.0]), (-1.0, 1.0, [0.0, 0.0])];

        let mut positions = Vec::with_capacity(24);
        let mut attributes = Vec::with_capacity(24);
        let mut indices: Vec<u16> = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let base = positions.len() as u16;
            for (su, sv, texcoord) in corners {
                positions.push([
                    (normal[0] + u[0] * su + v[0] * sv) * h,
                    (normal[1] + u[1] * su + v[1] * sv) * h,
                    (normal[2] + u[2] * su + v[2] * sv) * h,
                ]);
                attributes.push(PackedAttribute { normal, texcoord });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self {
            name: name.into(),
            indices: IndexData {
                count: indices.len() as u32,
                format: Format::R16Uint,
                data: bytemuck::cast_slice(&indices).to_vec(),
            },
            positions: AttributeData::from_pod(&positions),
            attributes: AttributeData::from_pod(&attributes),
            material: MaterialData::default(),
            bounds: Bounds::new(Vector3::repeat(-h), Vector3::repeat(h)),
        }
    }

    /// 把 8 位索引扩展为 16 位
    pub fn normalize_indices(&mut self) -> Result<()> {
        if self.indices.format == Format::R8Uint {
            let (format, data) = normalize_indices(self.indices.format, self.indices.count, &self.indices.data)?;
            self.indices = IndexData {
                count: self.indices.count,
                format,
                data: data.into_owned(),
            };
        }
        Ok(())
    }

    pub fn with_material(mut self, material: MaterialData) -> Self {
        self.material = material;
        self
    }

    pub fn vertex_count(&self) -> u32 {
        self.positions.count
    }

    pub fn index_count(&self) -> u32 {
        self.indices.count
    }

    /// 校验流的一致性与索引范围
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> crate::core::error::RenderError {
            AssetError::InvalidGeometry(format!("mesh '{}': {}", self.name, reason)).into()
        };

        if self.positions.count == 0 || self.indices.count == 0 {
            return Err(invalid("mesh has no vertices or no indices".to_string()));
        }
        if self.positions.stride != POSITION_STRIDE || self.attributes.stride != ATTRIBUTE_STRIDE {
            return Err(invalid(format!(
                "unexpected strides {}/{}",
                self.positions.stride, self.attributes.stride
            )));
        }
        if self.attributes.count != self.positions.count {
            return Err(invalid(format!(
                "{} positions but {} attributes",
                self.positions.count, self.attributes.count
            )));
        }
        if self.indices.count % 3 != 0 {
            return Err(invalid(format!("{} indices do not form triangles", self.indices.count)));
        }
        if self.indices.data.len() != (self.indices.count * self.indices.stride()) as usize {
            return Err(invalid("index byte length does not match count".to_string()));
        }
        if let Some(bad) = self.indices.to_u32().into_iter().find(|&i| i >= self.positions.count) {
            return Err(invalid(format!("index {} out of range ({} vertices)", bad, self.positions.count)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_layout() {
        let cube = MeshData::cube("Cube", 1.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.indices.format, Format::R16Uint);
        assert_eq!(cube.positions.data.len(), 24 * 12);
        assert_eq!(cube.attributes.data.len(), 24 * 20);
        assert_relative_eq!(cube.bounds.sphere.radius, 1.0);
        cube.validate().unwrap();
    }

    #[test]
    fn test_cube_faces_point_outwards() {
        let cube = MeshData::cube("Cube", 0.5);
        let floats = |bytes: &[u8]| -> Vec<f32> {
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        };
        let positions = floats(&cube.positions.data);
        let attributes = floats(&cube.attributes.data);
        for (p, a) in positions.chunks_exact(3).zip(attributes.chunks_exact(5)) {
            let dot: f32 = p.iter().zip(&a[..3]).map(|(x, n)| x * n).sum();
            assert_relative_eq!(dot, 0.5);
        }
    }

    #[test]
    fn test_from_vertices_picks_index_width() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 2.0, 0.0]];
        let normals = [[0.0, 0.0, 1.0]; 3];
        let texcoords = [[0.0, 0.0]; 3];
        let mesh = MeshData::from_vertices("tri", &positions, &normals, &texcoords, &[0, 1, 2]).unwrap();
        assert_eq!(mesh.indices.format, Format::R16Uint);
        assert_eq!(mesh.bounds.bbox.max, Vector3::new(1.0, 2.0, 0.0));
        assert_relative_eq!(mesh.bounds.sphere.radius, 1.0);

        assert!(MeshData::from_vertices("bad", &positions, &normals, &texcoords, &[0, 1, 3]).is_err());
        assert!(MeshData::from_vertices("bad", &positions, &normals[..2], &texcoords, &[0, 1, 2]).is_err());
    }

    #[test]
    fn test_normalize_8bit_indices() {
        let mut mesh = MeshData::cube("Cube", 1.0);
        let original = mesh.indices.to_u32();
        mesh.indices = IndexData {
            count: 36,
            format: Format::R8Uint,
            data: original.iter().map(|&i| i as u8).collect(),
        };
        mesh.validate().unwrap();
        mesh.normalize_indices().unwrap();
        assert_eq!(mesh.indices.format, Format::R16Uint);
        assert_eq!(mesh.indices.to_u32(), original);
    }
}
