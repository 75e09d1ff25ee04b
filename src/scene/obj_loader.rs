//! OBJ 文件加载器
//!
//! 使用 tobj crate 加载 Wavefront OBJ 格式的模型，转换为位置流 + 属性流的 [`MeshData`]。

use std::path::Path;

use tracing::{info, warn};

use super::mesh::MeshData;
use crate::core::error::{AssetError, Result};

/// 网格加载器接口
pub trait MeshLoader {
    /// 从文件加载网格
    fn load_from_file(path: &Path) -> Result<MeshData>;

    /// 支持的文件扩展名（小写）
    fn supported_extensions() -> &'static [&'static str];

    /// 扩展名是否受支持
    fn supports(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| Self::supported_extensions().contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// OBJ 格式加载器
///
/// - 自动三角化，使用单一索引
/// - 多个对象合并为一个网格
/// - UV 坐标翻转（V 轴：1.0 - v）
/// - 缺失的法线默认为 +Y
pub struct ObjLoader;

impl MeshLoader for ObjLoader {
    fn load_from_file(path: &Path) -> Result<MeshData> {
        if !path.exists() {
            return Err(AssetError::FileNotFound(path.to_path_buf()).into());
        }

        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, _materials) = tobj::load_obj(path, &load_options)
            .map_err(|e| AssetError::ParseError(format!("{}: {}", path.display(), e)))?;

        if models.is_empty() {
            return Err(AssetError::InvalidGeometry(format!("{} contains no models", path.display())).into());
        }

        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut normals: Vec<[f32; 3]> = Vec::new();
        let mut texcoords: Vec<[f32; 2]> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut missing_normals = false;

        for model in &models {
            let mesh = &model.mesh;
            if mesh.positions.len() % 3 != 0 {
                return Err(AssetError::InvalidGeometry(format!(
                    "model '{}' has {} position floats",
                    model.name,
                    mesh.positions.len()
                ))
                .into());
            }

            let vertex_start = positions.len() as u32;
            let vertex_count = mesh.positions.len() / 3;
            let has_normals = mesh.normals.len() >= vertex_count * 3;
            let has_texcoords = mesh.texcoords.len() >= vertex_count * 2;
            missing_normals |= !has_normals;

            for i in 0..vertex_count {
                positions.push([mesh.positions[i * 3], mesh.positions[i * 3 + 1], mesh.positions[i * 3 + 2]]);
                normals.push(if has_normals {
                    [mesh.normals[i * 3], mesh.normals[i * 3 + 1], mesh.normals[i * 3 + 2]]
                } else {
                    [0.0, 1.0, 0.0]
                });
                texcoords.push(if has_texcoords {
                    [mesh.texcoords[i * 2], 1.0 - mesh.texcoords[i * 2 + 1]]
                } else {
                    [0.0, 0.0]
                });
            }
            indices.extend(mesh.indices.iter().map(|&i| vertex_start + i));
        }

        if missing_normals {
            warn!(path = %path.display(), "OBJ file has no normals, defaulting to +Y");
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unnamed");
        let mesh = MeshData::from_vertices(name, &positions, &normals, &texcoords, &indices)?;

        info!(
            path = %path.display(),
            vertices = mesh.vertex_count(),
            indices = mesh.index_count(),
            "OBJ mesh loaded"
        );
        Ok(mesh)
    }

    fn supported_extensions() -> &'static [&'static str] {
        &["obj"]
    }
}
