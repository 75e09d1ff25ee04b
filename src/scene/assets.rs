//! 资产管理器
//!
//! 持有加载后的网格与材质，并按需为网格创建 GPU 渲染数据。
//! 每个网格的渲染数据只创建一次，以 `Arc` 共享。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::description::{BuiltinMesh, MaterialDescription, MeshDescription};
use super::mesh::{MaterialData, MeshData};
use super::obj_loader::{MeshLoader, ObjLoader};
use crate::core::error::{AssetError, Result};
use crate::render::mesh_render_data::MeshRenderData;
use crate::rhi::DeviceContext;

/// 网格句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub usize);

/// 资产管理器
#[derive(Debug, Default)]
pub struct AssetManager {
    base_dir: PathBuf,
    meshes: Vec<Arc<MeshData>>,
    by_name: HashMap<String, MeshHandle>,
    materials: HashMap<String, MaterialData>,
    render_data: HashMap<MeshHandle, Arc<MeshRenderData>>,
}

impl AssetManager {
    /// `base_dir` 为网格相对路径的基准目录
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn register_material(&mut self, desc: &MaterialDescription) {
        self.materials.insert(
            desc.name.clone(),
            MaterialData {
                name: desc.name.clone(),
                base_color_factor: desc.base_color_factor,
                metallic: desc.metallic,
                roughness: desc.roughness,
            },
        );
    }

    pub fn material(&self, name: &str) -> Option<&MaterialData> {
        self.materials.get(name)
    }

    /// 加载描述中的网格，同名网格只加载一次
    pub fn load_mesh(&mut self, desc: &MeshDescription) -> Result<MeshHandle> {
        if let Some(handle) = self.by_name.get(&desc.name) {
            return Ok(*handle);
        }

        let mut mesh = match (&desc.builtin, &desc.path) {
            (Some(BuiltinMesh::Cube), _) => MeshData::cube(desc.name.clone(), 1.0),
            (None, Some(path)) => {
                let path = self.base_dir.join(path);
                if !ObjLoader::supports(&path) {
                    return Err(AssetError::UnsupportedFormat(path.display().to_string()).into());
                }
                let mut mesh = ObjLoader::load_from_file(&path)?;
                mesh.name = desc.name.clone();
                mesh
            }
            (None, None) => {
                return Err(AssetError::InvalidScene(format!("mesh '{}' has no source", desc.name)).into())
            }
        };

        if let Some(material) = &desc.material {
            let material = self
                .materials
                .get(material)
                .cloned()
                .ok_or_else(|| AssetError::InvalidScene(format!("unknown material '{}'", material)))?;
            mesh = mesh.with_material(material);
        }

        self.add_mesh(mesh)
    }

    /// 注册一个网格（8 位索引在此扩展）
    pub fn add_mesh(&mut self, mut mesh: MeshData) -> Result<MeshHandle> {
        mesh.normalize_indices()?;
        mesh.validate()?;
        let handle = MeshHandle(self.meshes.len());
        debug!(mesh = %mesh.name, handle = handle.0, "Mesh registered");
        self.by_name.insert(mesh.name.clone(), handle);
        self.meshes.push(Arc::new(mesh));
        Ok(handle)
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&Arc<MeshData>> {
        self.meshes.get(handle.0)
    }

    pub fn mesh_by_name(&self, name: &str) -> Option<MeshHandle> {
        self.by_name.get(name).copied()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// 查询网格的渲染数据，首次查询时创建
    pub fn render_data(&mut self, handle: MeshHandle, device: &mut DeviceContext) -> Result<Arc<MeshRenderData>> {
        if let Some(data) = self.render_data.get(&handle) {
            return Ok(Arc::clone(data));
        }
        let mesh = self
            .meshes
            .get(handle.0)
            .ok_or_else(|| AssetError::InvalidScene(format!("unknown mesh handle {}", handle.0)))?;
        let data = Arc::new(MeshRenderData::new(device, mesh)?);
        self.render_data.insert(handle, Arc::clone(&data));
        Ok(data)
    }

    pub fn render_data_count(&self) -> usize {
        self.render_data.len()
    }

    /// 释放全部渲染数据（仍被渲染图元引用的在图元释放后销毁）
    pub fn release_render_data(&mut self) {
        if !self.render_data.is_empty() {
            info!(count = self.render_data.len(), "Releasing mesh render data");
        }
        self.render_data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::rhi::{DeviceDesc, Format};
    use crate::scene::mesh::IndexData;

    fn device() -> DeviceContext {
        let mut config = Config::default();
        config.window.width = 4;
        config.window.height = 4;
        DeviceContext::init(DeviceDesc::from(&config)).unwrap()
    }

    fn cube_desc(name: &str) -> MeshDescription {
        MeshDescription {
            name: name.to_string(),
            builtin: Some(BuiltinMesh::Cube),
            path: None,
            material: None,
        }
    }

    #[test]
    fn test_meshes_are_loaded_once() {
        let mut assets = AssetManager::new(".");
        let a = assets.load_mesh(&cube_desc("Cube")).unwrap();
        let b = assets.load_mesh(&cube_desc("Cube")).unwrap();
        assert_eq!(a, b);
        assert_eq!(assets.mesh_count(), 1);
        assert_eq!(assets.mesh_by_name("Cube"), Some(a));
    }

    #[test]
    fn test_material_is_applied() {
        let mut assets = AssetManager::new(".");
        assets.register_material(&MaterialDescription {
            name: "Gold".to_string(),
            base_color_factor: [1.0, 0.8, 0.2, 1.0],
            metallic: 1.0,
            roughness: 0.3,
        });
        let mut desc = cube_desc("GoldCube");
        desc.material = Some("Gold".to_string());
        let handle = assets.load_mesh(&desc).unwrap();
        let mesh = assets.mesh(handle).unwrap();
        assert_eq!(mesh.material.name, "Gold");
        assert_eq!(mesh.material.roughness, 0.3);
    }

    #[test]
    fn test_render_data_is_cached() {
        let mut device = device();
        let mut assets = AssetManager::new(".");
        let handle = assets.load_mesh(&cube_desc("Cube")).unwrap();
        let first = assets.render_data(handle, &mut device).unwrap();
        let second = assets.render_data(handle, &mut device).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.index_count(), 36);
        assert_eq!(assets.render_data_count(), 1);
        assert!(assets.render_data(MeshHandle(9), &mut device).is_err());
    }

    #[test]
    fn test_8bit_indices_widened_on_registration() {
        let mut assets = AssetManager::new(".");
        let mut mesh = MeshData::cube("Narrow", 1.0);
        let indices: Vec<u8> = mesh.indices.to_u32().iter().map(|&i| i as u8).collect();
        mesh.indices = IndexData { count: 36, format: Format::R8Uint, data: indices };
        let handle = assets.add_mesh(mesh).unwrap();
        assert_eq!(assets.mesh(handle).unwrap().indices.format, Format::R16Uint);
    }

    #[test]
    fn test_unsupported_mesh_format() {
        let mut assets = AssetManager::new(".");
        let desc = MeshDescription {
            name: "Fbx".to_string(),
            builtin: None,
            path: Some(PathBuf::from("model.fbx")),
            material: None,
        };
        assert!(matches!(
            assets.load_mesh(&desc).unwrap_err(),
            crate::core::error::RenderError::Asset(AssetError::UnsupportedFormat(_))
        ));
    }
}
