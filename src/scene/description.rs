//! 场景描述文件
//!
//! TOML 格式，结构与 glTF 的节点模型一致：材质、网格、节点（局部变换、子节点、
//! 可选的网格/相机/灯光）。
//!
//! ```toml
//! [[materials]]
//! name = "Red"
//! base_color_factor = [0.8, 0.1, 0.1, 1.0]
//!
//! [[meshes]]
//! name = "Cube"
//! builtin = "cube"
//! material = "Red"
//!
//! [[nodes]]
//! name = "Root"
//! children = [1]
//!
//! [[nodes]]
//! name = "CubeNode"
//! mesh = 0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{AssetError, Result};

/// 场景描述
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub materials: Vec<MaterialDescription>,
    #[serde(default)]
    pub meshes: Vec<MeshDescription>,
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialDescription {
    pub name: String,
    #[serde(default = "default_base_color")]
    pub base_color_factor: [f32; 4],
    #[serde(default)]
    pub metallic: f32,
    #[serde(default = "default_roughness")]
    pub roughness: f32,
}

/// 内置网格
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuiltinMesh {
    Cube,
}

/// 网格来源：内置网格或 OBJ 文件（二选一）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshDescription {
    pub name: String,
    #[serde(default)]
    pub builtin: Option<BuiltinMesh>,
    /// 相对场景文件所在目录
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub material: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    #[serde(default)]
    pub translation: [f32; 3],
    /// 四元数 [x, y, z, w]
    #[serde(default = "default_rotation")]
    pub rotation: [f32; 4],
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],
    #[serde(default)]
    pub children: Vec<usize>,
    #[serde(default)]
    pub mesh: Option<usize>,
    #[serde(default)]
    pub camera: Option<CameraDescription>,
    #[serde(default)]
    pub light: Option<LightDescription>,
}

/// 相机参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CameraDescription {
    Perspective { yfov: f32, znear: f32, zfar: f32 },
    Orthographic { xmag: f32, ymag: f32, znear: f32, zfar: f32 },
}

/// 灯光类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDescription {
    #[serde(rename = "type")]
    pub kind: LightKind,
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_light_color")]
    pub color: [f32; 3],
}

fn default_base_color() -> [f32; 4] {
    [1.0; 4]
}

fn default_roughness() -> f32 {
    1.0
}

fn default_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn default_scale() -> [f32; 3] {
    [1.0; 3]
}

fn default_intensity() -> f32 {
    1.0
}

fn default_light_color() -> [f32; 3] {
    [1.0; 3]
}

impl SceneDescription {
    /// 从文件加载
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|_| AssetError::FileNotFound(path.to_path_buf()))?;
        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let description: Self = toml::from_str(contents).map_err(|e| AssetError::ParseError(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    /// 校验引用关系
    ///
    /// 子节点下标与网格下标必须有效，每个节点至多一个父节点，网格来源二选一。
    pub fn validate(&self) -> Result<()> {
        let mut has_parent = vec![false; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for &child in &node.children {
                if child >= self.nodes.len() || child == index {
                    return Err(scene_error(format!("node '{}' has invalid child {}", node.name, child)));
                }
                if std::mem::replace(&mut has_parent[child], true) {
                    return Err(scene_error(format!("node {} has more than one parent", child)));
                }
            }
            if let Some(mesh) = node.mesh {
                if mesh >= self.meshes.len() {
                    return Err(scene_error(format!("node '{}' references missing mesh {}", node.name, mesh)));
                }
            }
        }

        for mesh in &self.meshes {
            if mesh.builtin.is_some() == mesh.path.is_some() {
                return Err(scene_error(format!(
                    "mesh '{}' needs exactly one of 'builtin' or 'path'",
                    mesh.name
                )));
            }
            if let Some(material) = &mesh.material {
                if !self.materials.iter().any(|m| &m.name == material) {
                    return Err(scene_error(format!("mesh '{}' uses unknown material '{}'", mesh.name, material)));
                }
            }
        }
        Ok(())
    }
}

fn scene_error(reason: String) -> crate::core::error::RenderError {
    AssetError::InvalidScene(reason).into()
}
