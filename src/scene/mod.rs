//! 场景与资产层
//!
//! 把场景描述文件和网格文件转换成渲染核心需要的数据：
//! 网格字节流（索引、位置流、属性流）、材质参数、节点变换、相机和方向光。
//!
//! # 模块组织
//!
//! - `description`：TOML 场景描述
//! - `mesh`：网格数据、材质、内置立方体
//! - `obj_loader`：OBJ 加载器
//! - `assets`：资产管理器与网格渲染数据缓存
//! - `graph`：场景图

pub mod assets;
pub mod description;
pub mod graph;
pub mod mesh;
pub mod obj_loader;

pub use assets::{AssetManager, MeshHandle};
pub use description::SceneDescription;
pub use graph::{DirectionalLight, Projection, Scene, SceneNode, Transform};
pub use mesh::{MaterialData, MeshData};
