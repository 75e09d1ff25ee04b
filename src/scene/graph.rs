//! 场景图
//!
//! 由 [`SceneDescription`] 构建：节点的局部变换（平移 * 旋转 * 缩放）、
//! 按父子关系累积的世界变换、网格引用，以及第一台相机和第一盏方向光。
//!
//! 场景图只描述"在哪里、是什么"，不持有任何 GPU 资源；
//! GPU 侧的投影由 `render::scene::RenderScene` 负责。

use std::path::Path;

use tracing::{debug, info, warn};

use super::assets::{AssetManager, MeshHandle};
use super::description::{CameraDescription, LightDescription, LightKind, NodeDescription, SceneDescription};
use crate::core::error::{AssetError, Result};
use crate::math::{matrix, BoundingBox, Bounds, Matrix4, Quaternion, Vector3};

/// 局部变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3,
    pub rotation: Quaternion,
    pub scale: Vector3,
}

impl Transform {
    /// 变换矩阵（T * R * S）
    pub fn to_matrix(&self) -> Matrix4 {
        matrix::trs(&self.translation, &self.rotation, &self.scale)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: Quaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl From<&NodeDescription> for Transform {
    fn from(node: &NodeDescription) -> Self {
        let [x, y, z, w] = node.rotation;
        Self {
            translation: Vector3::from(node.translation),
            rotation: Quaternion::from_quaternion(nalgebra::Quaternion::new(w, x, y, z)),
            scale: Vector3::from(node.scale),
        }
    }
}

/// 相机投影
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// 透视投影，宽高比取输出视口
    Perspective { yfov: f32, znear: f32, zfar: f32 },
    Orthographic { xmag: f32, ymag: f32, znear: f32, zfar: f32 },
}

impl Projection {
    pub fn matrix(&self, aspect: f32) -> Matrix4 {
        match *self {
            Projection::Perspective { yfov, znear, zfar } => matrix::perspective(yfov, aspect, znear, zfar),
            Projection::Orthographic { xmag, ymag, znear, zfar } => matrix::orthographic(xmag, ymag, znear, zfar),
        }
    }
}

impl From<CameraDescription> for Projection {
    fn from(camera: CameraDescription) -> Self {
        match camera {
            CameraDescription::Perspective { yfov, znear, zfar } => Projection::Perspective { yfov, znear, zfar },
            CameraDescription::Orthographic { xmag, ymag, znear, zfar } => {
                Projection::Orthographic { xmag, ymag, znear, zfar }
            }
        }
    }
}

/// 方向光
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub intensity: f32,
    pub color: Vector3,
}

impl TryFrom<&LightDescription> for DirectionalLight {
    type Error = crate::core::error::RenderError;

    fn try_from(light: &LightDescription) -> Result<Self> {
        match light.kind {
            LightKind::Directional => Ok(Self {
                intensity: light.intensity,
                color: Vector3::from(light.color),
            }),
            other => Err(AssetError::InvalidScene(format!("{:?} lights are not supported", other)).into()),
        }
    }
}

/// 场景节点
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    world: Matrix4,
    parent: Option<usize>,
    children: Vec<usize>,
    pub mesh: Option<MeshHandle>,
    pub camera: Option<Projection>,
    pub light: Option<DirectionalLight>,
}

impl SceneNode {
    /// 世界变换
    pub fn world(&self) -> &Matrix4 {
        &self.world
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }
}

/// 场景
#[derive(Debug, Clone)]
pub struct Scene {
    nodes: Vec<SceneNode>,
    camera: Option<usize>,
    light: Option<usize>,
    bounds: Bounds,
}

impl Scene {
    /// 加载场景文件，网格相对 `assets` 的基准目录解析
    pub fn load<P: AsRef<Path>>(path: P, assets: &mut AssetManager) -> Result<Self> {
        let path = path.as_ref();
        let desc = SceneDescription::from_file(path)?;
        let scene = Self::from_description(&desc, assets)?;
        info!(
            path = %path.display(),
            nodes = scene.nodes.len(),
            meshes = assets.mesh_count(),
            "Scene loaded"
        );
        Ok(scene)
    }

    /// 从场景描述构建：注册材质、加载网格、计算世界变换与包围体
    pub fn from_description(desc: &SceneDescription, assets: &mut AssetManager) -> Result<Self> {
        desc.validate()?;
        for material in &desc.materials {
            assets.register_material(material);
        }
        let meshes = desc
            .meshes
            .iter()
            .map(|mesh| assets.load_mesh(mesh))
            .collect::<Result<Vec<_>>>()?;

        let mut nodes = Vec::with_capacity(desc.nodes.len());
        for node in &desc.nodes {
            nodes.push(SceneNode {
                name: node.name.clone(),
                transform: Transform::from(node),
                world: Matrix4::identity(),
                parent: None,
                children: node.children.clone(),
                mesh: node.mesh.map(|index| meshes[index]),
                camera: node.camera.map(Projection::from),
                light: node.light.as_ref().map(DirectionalLight::try_from).transpose()?,
            });
        }
        for index in 0..nodes.len() {
            for child in nodes[index].children.clone() {
                nodes[child].parent = Some(index);
            }
        }

        let camera = nodes.iter().position(|n| n.camera.is_some());
        let light = nodes.iter().position(|n| n.light.is_some());
        if nodes.iter().filter(|n| n.camera.is_some()).count() > 1 {
            warn!("Scene has more than one camera, using the first");
        }

        let mut scene = Self {
            nodes,
            camera,
            light,
            bounds: Bounds::default(),
        };
        scene.update_world_transforms(assets)?;
        Ok(scene)
    }

    /// 重新计算全部世界变换与场景包围体
    ///
    /// 从根节点深度优先遍历；遍历不到的节点说明存在环。
    pub fn update_world_transforms(&mut self, assets: &AssetManager) -> Result<()> {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(usize, Matrix4)> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| (i, Matrix4::identity()))
            .collect();

        while let Some((index, parent_world)) = stack.pop() {
            if std::mem::replace(&mut visited[index], true) {
                continue;
            }
            let node = &mut self.nodes[index];
            node.world = parent_world * node.transform.to_matrix();
            let world = node.world;
            stack.extend(node.children.iter().map(|&child| (child, world)));
        }

        if let Some(index) = visited.iter().position(|v| !v) {
            return Err(AssetError::InvalidScene(format!(
                "node '{}' is part of a cycle",
                self.nodes[index].name
            ))
            .into());
        }

        let mut bbox = BoundingBox::empty();
        for node in &self.nodes {
            if let Some(mesh) = node.mesh.and_then(|handle| assets.mesh(handle)) {
                bbox.merge(&mesh.bounds.bbox.transformed(&node.world));
            }
        }
        self.bounds = if bbox.is_empty() { Bounds::default() } else { Bounds::from_box(bbox) };
        debug!(
            radius = self.bounds.sphere.radius,
            center = ?self.bounds.sphere.center,
            "Scene bounds updated"
        );
        Ok(())
    }

    /// 修改节点的局部变换并刷新世界变换
    pub fn set_transform(&mut self, node: usize, transform: Transform, assets: &AssetManager) -> Result<()> {
        let target = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| AssetError::InvalidScene(format!("node {} does not exist", node)))?;
        target.transform = transform;
        self.update_world_transforms(assets)
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&SceneNode> {
        self.nodes.get(index)
    }

    /// 带网格的节点，按节点顺序
    pub fn mesh_nodes(&self) -> impl Iterator<Item = (usize, &SceneNode, MeshHandle)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.mesh.map(|mesh| (i, n, mesh)))
    }

    pub fn camera_node(&self) -> Option<&SceneNode> {
        self.camera.map(|i| &self.nodes[i])
    }

    pub fn light_node(&self) -> Option<&SceneNode> {
        self.light.map(|i| &self.nodes[i])
    }

    /// 观察矩阵（相机世界变换的逆）
    pub fn view_matrix(&self) -> Result<Matrix4> {
        let camera = self.camera_node().ok_or_else(no_camera)?;
        Ok(matrix::affine_inverse(camera.world()))
    }

    pub fn projection_matrix(&self, aspect: f32) -> Result<Matrix4> {
        let camera = self.camera_node().ok_or_else(no_camera)?;
        let projection = camera.camera.ok_or_else(no_camera)?;
        Ok(projection.matrix(aspect))
    }

    /// 相机位置（世界变换第 3 列）
    pub fn eye_position(&self) -> Result<Vector3> {
        let camera = self.camera_node().ok_or_else(no_camera)?;
        Ok(matrix::column3(camera.world(), 3))
    }

    /// 方向光的方向（世界变换第 2 列归一化）与参数
    pub fn directional_light(&self) -> Result<(Vector3, DirectionalLight)> {
        let node = self.light_node().ok_or_else(no_light)?;
        let light = node.light.ok_or_else(no_light)?;
        let direction = matrix::column3(node.world(), 2);
        let direction = direction
            .try_normalize(f32::EPSILON)
            .ok_or_else(|| AssetError::InvalidScene(format!("light '{}' has a degenerate transform", node.name)))?;
        Ok((direction, light))
    }

    /// 世界空间的场景包围体
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }
}

fn no_camera() -> crate::core::error::RenderError {
    AssetError::InvalidScene("scene has no camera".to_string()).into()
}

fn no_light() -> crate::core::error::RenderError {
    AssetError::InvalidScene("scene has no directional light".to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SCENE: &str = r#"
[[meshes]]
name = "Cube"
builtin = "cube"

[[nodes]]
name = "Root"
translation = [0.0, 1.0, 0.0]
children = [1, 2, 3]

[[nodes]]
name = "CubeNode"
translation = [2.0, 0.0, 0.0]
scale = [2.0, 2.0, 2.0]
mesh = 0

[[nodes]]
name = "Camera"
translation = [0.0, 0.0, 10.0]
camera = { type = "perspective", yfov = 0.8, znear = 0.1, zfar = 100.0 }

[[nodes]]
name = "Sun"
rotation = [-0.7071068, 0.0, 0.0, 0.7071068]
light = { type = "directional", intensity = 2.0 }
"#;

    fn load(source: &str) -> (Scene, AssetManager) {
        let mut assets = AssetManager::new(".");
        let desc = SceneDescription::from_toml_str(source).unwrap();
        let scene = Scene::from_description(&desc, &mut assets).unwrap();
        (scene, assets)
    }

    #[test]
    fn test_world_transforms_accumulate() {
        let (scene, _) = load(SCENE);
        let cube = scene.node(1).unwrap();
        assert_eq!(cube.parent(), Some(0));
        assert_relative_eq!(matrix::column3(cube.world(), 3), Vector3::new(2.0, 1.0, 0.0));
        assert_relative_eq!(scene.eye_position().unwrap(), Vector3::new(0.0, 1.0, 10.0));
    }

    #[test]
    fn test_bounds_are_in_world_space() {
        let (scene, _) = load(SCENE);
        let bounds = scene.bounds();
        assert_relative_eq!(bounds.bbox.min, Vector3::new(0.0, -1.0, -2.0), epsilon = 1e-5);
        assert_relative_eq!(bounds.bbox.max, Vector3::new(4.0, 3.0, 2.0), epsilon = 1e-5);
        assert_relative_eq!(bounds.sphere.radius, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_light_direction_is_normalized_z_axis() {
        let (scene, _) = load(SCENE);
        let (direction, light) = scene.directional_light().unwrap();
        // 绕 X 轴 -90 度：Z 轴转到 +Y
        assert_relative_eq!(direction, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(light.intensity, 2.0);
    }

    #[test]
    fn test_view_matrix_inverts_camera() {
        let (scene, _) = load(SCENE);
        let view = scene.view_matrix().unwrap();
        let eye = view.transform_point(&crate::math::Point3::new(0.0, 1.0, 10.0));
        assert_relative_eq!(eye.coords, Vector3::zeros(), epsilon = 1e-5);
    }

    #[test]
    fn test_set_transform_updates_children() {
        let (mut scene, assets) = load(SCENE);
        let mut root = scene.node(0).unwrap().transform;
        root.translation = Vector3::new(0.0, 5.0, 0.0);
        scene.set_transform(0, root, &assets).unwrap();
        assert_relative_eq!(
            matrix::column3(scene.node(1).unwrap().world(), 3),
            Vector3::new(2.0, 5.0, 0.0)
        );
        assert!(scene.set_transform(42, root, &assets).is_err());
    }

    #[test]
    fn test_point_lights_are_rejected() {
        let source = "[[nodes]]\nname = \"Bulb\"\nlight = { type = \"point\" }\n";
        let mut assets = AssetManager::new(".");
        let desc = SceneDescription::from_toml_str(source).unwrap();
        assert!(Scene::from_description(&desc, &mut assets).is_err());
    }

    #[test]
    fn test_missing_camera_and_light() {
        let (scene, _) = load("[[nodes]]\nname = \"Empty\"\n");
        assert!(scene.view_matrix().is_err());
        assert!(scene.directional_light().is_err());
        assert_eq!(scene.mesh_nodes().count(), 0);
        assert_eq!(*scene.bounds(), Bounds::default());
    }
}
