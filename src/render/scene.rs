//! 渲染场景与渲染图元
//!
//! [`RenderScene`] 是场景图在 GPU 侧的投影：
//! - 一个帧常量缓冲（[`ViewConstants`]，绑定位置 1）
//! - 每个带网格的节点一个 [`RenderPrimitive`]，持有物体常量缓冲（[`PrimitiveConstants`]，
//!   绑定位置 0）并共享网格的渲染数据
//!
//! 矩阵以转置形式写入，着色器按列主序读取后即为行主序的原矩阵。

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use tracing::{debug, info};

use super::mesh_render_data::MeshRenderData;
use crate::core::error::Result;
use crate::math::{matrix, Matrix4, Vector3};
use crate::rhi::{ConstBuffer, DeviceContext, RootSignature};
use crate::scene::{AssetManager, MaterialData, Scene};

/// 帧常量（视图与光源）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ViewConstants {
    pub view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    /// 光源空间投影再映射到阴影贴图的纹理坐标
    pub light_view_proj_tex: [[f32; 4]; 4],
    /// xyz = 光照方向，w = 强度
    pub light_dir_intensity: [f32; 4],
    pub eye_pos: [f32; 4],
}

/// 物体常量
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PrimitiveConstants {
    pub world: [[f32; 4]; 4],
    /// 世界矩阵的逆，不转置写入，着色器读到的即逆转置
    pub inv_transpose: [[f32; 4]; 4],
    pub base_color_factor: [f32; 4],
    /// x = roughness，y = metallic
    pub roughness_metallic: [f32; 4],
}

impl PrimitiveConstants {
    pub fn new(world: &Matrix4, material: &MaterialData) -> Self {
        Self {
            world: matrix::to_cols_transposed(world),
            inv_transpose: matrix::to_cols(&matrix::affine_inverse(world)),
            base_color_factor: material.base_color_factor,
            roughness_metallic: [material.roughness, material.metallic, 0.0, 0.0],
        }
    }
}

/// 渲染图元：一个带网格的场景节点
#[derive(Debug)]
pub struct RenderPrimitive {
    node: usize,
    name: String,
    material: MaterialData,
    constants: ConstBuffer<PrimitiveConstants>,
    mesh: Arc<MeshRenderData>,
}

impl RenderPrimitive {
    /// 对应的场景节点下标
    pub fn node(&self) -> usize {
        self.node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constants(&self) -> &ConstBuffer<PrimitiveConstants> {
        &self.constants
    }

    pub fn mesh(&self) -> &MeshRenderData {
        &self.mesh
    }
}

/// 渲染场景
#[derive(Debug)]
pub struct RenderScene {
    view_constants: ConstBuffer<ViewConstants>,
    primitives: Vec<RenderPrimitive>,
}

impl RenderScene {
    /// 为场景创建常量缓冲与渲染图元
    ///
    /// 场景必须有相机和方向光。
    pub fn new(device: &mut DeviceContext, scene: &Scene, assets: &mut AssetManager, aspect: f32) -> Result<Self> {
        let constants = compute_view_constants(scene, aspect)?;
        let view_constants = device.create_const_buffer("ViewConstants", &constants, RootSignature::FRAME_CONSTANTS)?;

        let mut primitives = Vec::new();
        for (index, node, handle) in scene.mesh_nodes() {
            let mesh = assets.render_data(handle, device)?;
            let material = assets.mesh(handle).map(|m| m.material.clone()).unwrap_or_default();
            let constants = device.create_const_buffer(
                &format!("{} constants", node.name),
                &PrimitiveConstants::new(node.world(), &material),
                RootSignature::OBJECT_CONSTANTS,
            )?;
            primitives.push(RenderPrimitive {
                node: index,
                name: node.name.clone(),
                material,
                constants,
                mesh,
            });
        }

        info!(primitives = primitives.len(), "Render scene created");
        Ok(Self {
            view_constants,
            primitives,
        })
    }

    /// 重新计算帧常量与各图元的世界变换
    pub fn update(&mut self, scene: &Scene, aspect: f32) -> Result<()> {
        self.view_constants.update(&compute_view_constants(scene, aspect)?)?;
        for primitive in &self.primitives {
            if let Some(node) = scene.node(primitive.node) {
                primitive
                    .constants
                    .update(&PrimitiveConstants::new(node.world(), &primitive.material))?;
            }
        }
        debug!(aspect, "Render scene constants updated");
        Ok(())
    }

    pub fn view_constants(&self) -> &ConstBuffer<ViewConstants> {
        &self.view_constants
    }

    pub fn primitives(&self) -> &[RenderPrimitive] {
        &self.primitives
    }
}

/// 光源的观察投影
///
/// 正交投影包住场景包围球：光源位于 `center + dir * 2r`，看向球心，深度范围 [0, 4r]。
pub fn light_view_projection(scene: &Scene, direction: &Vector3) -> Matrix4 {
    let sphere = scene.bounds().sphere;
    let radius = sphere.radius.max(1e-3);
    let eye = sphere.center + direction * 2.0 * radius;
    let view = matrix::look_at(&eye, &sphere.center, &Vector3::y());
    let projection = matrix::orthographic(radius, radius, 0.0, 4.0 * radius);
    projection * view
}

/// 由相机和方向光计算帧常量
pub fn compute_view_constants(scene: &Scene, aspect: f32) -> Result<ViewConstants> {
    let view_proj = scene.projection_matrix(aspect)? * scene.view_matrix()?;
    let (direction, light) = scene.directional_light()?;
    let light_view_proj = light_view_projection(scene, &direction);
    let light_view_proj_tex = matrix::ndc_to_texture() * light_view_proj;
    let eye = scene.eye_position()?;

    Ok(ViewConstants {
        view_proj: matrix::to_cols_transposed(&view_proj),
        light_view_proj: matrix::to_cols_transposed(&light_view_proj),
        light_view_proj_tex: matrix::to_cols_transposed(&light_view_proj_tex),
        light_dir_intensity: [direction.x, direction.y, direction.z, light.intensity],
        eye_pos: [eye.x, eye.y, eye.z, 1.0],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::math::{Point3, Vector4};
    use crate::rhi::DeviceDesc;
    use crate::scene::SceneDescription;
    use approx::assert_relative_eq;

    const SCENE: &str = r#"
[[materials]]
name = "Rough"
base_color_factor = [0.2, 0.4, 0.6, 1.0]
metallic = 0.25
roughness = 0.75

[[meshes]]
name = "Cube"
builtin = "cube"
material = "Rough"

[[nodes]]
name = "CubeNode"
translation = [1.0, 0.0, 0.0]
mesh = 0

[[nodes]]
name = "Camera"
translation = [0.0, 0.0, 6.0]
camera = { type = "perspective", yfov = 0.8, znear = 0.1, zfar = 50.0 }

[[nodes]]
name = "Sun"
rotation = [-0.3826834, 0.0, 0.0, 0.9238795]
light = { type = "directional", intensity = 4.0 }
"#;

    fn setup() -> (DeviceContext, Scene, AssetManager) {
        let mut config = Config::default();
        config.window.width = 8;
        config.window.height = 4;
        let device = DeviceContext::init(DeviceDesc::from(&config)).unwrap();
        let mut assets = AssetManager::new(".");
        let desc = SceneDescription::from_toml_str(SCENE).unwrap();
        let scene = Scene::from_description(&desc, &mut assets).unwrap();
        (device, scene, assets)
    }

    #[test]
    fn test_constant_layouts() {
        assert_eq!(std::mem::size_of::<ViewConstants>(), 224);
        assert_eq!(std::mem::size_of::<PrimitiveConstants>(), 160);
    }

    #[test]
    fn test_one_primitive_per_mesh_node() {
        let (mut device, scene, mut assets) = setup();
        let render_scene = RenderScene::new(&mut device, &scene, &mut assets, 2.0).unwrap();
        assert_eq!(render_scene.primitives().len(), 1);
        let primitive = &render_scene.primitives()[0];
        assert_eq!(primitive.name(), "CubeNode");
        assert_eq!(primitive.mesh().index_count(), 36);
        assert_eq!(primitive.constants().location_index(), RootSignature::OBJECT_CONSTANTS);
        assert_eq!(render_scene.view_constants().location_index(), RootSignature::FRAME_CONSTANTS);
        assert_eq!(render_scene.view_constants().size(), 256);
    }

    #[test]
    fn test_primitive_constants_carry_material_and_transform() {
        let (mut device, scene, mut assets) = setup();
        let render_scene = RenderScene::new(&mut device, &scene, &mut assets, 2.0).unwrap();
        let constants = render_scene.primitives()[0].constants().read().unwrap();
        assert_eq!(constants.base_color_factor, [0.2, 0.4, 0.6, 1.0]);
        assert_eq!(constants.roughness_metallic[..2], [0.75, 0.25]);
        // 转置写入：平移在第 3 行
        assert_eq!([constants.world[0][3], constants.world[1][3], constants.world[2][3]], [1.0, 0.0, 0.0]);
        // 逆矩阵不转置写入：平移在第 3 列
        assert_eq!(constants.inv_transpose[3][..3], [-1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_view_constants() {
        let (_, scene, _) = setup();
        let constants = compute_view_constants(&scene, 2.0).unwrap();
        assert_eq!(constants.eye_pos, [0.0, 0.0, 6.0, 1.0]);
        assert_relative_eq!(constants.light_dir_intensity[3], 4.0);
        let direction = Vector3::new(
            constants.light_dir_intensity[0],
            constants.light_dir_intensity[1],
            constants.light_dir_intensity[2],
        );
        assert_relative_eq!(direction.norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_light_projection_maps_scene_center_into_shadow_map() {
        let (_, scene, _) = setup();
        let (direction, _) = scene.directional_light().unwrap();
        let light = light_view_projection(&scene, &direction);
        let center = scene.bounds().sphere.center;
        let clip = light * Vector4::new(center.x, center.y, center.z, 1.0);
        assert_relative_eq!(clip.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(clip.y, 0.0, epsilon = 1e-4);

        let tex = matrix::ndc_to_texture() * clip;
        assert_relative_eq!(tex.x, 0.5, epsilon = 1e-4);
        assert_relative_eq!(tex.y, 0.5, epsilon = 1e-4);

        let view = scene.view_matrix().unwrap();
        assert_relative_eq!(
            view.transform_point(&Point3::new(0.0, 0.0, 6.0)).coords,
            Vector3::zeros(),
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_update_follows_moved_camera() {
        let (mut device, mut scene, mut assets) = setup();
        let mut render_scene = RenderScene::new(&mut device, &scene, &mut assets, 2.0).unwrap();
        let mut camera = scene.node(1).unwrap().transform;
        camera.translation = Vector3::new(0.0, 3.0, 6.0);
        scene.set_transform(1, camera, &assets).unwrap();
        render_scene.update(&scene, 2.0).unwrap();
        let constants = render_scene.view_constants().read().unwrap();
        assert_eq!(constants.eye_pos, [0.0, 3.0, 6.0, 1.0]);
    }

    #[test]
    fn test_scene_without_camera_is_rejected() {
        let mut config = Config::default();
        config.window.width = 4;
        config.window.height = 4;
        let mut device = DeviceContext::init(DeviceDesc::from(&config)).unwrap();
        let mut assets = AssetManager::new(".");
        let desc = SceneDescription::from_toml_str("[[nodes]]\nname = \"Lonely\"\n").unwrap();
        let scene = Scene::from_description(&desc, &mut assets).unwrap();
        assert!(RenderScene::new(&mut device, &scene, &mut assets, 1.0).is_err());
    }
}
