//! 统一的数学库模块
//!
//! 基于 `nalgebra` 提供渲染常用的类型别名、颜色常量和矩阵辅助函数。
//!
//! # 模块组织
//!
//! - **基础类型**：Vector3/4, Matrix4, Quaternion, Color
//! - **矩阵辅助函数**：TRS 组合、透视/正交投影、观察矩阵、纹理空间偏移
//! - **包围体**：见 [`bounds`] 子模块
//!
//! 矩阵使用列主序存储，与 nalgebra 一致。写入常量缓冲时由调用方决定是否转置。

pub mod bounds;

pub use bounds::{BoundingBox, BoundingSphere, Bounds};

pub use nalgebra::{
    Matrix4 as Mat4, Point3, UnitQuaternion, Vector3 as Vec3, Vector4 as Vec4,
};

// 类型别名，使用更简洁的名称
pub type Vector3 = Vec3<f32>;
pub type Vector4 = Vec4<f32>;
pub type Matrix4 = Mat4<f32>;
pub type Quaternion = UnitQuaternion<f32>;

/// 颜色类型（RGBA，范围 0.0-1.0）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// 创建新的颜色
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// 转换为数组（常量缓冲/清屏使用）
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// 编码为 8 位 UNORM RGBA
    pub fn to_rgba8(self) -> [u8; 4] {
        let quantize = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [quantize(self.r), quantize(self.g), quantize(self.b), quantize(self.a)]
    }

    // 预定义颜色
    pub const WHITE: Color = Color::new(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    /// 基础通道的清屏颜色
    pub const LIGHT_STEEL_BLUE: Color = Color::new(0.690_196_1, 0.768_627_5, 0.870_588_3, 1.0);
}

/// 矩阵辅助函数
pub mod matrix {
    use super::*;

    /// 组合 平移 * 旋转 * 缩放
    pub fn trs(translation: &Vector3, rotation: &Quaternion, scale: &Vector3) -> Matrix4 {
        let mut local = rotation.to_homogeneous() * Matrix4::new_nonuniform_scaling(scale);
        local.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
        local
    }

    /// 透视投影矩阵（右手坐标系）
    ///
    /// # 参数
    ///
    /// * `yfov` - 垂直视野（弧度）
    /// * `aspect` - 宽高比
    /// * `znear` / `zfar` - 近/远平面
    pub fn perspective(yfov: f32, aspect: f32, znear: f32, zfar: f32) -> Matrix4 {
        Matrix4::new_perspective(aspect, yfov, znear, zfar)
    }

    /// 正交投影矩阵，`xmag`/`ymag` 为半宽/半高
    pub fn orthographic(xmag: f32, ymag: f32, znear: f32, zfar: f32) -> Matrix4 {
        Matrix4::new_orthographic(-xmag, xmag, -ymag, ymag, znear, zfar)
    }

    /// 观察矩阵（右手坐标系）
    ///
    /// `up` 与视线平行时改用 Z 轴作为上方向。
    pub fn look_at(eye: &Vector3, target: &Vector3, up: &Vector3) -> Matrix4 {
        let forward = (target - eye).normalize();
        let up = if forward.cross(up).norm_squared() < 1e-6 {
            Vector3::z()
        } else {
            *up
        };
        Matrix4::look_at_rh(&Point3::from(*eye), &Point3::from(*target), &up)
    }

    /// 将 NDC 的 xy 从 [-1, 1] 映射到纹理坐标 [0, 1]（y 轴翻转）
    pub fn ndc_to_texture() -> Matrix4 {
        Matrix4::new(
            0.5, 0.0, 0.0, 0.5,
            0.0, -0.5, 0.0, 0.5,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    /// 仿射矩阵的逆
    ///
    /// 退化矩阵（缩放为 0）返回单位矩阵。
    pub fn affine_inverse(m: &Matrix4) -> Matrix4 {
        m.try_inverse().unwrap_or_else(Matrix4::identity)
    }

    /// 以列主序数组形式导出
    pub fn to_cols(m: &Matrix4) -> [[f32; 4]; 4] {
        (*m).into()
    }

    /// 转置后以列主序数组形式导出（即原矩阵的行主序）
    pub fn to_cols_transposed(m: &Matrix4) -> [[f32; 4]; 4] {
        m.transpose().into()
    }

    /// 取矩阵第 `index` 列的 xyz
    pub fn column3(m: &Matrix4, index: usize) -> Vector3 {
        m.fixed_view::<3, 1>(0, index).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trs_places_translation_in_column_three() {
        let t = Vector3::new(1.0, 2.0, 3.0);
        let m = matrix::trs(&t, &Quaternion::identity(), &Vector3::new(2.0, 2.0, 2.0));
        assert_relative_eq!(matrix::column3(&m, 3), t);
        assert_relative_eq!(m[(0, 0)], 2.0);
        assert_relative_eq!(m[(3, 3)], 1.0);
    }

    #[test]
    fn test_ndc_to_texture_maps_corners() {
        let m = matrix::ndc_to_texture();
        let top_left = m * Vector4::new(-1.0, 1.0, 0.5, 1.0);
        let bottom_right = m * Vector4::new(1.0, -1.0, 0.5, 1.0);
        assert_relative_eq!(top_left, Vector4::new(0.0, 0.0, 0.5, 1.0));
        assert_relative_eq!(bottom_right, Vector4::new(1.0, 1.0, 0.5, 1.0));
    }

    #[test]
    fn test_transposed_export() {
        let m = matrix::trs(
            &Vector3::new(4.0, 5.0, 6.0),
            &Quaternion::identity(),
            &Vector3::new(1.0, 1.0, 1.0),
        );
        let cols = matrix::to_cols(&m);
        let rows = matrix::to_cols_transposed(&m);
        assert_eq!(cols[3], [4.0, 5.0, 6.0, 1.0]);
        assert_eq!([rows[0][3], rows[1][3], rows[2][3]], [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_color_quantize() {
        assert_eq!(Color::WHITE.to_rgba8(), [255, 255, 255, 255]);
        assert_eq!(Color::LIGHT_STEEL_BLUE.to_rgba8(), [176, 196, 222, 255]);
    }
}
