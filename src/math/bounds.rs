//! 包围体
//!
//! 轴对齐包围盒加包围球。包围球半径取包围盒最大边长的一半。

use super::{Matrix4, Point3, Vector3};

/// 轴对齐包围盒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3,
    pub max: Vector3,
}

impl BoundingBox {
    /// 空包围盒，与任何包围盒合并都得到对方
    pub fn empty() -> Self {
        Self {
            min: Vector3::repeat(f32::MAX),
            max: Vector3::repeat(f32::MIN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn center(&self) -> Vector3 {
        self.min + self.extent() / 2.0
    }

    pub fn extent(&self) -> Vector3 {
        self.max - self.min
    }

    /// 合并另一个包围盒
    pub fn merge(&mut self, other: &BoundingBox) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// 变换后的包围盒（变换 8 个角点再取极值）
    pub fn transformed(&self, m: &Matrix4) -> BoundingBox {
        if self.is_empty() {
            return *self;
        }
        let mut out = BoundingBox::empty();
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = m.transform_point(&corner).coords;
            out.min = out.min.inf(&p);
            out.max = out.max.sup(&p);
        }
        out
    }
}

/// 包围球
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3,
    pub radius: f32,
}

/// 包围盒与包围球
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub bbox: BoundingBox,
    pub sphere: BoundingSphere,
}

impl Bounds {
    pub fn new(min: Vector3, max: Vector3) -> Self {
        Self::from_box(BoundingBox { min, max })
    }

    pub fn from_box(bbox: BoundingBox) -> Self {
        let extent = bbox.extent();
        Self {
            bbox,
            sphere: BoundingSphere {
                center: bbox.center(),
                radius: extent.x.max(extent.y).max(extent.z) / 2.0,
            },
        }
    }

    pub fn center(&self) -> Vector3 {
        self.bbox.center()
    }

    pub fn extent(&self) -> Vector3 {
        self.bbox.extent()
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(Vector3::zeros(), Vector3::zeros())
    }
}
