//! 渲染层
//!
//! 建立在 RHI 之上：渲染场景与图元、三个渲染通道以及帧驱动。
//!
//! # 模块组织
//!
//! - `mesh_render_data`：网格的 GPU 缓冲
//! - `scene`：渲染场景、渲染图元和常量布局
//! - `pass`：通道接口、注册表与通道输出
//! - `shadow_pass` / `base_pass` / `post_process_pass`：具体通道
//! - `renderer`：帧驱动
//! - `capture`：调试截图

pub mod base_pass;
pub mod capture;
pub mod mesh_render_data;
pub mod pass;
pub mod post_process_pass;
pub mod renderer;
pub mod scene;
pub mod shadow_pass;

pub use base_pass::{BasePass, BASE_PASS};
pub use mesh_render_data::MeshRenderData;
pub use pass::{PassContext, PassOutputs, PassRegistry, RenderPass};
pub use post_process_pass::{PostProcessPass, POST_PROCESS_PASS};
pub use renderer::Renderer;
pub use scene::{PrimitiveConstants, RenderPrimitive, RenderScene, ViewConstants};
pub use shadow_pass::{ShadowPass, SHADOW_PASS};
