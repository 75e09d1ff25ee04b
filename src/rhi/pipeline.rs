//! 管线状态模块
//!
//! [`PipelineState`] 创建后不可变：着色器阶段、输入布局、光栅化/深度模板固定功能状态
//! 以及渲染目标格式在构建时全部冻结，并绑定到进程内唯一的共享绑定布局
//! （[`RootSignature`]）。
//!
//! # 着色器加载
//!
//! 着色器以 HLSL 源文件提供，加载时要求入口函数存在，并记录目标 profile
//! （`vs_5_1` / `ps_5_1`）。文件缺失或入口缺失都是致命错误。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::types::{Format, PrimitiveTopology};
use crate::core::error::{GraphicsError, Result};

/// 输入槽位上限
pub const MAX_INPUT_SLOTS: u32 = 16;
/// 同时绑定的渲染目标上限
pub const MAX_RENDER_TARGETS: usize = 8;

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// 绑定布局中的一个参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootParameter {
    /// 根常量缓冲视图（寄存器 b#）
    ConstantBuffer { register: u32 },
    /// 着色资源描述符表（寄存器 t#）
    ShaderResourceTable { register: u32 },
}

/// 共享绑定布局
///
/// 槽位即参数下标：0 = 物体常量 (b0)，1 = 帧常量 (b1)，2 = 纹理表 (t0)。
/// 另带一个线性过滤的静态采样器 (s0)。
#[derive(Debug, PartialEq, Eq)]
pub struct RootSignature {
    parameters: Vec<RootParameter>,
    static_samplers: u32,
}

impl RootSignature {
    /// 物体常量缓冲槽位
    pub const OBJECT_CONSTANTS: u32 = 0;
    /// 帧常量缓冲槽位
    pub const FRAME_CONSTANTS: u32 = 1;
    /// 纹理槽位
    pub const TEXTURE: u32 = 2;

    /// 引擎使用的标准绑定布局
    pub fn standard() -> Arc<Self> {
        Arc::new(Self {
            parameters: vec![
                RootParameter::ConstantBuffer { register: 0 },
                RootParameter::ConstantBuffer { register: 1 },
                RootParameter::ShaderResourceTable { register: 0 },
            ],
            static_samplers: 1,
        })
    }

    pub fn parameter(&self, slot: u32) -> Option<RootParameter> {
        self.parameters.get(slot as usize).copied()
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn static_samplers(&self) -> u32 {
        self.static_samplers
    }
}

/// 着色器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    /// 编译目标 profile
    pub fn profile(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vs_5_1",
            ShaderStage::Pixel => "ps_5_1",
        }
    }
}

/// 着色器描述
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    /// 调试名称
    pub name: String,
    /// HLSL 文件路径（相对路径按设备的着色器目录解析）
    pub path: PathBuf,
    /// 入口函数
    pub entry: String,
}

impl ShaderDesc {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            entry: entry.into(),
        }
    }
}

/// 加载完成的着色器
#[derive(Debug, Clone)]
pub struct ShaderBytecode {
    pub name: String,
    pub stage: ShaderStage,
    pub profile: &'static str,
    pub entry: String,
    pub path: PathBuf,
    /// 源码字节数
    pub source_len: usize,
}

/// 加载并校验着色器
///
/// # 参数
///
/// * `desc` - 着色器描述
/// * `stage` - 阶段，决定 profile
/// * `shader_dir` - 相对路径的基准目录
pub fn compile_shader(desc: &ShaderDesc, stage: ShaderStage, shader_dir: &Path) -> Result<ShaderBytecode> {
    let path = if desc.path.is_absolute() {
        desc.path.clone()
    } else {
        shader_dir.join(&desc.path)
    };

    let source = std::fs::read_to_string(&path).map_err(|e| GraphicsError::ShaderCompilation {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    if !declares_function(&source, &desc.entry) {
        return Err(GraphicsError::ShaderCompilation {
            path,
            reason: format!("entry point '{}' not found for {}", desc.entry, stage.profile()),
        }
        .into());
    }

    debug!(shader = %desc.name, entry = %desc.entry, profile = stage.profile(), "Shader compiled");

    Ok(ShaderBytecode {
        name: desc.name.clone(),
        stage,
        profile: stage.profile(),
        entry: desc.entry.clone(),
        source_len: source.len(),
        path,
    })
}

/// 源码中是否有形如 `<type> <entry>(` 的函数定义
fn declares_function(source: &str, entry: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    source.lines().any(|line| {
        let line = line.split("//").next().unwrap_or("");
        line.match_indices(entry).any(|(at, _)| {
            let before = &line[..at];
            let after = line[at + entry.len()..].trim_start();
            let return_type = before.trim_end();
            after.starts_with('(')
                && before.ends_with(char::is_whitespace)
                && return_type.ends_with(is_ident)
        })
    })
}

/// 输入布局元素
#[derive(Debug, Clone, PartialEq)]
pub struct InputElementDesc {
    pub semantic: String,
    pub semantic_index: u32,
    pub format: Format,
    pub input_slot: u32,
    pub aligned_byte_offset: u32,
}

impl InputElementDesc {
    pub fn new(semantic: &str, format: Format, input_slot: u32, aligned_byte_offset: u32) -> Self {
        Self {
            semantic: semantic.to_string(),
            semantic_index: 0,
            format,
            input_slot,
            aligned_byte_offset,
        }
    }
}

/// 面剔除模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// 光栅化状态
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerDesc {
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_counter_clockwise: true,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
        }
    }
}

/// 深度比较函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonFunc {
    Less,
    LessEqual,
    Always,
}

/// 深度模板状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: ComparisonFunc,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            depth_func: ComparisonFunc::Less,
        }
    }
}

/// 管线状态描述
#[derive(Debug, Clone)]
pub struct PipelineStateDesc {
    pub name: String,
    pub vertex_shader: ShaderDesc,
    /// 仅深度的管线可以省略像素着色器
    pub pixel_shader: Option<ShaderDesc>,
    pub input_layout: Vec<InputElementDesc>,
    pub rasterizer: RasterizerDesc,
    pub depth_stencil: DepthStencilDesc,
    pub render_target_formats: Vec<Format>,
    /// `Format::Unknown` 表示不使用深度缓冲
    pub depth_stencil_format: Format,
    pub topology: PrimitiveTopology,
}

impl PipelineStateDesc {
    pub fn new(name: impl Into<String>, vertex_shader: ShaderDesc) -> Self {
        Self {
            name: name.into(),
            vertex_shader,
            pixel_shader: None,
            input_layout: Vec::new(),
            rasterizer: RasterizerDesc::default(),
            depth_stencil: DepthStencilDesc::default(),
            render_target_formats: Vec::new(),
            depth_stencil_format: Format::Unknown,
            topology: PrimitiveTopology::TriangleList,
        }
    }
}

/// 管线状态对象
#[derive(Debug)]
pub struct PipelineState {
    id: u64,
    desc: PipelineStateDesc,
    vertex_shader: ShaderBytecode,
    pixel_shader: Option<ShaderBytecode>,
    root_signature: Arc<RootSignature>,
    input_slot_count: u32,
}

impl PipelineState {
    /// 构建管线状态
    ///
    /// 任何着色器加载失败或布局/格式不合法都返回错误，不会生成部分可用的管线。
    pub fn new(desc: PipelineStateDesc, root_signature: Arc<RootSignature>, shader_dir: &Path) -> Result<Self> {
        let vertex_shader = compile_shader(&desc.vertex_shader, ShaderStage::Vertex, shader_dir)?;
        let pixel_shader = desc
            .pixel_shader
            .as_ref()
            .map(|ps| compile_shader(ps, ShaderStage::Pixel, shader_dir))
            .transpose()?;

        let mut input_slot_count = 0;
        for element in &desc.input_layout {
            if !matches!(element.format, Format::R32G32B32Float | Format::R32G32Float) {
                return Err(invalid_pipeline(&desc, format!(
                    "input element {} uses non-vertex format {}",
                    element.semantic,
                    element.format.name()
                )));
            }
            if element.input_slot >= MAX_INPUT_SLOTS {
                return Err(invalid_pipeline(&desc, format!(
                    "input element {} uses slot {}",
                    element.semantic, element.input_slot
                )));
            }
            input_slot_count = input_slot_count.max(element.input_slot + 1);
        }

        if desc.render_target_formats.len() > MAX_RENDER_TARGETS
            || desc.render_target_formats.iter().any(|f| !f.is_color())
        {
            return Err(invalid_pipeline(&desc, "invalid render target formats".to_string()));
        }
        if desc.depth_stencil_format != Format::Unknown && !desc.depth_stencil_format.is_depth() {
            return Err(invalid_pipeline(&desc, format!(
                "{} is not a depth format",
                desc.depth_stencil_format.name()
            )));
        }
        if desc.render_target_formats.is_empty() && desc.depth_stencil_format == Format::Unknown {
            return Err(invalid_pipeline(&desc, "pipeline writes no targets".to_string()));
        }

        info!(
            pipeline = %desc.name,
            inputs = desc.input_layout.len(),
            render_targets = desc.render_target_formats.len(),
            depth = desc.depth_stencil_format.name(),
            depth_bias = desc.rasterizer.depth_bias,
            "Pipeline state created"
        );

        Ok(Self {
            id: NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed),
            desc,
            vertex_shader,
            pixel_shader,
            root_signature,
            input_slot_count,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.desc.name
    }

    pub fn desc(&self) -> &PipelineStateDesc {
        &self.desc
    }

    pub fn vertex_shader(&self) -> &ShaderBytecode {
        &self.vertex_shader
    }

    pub fn pixel_shader(&self) -> Option<&ShaderBytecode> {
        self.pixel_shader.as_ref()
    }

    pub fn root_signature(&self) -> &Arc<RootSignature> {
        &self.root_signature
    }

    /// 绘制前需要绑定的顶点缓冲数
    pub fn input_slot_count(&self) -> u32 {
        self.input_slot_count
    }

    pub fn render_target_formats(&self) -> &[Format] {
        &self.desc.render_target_formats
    }

    pub fn depth_stencil_format(&self) -> Format {
        self.desc.depth_stencil_format
    }
}

fn invalid_pipeline(desc: &PipelineStateDesc, reason: String) -> crate::core::error::RenderError {
    GraphicsError::ResourceCreation(format!("pipeline '{}': {}", desc.name, reason)).into()
}
