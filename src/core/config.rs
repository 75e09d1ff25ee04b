//! 配置管理模块
//!
//! 提供引擎配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//! title = "ForwardRender"
//!
//! [graphics]
//! back_buffer_format = "r8g8b8a8_unorm"
//! depth_format = "d24_unorm_s8_uint"
//! shadow_map_size = 2048
//! shader_dir = "shaders"
//!
//! [graphics.descriptors]
//! rtv_capacity = 16
//! dsv_capacity = 8
//! srv_capacity = 64
//!
//! [render]
//! frames = 3
//! recompute_view_each_frame = true
//!
//! [scene]
//! path = "assets/scene.toml"
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::{ConfigError, Result};
use crate::rhi::types::Format;

/// 引擎配置
///
/// 包含了引擎运行所需的所有配置项。
/// 可以从配置文件加载，也可以通过代码构建。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口（视口）配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 帧循环配置
    #[serde(default)]
    pub render: RenderConfig,

    /// 场景配置
    #[serde(default)]
    pub scene: SceneSettings,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
///
/// 引擎不创建操作系统窗口，这里的尺寸就是交换链与默认深度缓冲的尺寸。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 后台缓冲格式
    #[serde(default = "default_back_buffer_format")]
    pub back_buffer_format: Format,

    /// 深度缓冲格式
    #[serde(default = "default_depth_format")]
    pub depth_format: Format,

    /// 阴影贴图边长
    #[serde(default = "default_shadow_map_size")]
    pub shadow_map_size: u32,

    /// HLSL 着色器目录
    #[serde(default = "default_shader_dir")]
    pub shader_dir: PathBuf,

    /// 描述符堆容量
    #[serde(default)]
    pub descriptors: DescriptorCapacities,
}

/// 描述符堆容量（初始化后固定，不会增长）
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DescriptorCapacities {
    #[serde(default = "default_rtv_capacity")]
    pub rtv_capacity: u32,
    #[serde(default = "default_dsv_capacity")]
    pub dsv_capacity: u32,
    #[serde(default = "default_srv_capacity")]
    pub srv_capacity: u32,
}

/// 帧循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// 无窗口驱动运行的帧数
    #[serde(default = "default_frames")]
    pub frames: u32,

    /// 每帧重新计算视图/光源常量
    #[serde(default = "default_recompute_view")]
    pub recompute_view_each_frame: bool,

    /// 在第 N 帧之后执行一次窗口尺寸调整（宽, 高）
    #[serde(default)]
    pub resize_after: Option<ResizeStep>,

    /// 运行结束后将场景颜色目标保存为 PNG
    #[serde(default)]
    pub capture_path: Option<PathBuf>,
}

/// 一次计划中的尺寸调整
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResizeStep {
    pub frame: u32,
    pub width: u32,
    pub height: u32,
}

/// 场景文件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSettings {
    /// 场景描述文件路径
    #[serde(default = "default_scene_path")]
    pub path: PathBuf,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_title() -> String { "ForwardRender".to_string() }
fn default_back_buffer_format() -> Format { Format::R8G8B8A8Unorm }
fn default_depth_format() -> Format { Format::D24UnormS8Uint }
fn default_shadow_map_size() -> u32 { 2048 }
fn default_shader_dir() -> PathBuf { PathBuf::from("shaders") }
fn default_rtv_capacity() -> u32 { 16 }
fn default_dsv_capacity() -> u32 { 8 }
fn default_srv_capacity() -> u32 { 64 }
fn default_frames() -> u32 { 3 }
fn default_recompute_view() -> bool { true }
fn default_scene_path() -> PathBuf { PathBuf::from("assets/scene.toml") }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "forward_render.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            back_buffer_format: default_back_buffer_format(),
            depth_format: default_depth_format(),
            shadow_map_size: default_shadow_map_size(),
            shader_dir: default_shader_dir(),
            descriptors: DescriptorCapacities::default(),
        }
    }
}

impl Default for DescriptorCapacities {
    fn default() -> Self {
        Self {
            rtv_capacity: default_rtv_capacity(),
            dsv_capacity: default_dsv_capacity(),
            srv_capacity: default_srv_capacity(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            recompute_view_each_frame: default_recompute_view(),
            resize_after: None,
            capture_path: None,
        }
    }
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self { path: default_scene_path() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 成功返回 `Config` 实例，失败返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 文本解析配置
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// # 说明
    ///
    /// 支持的参数：
    /// - `--width <value>` / `--height <value>`: 视口尺寸
    /// - `--frames <value>`: 运行帧数
    /// - `--scene <path>`: 场景描述文件
    /// - `--capture <path>`: 结束时保存场景颜色目标
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        let value_of = |flag: &str| -> Option<&String> {
            args.iter()
                .position(|a| a == flag)
                .and_then(|idx| args.get(idx + 1))
        };

        if let Some(width) = value_of("--width").and_then(|v| v.parse().ok()) {
            self.window.width = width;
        }
        if let Some(height) = value_of("--height").and_then(|v| v.parse().ok()) {
            self.window.height = height;
        }
        if let Some(frames) = value_of("--frames").and_then(|v| v.parse().ok()) {
            self.render.frames = frames;
        }
        if let Some(scene) = value_of("--scene") {
            self.scene.path = PathBuf::from(scene);
        }
        if let Some(capture) = value_of("--capture") {
            self.render.capture_path = Some(PathBuf::from(capture));
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(invalid("window.width/height", "Window dimensions must be greater than 0"));
        }

        let size = self.graphics.shadow_map_size;
        if size == 0 || !size.is_power_of_two() {
            return Err(invalid(
                "graphics.shadow_map_size",
                "Shadow map size must be a non-zero power of two",
            ));
        }

        if !self.graphics.back_buffer_format.is_color() {
            return Err(invalid("graphics.back_buffer_format", "Back buffer must use a color format"));
        }
        if !self.graphics.depth_format.is_depth() {
            return Err(invalid("graphics.depth_format", "Depth buffer must use a depth format"));
        }

        let heaps = &self.graphics.descriptors;
        if heaps.rtv_capacity == 0 || heaps.dsv_capacity == 0 || heaps.srv_capacity == 0 {
            return Err(invalid(
                "graphics.descriptors",
                "Descriptor heap capacities must be greater than 0",
            ));
        }

        if let Some(step) = self.render.resize_after {
            if step.width == 0 || step.height == 0 {
                return Err(invalid("render.resize_after", "Resize dimensions must be greater than 0"));
            }
        }

        Ok(())
    }

    /// 窗口宽高比
    pub fn aspect_ratio(&self) -> f32 {
        self.window.width as f32 / self.window.height as f32
    }
}

fn invalid(field: &str, reason: &str) -> super::error::RenderError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.back_buffer_format, Format::R8G8B8A8Unorm);
        assert_eq!(config.graphics.depth_format, Format::D24UnormS8Uint);
        assert!(config.render.recompute_view_each_frame);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.shadow_map_size = 1000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.depth_format = Format::R8G8B8A8Unorm;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [window]
            width = 640

            [graphics]
            shadow_map_size = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.shadow_map_size, 512);
        assert_eq!(config.graphics.descriptors.srv_capacity, 64);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "forward_render", "--width", "320", "--height", "200", "--frames", "7", "--scene",
            "demo.toml",
        ]);
        assert_eq!(config.window.width, 320);
        assert_eq!(config.window.height, 200);
        assert_eq!(config.render.frames, 7);
        assert_eq!(config.scene.path, PathBuf::from("demo.toml"));
        assert!(config.render.capture_path.is_none());
    }
}
