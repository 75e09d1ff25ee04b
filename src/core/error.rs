//! 错误处理模块
//!
//! 定义了引擎中使用的统一错误类型，使用 `thiserror` 提供友好的错误消息。
//!
//! # 错误分类
//!
//! - **设备错误**（[`GraphicsError`]）：资源/管线创建、命令录制与执行失败，不可恢复
//! - **资源耗尽**：描述符堆容量在初始化时固定，耗尽即致命
//! - **数据契约违例**：缺少初始数据、不支持的索引宽度、未知的渲染通道名
//!
//! 渲染核心不提供可恢复的错误路径，所有错误都向上传递到驱动程序后终止进程。

use std::path::PathBuf;

use thiserror::Error;

use crate::rhi::types::ResourceState;

/// 引擎统一的 Result 类型
///
/// 所有可能返回错误的函数都应该使用这个类型。
pub type Result<T> = std::result::Result<T, RenderError>;

/// 渲染引擎的错误类型
#[derive(Debug, Error)]
pub enum RenderError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 图形设备错误
    #[error("Graphics error: {0}")]
    Graphics(#[from] GraphicsError),

    /// 资产/场景加载错误
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// 渲染通道错误
    #[error("Render pass error: {0}")]
    Pass(#[from] PassError),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 日志系统错误
    #[error("Log error: {0}")]
    Log(String),

    /// 初始化错误
    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// 配置相关的错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件未找到
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    /// 配置文件解析失败
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// 配置值无效
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 图形设备相关的错误
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// 设备创建失败
    #[error("Device creation failed: {0}")]
    DeviceCreation(String),

    /// 交换链错误
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// 着色器编译失败
    #[error("Shader compilation failed for {path}: {reason}")]
    ShaderCompilation { path: PathBuf, reason: String },

    /// 资源创建失败
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// 缺少不可变缓冲必需的初始数据
    #[error("Missing initial data for {0}")]
    MissingInitialData(String),

    /// 描述符堆耗尽
    #[error("Descriptor heap '{heap}' exhausted (capacity {capacity})")]
    DescriptorHeapExhausted { heap: String, capacity: u32 },

    /// 资源状态与访问方式不兼容
    #[error("Resource '{resource}' is in state {actual:?}, expected {expected}")]
    InvalidResourceState {
        resource: String,
        expected: String,
        actual: ResourceState,
    },

    /// 映射失败（非 CPU 可写的堆）
    #[error("Cannot map resource '{0}'")]
    MapFailed(String),

    /// 命令录制失败
    #[error("Command recording failed: {0}")]
    CommandRecording(String),

    /// GPU 端命令执行失败
    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    /// 不支持的格式
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// 资产与场景加载相关的错误
#[derive(Debug, Error)]
pub enum AssetError {
    /// 文件不存在
    #[error("Asset file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// 不支持的文件格式
    #[error("Unsupported asset format: {0}")]
    UnsupportedFormat(String),

    /// 解析失败
    #[error("Failed to parse asset: {0}")]
    ParseError(String),

    /// 场景结构无效
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// 几何数据无效
    #[error("Invalid geometry data: {0}")]
    InvalidGeometry(String),

    /// 外部库错误
    #[error("External library error: {0}")]
    ExternalLibraryError(String),
}

/// 渲染通道注册表相关的错误
#[derive(Debug, Error)]
pub enum PassError {
    /// 同名通道重复注册
    #[error("Render pass '{0}' is already registered")]
    Duplicate(String),

    /// 查找未知通道
    #[error("Unknown render pass '{0}'")]
    Unknown(String),

    /// 所需输入在本帧尚未由生产者通道发布
    #[error("Render pass '{consumer}' requires the output of '{producer}', which has not ended this frame")]
    MissingInput { consumer: String, producer: String },

    /// 渲染时没有设置当前场景
    #[error("No render scene is set")]
    NoScene,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: RenderError = GraphicsError::DescriptorHeapExhausted {
            heap: "RTV".to_string(),
            capacity: 4,
        }
        .into();
        assert!(matches!(err, RenderError::Graphics(_)));
        assert_eq!(
            err.to_string(),
            "Graphics error: Descriptor heap 'RTV' exhausted (capacity 4)"
        );
    }

    #[test]
    fn test_pass_error_message() {
        let err: RenderError = PassError::Unknown("Bloom".to_string()).into();
        assert_eq!(err.to_string(), "Render pass error: Unknown render pass 'Bloom'");
    }
}
