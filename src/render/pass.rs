//! 渲染通道
//!
//! 每个通道按 Begin → Render → End 的顺序每帧执行一次：
//! - `begin` 声明并绑定目标（状态转换由设备的 `begin_pass` 录制）
//! - `render` 绑定管线、常量与几何并发出绘制
//! - `end` 把目标转回着色器可读状态
//!
//! 通道在 `end` 之后才向 [`PassOutputs`] 发布输出纹理，
//! 消费者在生产者结束前读取输入会得到 [`PassError::MissingInput`]。

use std::collections::HashMap;

use tracing::{debug, info};

use super::scene::RenderScene;
use crate::core::error::{PassError, Result};
use crate::rhi::{DeviceContext, Texture2D};

/// 本帧已结束的通道发布的输出
#[derive(Debug, Default)]
pub struct PassOutputs {
    outputs: HashMap<String, Texture2D>,
}

impl PassOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发布通道输出
    pub fn publish(&mut self, producer: &str, texture: Texture2D) {
        self.outputs.insert(producer.to_string(), texture);
    }

    /// 读取生产者通道的输出
    pub fn input(&self, consumer: &str, producer: &str) -> Result<&Texture2D> {
        self.outputs.get(producer).ok_or_else(|| {
            PassError::MissingInput {
                consumer: consumer.to_string(),
                producer: producer.to_string(),
            }
            .into()
        })
    }

    pub fn contains(&self, producer: &str) -> bool {
        self.outputs.contains_key(producer)
    }

    /// 新的一帧开始时清空
    pub fn clear(&mut self) {
        self.outputs.clear();
    }
}

/// 通道执行时可用的上下文
pub struct PassContext<'a> {
    pub device: &'a mut DeviceContext,
    pub scene: &'a RenderScene,
    pub inputs: &'a PassOutputs,
}

/// 渲染通道接口
pub trait RenderPass {
    /// 注册名，同时用作事件名
    fn name(&self) -> &str;

    fn begin(&mut self, ctx: &mut PassContext<'_>) -> Result<()>;

    fn render(&mut self, ctx: &mut PassContext<'_>) -> Result<()>;

    fn end(&mut self, ctx: &mut PassContext<'_>) -> Result<()>;

    /// 输出尺寸变化（设备已完成冲刷）
    fn resize(&mut self, _device: &mut DeviceContext, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    /// `end` 之后发布给后续通道的纹理
    fn output(&self) -> Option<Texture2D> {
        None
    }
}

/// 通道注册表
///
/// 按注册顺序执行，名称唯一。
#[derive(Default)]
pub struct PassRegistry {
    passes: Vec<Box<dyn RenderPass>>,
}

impl PassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册通道，追加到执行顺序末尾
    pub fn create(&mut self, pass: Box<dyn RenderPass>) -> Result<()> {
        if self.passes.iter().any(|p| p.name() == pass.name()) {
            return Err(PassError::Duplicate(pass.name().to_string()).into());
        }
        debug!(pass = pass.name(), order = self.passes.len(), "Render pass registered");
        self.passes.push(pass);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&dyn RenderPass> {
        self.passes
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
            .ok_or_else(|| PassError::Unknown(name.to_string()).into())
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut (dyn RenderPass + 'static)> {
        match self.passes.iter_mut().find(|p| p.name() == name) {
            Some(pass) => Ok(pass.as_mut()),
            None => Err(PassError::Unknown(name.to_string()).into()),
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn RenderPass>> {
        self.passes.iter_mut()
    }

    /// 执行顺序中的通道名
    pub fn names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// 释放全部通道，先冲刷设备
    pub fn release_all(&mut self, device: &mut DeviceContext) -> Result<()> {
        device.flush_rendering_commands()?;
        if !self.passes.is_empty() {
            info!(passes = self.passes.len(), "Releasing render passes");
        }
        self.passes.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::RenderError;
    use crate::core::Config;
    use crate::rhi::{DeviceDesc, Format, TextureDesc};

    struct NamedPass(&'static str);

    impl RenderPass for NamedPass {
        fn name(&self) -> &str {
            self.0
        }

        fn begin(&mut self, _ctx: &mut PassContext<'_>) -> Result<()> {
            Ok(())
        }

        fn render(&mut self, _ctx: &mut PassContext<'_>) -> Result<()> {
            Ok(())
        }

        fn end(&mut self, _ctx: &mut PassContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registry_order_and_lookup() {
        let mut registry = PassRegistry::new();
        registry.create(Box::new(NamedPass("ShadowPass"))).unwrap();
        registry.create(Box::new(NamedPass("BasePass"))).unwrap();
        assert_eq!(registry.names(), vec!["ShadowPass", "BasePass"]);
        assert_eq!(registry.get("BasePass").unwrap().name(), "BasePass");
        assert!(registry.get_mut("ShadowPass").is_ok());
    }

    #[test]
    fn test_duplicate_and_unknown_names() {
        let mut registry = PassRegistry::new();
        registry.create(Box::new(NamedPass("BasePass"))).unwrap();
        assert!(matches!(
            registry.create(Box::new(NamedPass("BasePass"))),
            Err(RenderError::Pass(PassError::Duplicate(_)))
        ));
        assert!(matches!(
            registry.get("Bloom"),
            Err(RenderError::Pass(PassError::Unknown(name))) if name == "Bloom"
        ));
    }

    #[test]
    fn test_release_all_flushes_and_empties() {
        let mut config = Config::default();
        config.window.width = 4;
        config.window.height = 4;
        let mut device = DeviceContext::init(DeviceDesc::from(&config)).unwrap();
        let mut registry = PassRegistry::new();
        registry.create(Box::new(NamedPass("ShadowPass"))).unwrap();
        registry.release_all(&mut device).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_input_names_both_passes() {
        let mut config = Config::default();
        config.window.width = 4;
        config.window.height = 4;
        let mut device = DeviceContext::init(DeviceDesc::from(&config)).unwrap();
        let mut outputs = PassOutputs::new();
        match outputs.input("BasePass", "ShadowPass") {
            Err(RenderError::Pass(PassError::MissingInput { consumer, producer })) => {
                assert_eq!((consumer.as_str(), producer.as_str()), ("BasePass", "ShadowPass"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let texture = device
            .create_texture_2d(&TextureDesc::new("Shadow", 2, 2, Format::R8G8B8A8Unorm), None)
            .unwrap();
        outputs.publish("ShadowPass", texture);
        assert!(outputs.input("BasePass", "ShadowPass").is_ok());
        outputs.clear();
        assert!(!outputs.contains("ShadowPass"));
    }
}
