//! 调试截图
//!
//! 经设备的读回路径取出颜色目标的像素，用 `image` 写成 PNG。

use std::path::Path;

use image::RgbaImage;
use tracing::info;

use crate::core::error::{AssetError, GraphicsError, Result};
use crate::rhi::{DeviceContext, Format, Texture2D};

/// 读回 RGBA8 纹理
pub fn read_rgba8(device: &mut DeviceContext, texture: &Texture2D) -> Result<RgbaImage> {
    if texture.format() != Format::R8G8B8A8Unorm {
        return Err(GraphicsError::UnsupportedFormat(format!(
            "cannot capture {} as RGBA8",
            texture.format().name()
        ))
        .into());
    }
    let pixels = device.read_back(texture.resource())?;
    RgbaImage::from_raw(texture.width(), texture.height(), pixels).ok_or_else(|| {
        GraphicsError::MapFailed(format!("{} returned a short readback", texture.resource().name())).into()
    })
}

/// 把颜色目标保存为 PNG
pub fn save_png<P: AsRef<Path>>(device: &mut DeviceContext, texture: &Texture2D, path: P) -> Result<()> {
    let path = path.as_ref();
    let image = read_rgba8(device, texture)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    image
        .save(path)
        .map_err(|e| AssetError::ExternalLibraryError(format!("{}: {}", path.display(), e)))?;
    info!(path = %path.display(), width = image.width(), height = image.height(), "Capture saved");
    Ok(())
}
