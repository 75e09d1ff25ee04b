/// Build script for forward_render
///
/// # Shader Strategy:
/// - HLSL sources under `shaders/` are loaded and validated at pipeline creation time,
///   so the build only needs to track them as rebuild triggers.
fn main() {
    // Trigger rebuild if shader files change
    println!("cargo:rerun-if-changed=shaders/ShadowPass.hlsl");
    println!("cargo:rerun-if-changed=shaders/BasePass.hlsl");
    println!("cargo:rerun-if-changed=shaders/PostProcess.hlsl");
}
