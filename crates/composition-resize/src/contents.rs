use bytemuck::Pod;
use bytemuck::Zeroable;

use crate::error::ContentError;

pub type ContentResult<T> = core::result::Result<T, ContentError>;

/// Vertex layout shared with the HLSL input signature: POSITION then
/// COLOR, tightly packed.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct RgbaVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

/// Pluggable geometry and shader source. Invoked once per resize cycle so
/// the provider can regenerate layout-dependent vertex data.
pub trait GraphicContents {
    fn update_layout(&mut self, width: u32, height: u32);
    fn vertices(&mut self) -> ContentResult<Vec<RgbaVertex>>;
    fn shader_source(&mut self) -> ContentResult<String>;
}

/// Default provider: one aspect-corrected RGB triangle centered in clip
/// space.
pub struct TriangleContents {
    width: u32,
    height: u32,
}

impl TriangleContents {
    pub fn new() -> Self {
        Self {
            width: 1,
            height: 1,
        }
    }

    fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl Default for TriangleContents {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicContents for TriangleContents {
    fn update_layout(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    fn vertices(&mut self) -> ContentResult<Vec<RgbaVertex>> {
        let aspect_ratio = self.aspect_ratio();
        Ok(vec![
            RgbaVertex {
                position: [0.0, 0.25 * aspect_ratio, 0.0],
                color: [1.0, 0.0, 0.0, 1.0],
            },
            RgbaVertex {
                position: [0.25, -0.25 * aspect_ratio, 0.0],
                color: [0.0, 1.0, 0.0, 1.0],
            },
            RgbaVertex {
                position: [-0.25, -0.25 * aspect_ratio, 0.0],
                color: [0.0, 0.0, 1.0, 1.0],
            },
        ])
    }

    fn shader_source(&mut self) -> ContentResult<String> {
        Ok(TRIANGLE_SHADER.to_string())
    }
}

const TRIANGLE_SHADER: &str = r#"
struct PSInput
{
    float4 position : SV_POSITION;
    float4 color    : COLOR;
};

PSInput VSMain(float4 position : POSITION, float4 color : COLOR)
{
    PSInput result;
    result.position = position;
    result.color = color;
    return result;
}

float4 PSMain(PSInput input) : SV_TARGET
{
    return input.color;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<RgbaVertex>(), 28);
    }

    #[test]
    fn triangle_has_three_vertices_for_any_layout() {
        let mut contents = TriangleContents::new();
        contents.update_layout(800, 600);
        assert_eq!(contents.vertices().unwrap().len(), 3);
    }

    #[test]
    fn unchanged_layout_yields_identical_vertices() {
        let mut contents = TriangleContents::new();
        contents.update_layout(1280, 720);
        let first = contents.vertices().unwrap();
        let second = contents.vertices().unwrap();
        assert_eq!(first, second);
        assert_eq!(bytemuck::cast_slice::<_, u8>(&first).len(), 3 * 28);
    }

    #[test]
    fn layout_changes_reshape_the_triangle() {
        let mut contents = TriangleContents::new();
        contents.update_layout(800, 600);
        let landscape = contents.vertices().unwrap();
        contents.update_layout(600, 800);
        let portrait = contents.vertices().unwrap();
        assert_ne!(landscape, portrait);
    }

    #[test]
    fn degenerate_layout_does_not_divide_by_zero() {
        let mut contents = TriangleContents::new();
        contents.update_layout(0, 0);
        for vertex in contents.vertices().unwrap() {
            assert!(vertex.position.iter().all(|value| value.is_finite()));
        }
    }

    #[test]
    fn shader_source_contains_both_entry_points() {
        let mut contents = TriangleContents::new();
        let source = contents.shader_source().unwrap();
        assert!(source.contains("VSMain"));
        assert!(source.contains("PSMain"));
    }
}
