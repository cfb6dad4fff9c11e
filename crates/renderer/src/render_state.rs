//! Fixed-function state for a draw call.
//!
//! Every struct here is plain data with a `Default` that matches a freshly
//! created GL context, and every field is optional in JSON thanks to
//! `#[serde(default)]`, so scene files only spell out what they change.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use refrast_core::logging::{log, LogCategory, LogLevel};

use crate::RenderError;

/// Which side owns pixel centers that fall exactly on a vertical edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HorizontalFill {
    #[default]
    Left,
    Right,
}

/// Which side owns pixel centers that fall exactly on a horizontal edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerticalFill {
    Top,
    #[default]
    Bottom,
}

/// Vertex order of front-facing triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Winding {
    #[default]
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProvokingVertex {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TestFunc {
    Never,
    #[default]
    Always,
    Less,
    Lequal,
    Greater,
    Gequal,
    Equal,
    Notequal,
}

impl TestFunc {
    /// `a FUNC b`.
    pub fn compare<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            TestFunc::Never => false,
            TestFunc::Always => true,
            TestFunc::Less => a < b,
            TestFunc::Lequal => a <= b,
            TestFunc::Greater => a > b,
            TestFunc::Gequal => a >= b,
            TestFunc::Equal => a == b,
            TestFunc::Notequal => a != b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    Incr,
    Decr,
    Invert,
    IncrWrap,
    DecrWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Source color is written as is.
    #[default]
    None,
    /// Factor / equation blending.
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendFunc {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

/// Facing of the primitive a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FaceType {
    #[default]
    Front,
    Back,
}

impl FaceType {
    pub fn index(self) -> usize {
        match self {
            FaceType::Front => 0,
            FaceType::Back => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizationState {
    pub winding: Winding,
    pub horizontal_fill: HorizontalFill,
    pub vertical_fill: VerticalFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StencilState {
    pub func: TestFunc,
    pub reference: i32,
    pub comp_mask: u32,
    pub s_fail: StencilOp,
    pub dp_fail: StencilOp,
    pub dp_pass: StencilOp,
    pub write_mask: u32,
}

impl Default for StencilState {
    fn default() -> Self {
        Self {
            func: TestFunc::Always,
            reference: 0,
            comp_mask: !0,
            s_fail: StencilOp::Keep,
            dp_fail: StencilOp::Keep,
            dp_pass: StencilOp::Keep,
            write_mask: !0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendState {
    pub equation: BlendEquation,
    pub src_func: BlendFunc,
    pub dst_func: BlendFunc,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            equation: BlendEquation::Add,
            src_func: BlendFunc::One,
            dst_func: BlendFunc::Zero,
        }
    }
}

/// Rectangle in window coordinates, origin at the bottom left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowRectangle {
    pub left: i32,
    pub bottom: i32,
    pub width: i32,
    pub height: i32,
}

impl WindowRectangle {
    pub fn new(left: i32, bottom: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            bottom,
            width,
            height,
        }
    }

    /// Half-open containment test.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left
            && x < self.left + self.width
            && y >= self.bottom
            && y < self.bottom + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentOperationState {
    pub scissor_test_enabled: bool,
    pub scissor_rectangle: WindowRectangle,

    pub stencil_test_enabled: bool,
    /// Indexed by [`FaceType::index`].
    pub stencil_states: [StencilState; 2],

    pub depth_test_enabled: bool,
    pub depth_func: TestFunc,
    pub depth_mask: bool,

    pub blend_mode: BlendMode,
    pub blend_rgb_state: BlendState,
    pub blend_a_state: BlendState,
    pub blend_color: [f32; 4],

    pub color_mask: [bool; 4],

    pub num_stencil_bits: u32,

    pub polygon_offset_enabled: bool,
    pub polygon_offset_factor: f32,
    pub polygon_offset_units: f32,

    pub depth_clamp_enabled: bool,
}

impl Default for FragmentOperationState {
    fn default() -> Self {
        Self {
            scissor_test_enabled: false,
            scissor_rectangle: WindowRectangle::new(0, 0, 1, 1),
            stencil_test_enabled: false,
            stencil_states: [StencilState::default(); 2],
            depth_test_enabled: false,
            depth_func: TestFunc::Less,
            depth_mask: true,
            blend_mode: BlendMode::None,
            blend_rgb_state: BlendState::default(),
            blend_a_state: BlendState::default(),
            blend_color: [0.0; 4],
            color_mask: [true; 4],
            num_stencil_bits: 8,
            polygon_offset_enabled: false,
            polygon_offset_factor: 0.0,
            polygon_offset_units: 0.0,
            depth_clamp_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointState {
    pub point_size: f32,
}

impl Default for PointState {
    fn default() -> Self {
        Self { point_size: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineState {
    pub line_width: f32,
}

impl Default for LineState {
    fn default() -> Self {
        Self { line_width: 1.0 }
    }
}

/// Viewport rectangle and depth range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportState {
    pub rect: WindowRectangle,
    pub zn: f32,
    pub zf: f32,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            rect: WindowRectangle::default(),
            zn: 0.0,
            zf: 1.0,
        }
    }
}

impl ViewportState {
    /// Full-target viewport with the default depth range.
    pub fn from_size(width: usize, height: usize) -> Self {
        Self {
            rect: WindowRectangle::new(0, 0, width as i32, height as i32),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartState {
    pub enabled: bool,
    pub restart_index: u32,
}

impl Default for RestartState {
    fn default() -> Self {
        Self {
            enabled: false,
            restart_index: u32::MAX,
        }
    }
}

/// Complete state of one draw call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderState {
    pub cull_mode: CullMode,
    pub provoking_vertex_convention: ProvokingVertex,
    pub viewport: ViewportState,
    pub rasterization: RasterizationState,
    pub frag_ops: FragmentOperationState,
    pub point: PointState,
    pub line: LineState,
    pub restart: RestartState,
}

impl RenderState {
    pub fn new(viewport: ViewportState) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, RenderError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, RenderError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a state file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RenderError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Load a state file, falling back to defaults on error
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(state) => state,
            Err(e) => {
                log(LogCategory::Fragment, LogLevel::Warn, || {
                    format!(
                        "Failed to load render state {}: {}. Using defaults.",
                        path.display(),
                        e
                    )
                });
                Self::default()
            }
        }
    }

    /// Save the state as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RenderError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = RenderState::default();
        assert_eq!(state.cull_mode, CullMode::None);
        assert_eq!(state.provoking_vertex_convention, ProvokingVertex::Last);
        assert_eq!(state.frag_ops.depth_func, TestFunc::Less);
        assert!(state.frag_ops.depth_mask);
        assert_eq!(state.frag_ops.num_stencil_bits, 8);
        assert_eq!(state.frag_ops.stencil_states[0].comp_mask, u32::MAX);
        assert_eq!(state.frag_ops.blend_rgb_state.src_func, BlendFunc::One);
        assert_eq!(state.viewport.zf, 1.0);
        assert_eq!(state.rasterization.horizontal_fill, HorizontalFill::Left);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "cull_mode": "Back",
            "frag_ops": { "depth_test_enabled": true, "blend_mode": "Standard" },
            "viewport": { "rect": { "width": 64, "height": 32 } }
        }"#;
        let state = RenderState::from_json_str(json).unwrap();
        assert_eq!(state.cull_mode, CullMode::Back);
        assert!(state.frag_ops.depth_test_enabled);
        assert_eq!(state.frag_ops.depth_func, TestFunc::Less);
        assert_eq!(state.frag_ops.blend_mode, BlendMode::Standard);
        assert_eq!(state.viewport.rect, WindowRectangle::new(0, 0, 64, 32));
        assert_eq!(state.viewport.zf, 1.0);
    }

    #[test]
    fn test_json_round_trip() {
        let mut state = RenderState::new(ViewportState::from_size(16, 8));
        state.frag_ops.stencil_states[1].dp_pass = StencilOp::IncrWrap;
        state.frag_ops.blend_a_state.dst_func = BlendFunc::OneMinusSrcAlpha;
        let json = state.to_json_string().unwrap();
        assert_eq!(RenderState::from_json_str(&json).unwrap(), state);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(
            RenderState::from_json_str(r#"{ "cull_mode": "Sideways" }"#),
            Err(RenderError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let state = RenderState::load_or_default("/nonexistent/refrast/state.json");
        assert_eq!(state, RenderState::default());
    }

    #[test]
    fn test_test_func_compare() {
        assert!(TestFunc::Less.compare(1, 2));
        assert!(!TestFunc::Less.compare(2, 2));
        assert!(TestFunc::Gequal.compare(0.5, 0.5));
        assert!(TestFunc::Notequal.compare(1u32, 2u32));
        assert!(!TestFunc::Never.compare(0, 0));
    }

    #[test]
    fn test_window_rectangle_contains() {
        let rect = WindowRectangle::new(2, 3, 4, 5);
        assert!(rect.contains(2, 3));
        assert!(rect.contains(5, 7));
        assert!(!rect.contains(6, 7));
        assert!(!rect.contains(5, 8));
    }
}
