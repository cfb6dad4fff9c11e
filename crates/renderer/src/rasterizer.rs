//! Triangle, line and point rasterization into 2x2 fragment packets.
//!
//! # Architecture
//!
//! ```text
//! window coords -> setup (edges / bounds / face) -> packet walk
//!                                                    |
//!                 per sample: Coverage::sample_depth  v
//!                 per pixel:  Coverage::barycentric -> FragmentPacket + depths
//!                             (perspective and screen-linear weights)
//! ```
//!
//! Triangles use exact fixed-point edge functions with [`SUBPIXEL_BITS`]
//! fractional bits so that shared edges are owned by exactly one of the two
//! triangles. Lines and points test sample positions in floating point.
//!
//! Window coordinates grow downward: row 0 of a buffer holds the top of the
//! render target.

use refrast_core::error::CoreError;
use refrast_core::logging::{log, LogCategory, LogLevel};
use refrast_core::types::Vec4;

use crate::render_state::{FaceType, HorizontalFill, RasterizationState, VerticalFill, ViewportState, Winding};
use crate::shaders::FragmentPacket;
use crate::Result;

pub const SUBPIXEL_BITS: u32 = 8;
pub const MAX_SAMPLES_PER_FRAGMENT: usize = 16;

const SUBPIXEL_SCALE: i64 = 1 << SUBPIXEL_BITS;
const HALF_PIXEL: i64 = SUBPIXEL_SCALE / 2;
/// Vertex coordinates are clamped to this many pixels around the origin so
/// edge function products stay within `i64`.
const GUARD_BAND: f32 = (1 << 20) as f32;

const SAMPLES_1: [[i8; 2]; 1] = [[0, 0]];
const SAMPLES_2: [[i8; 2]; 2] = [[4, 4], [-4, -4]];
const SAMPLES_4: [[i8; 2]; 4] = [[-2, -6], [6, -2], [-6, 2], [2, 6]];
const SAMPLES_8: [[i8; 2]; 8] = [
    [1, -3],
    [-1, 3],
    [5, 1],
    [-3, -5],
    [-5, 5],
    [-7, -1],
    [3, 7],
    [7, -7],
];
const SAMPLES_16: [[i8; 2]; 16] = [
    [1, 1],
    [-1, -3],
    [-3, 2],
    [4, -1],
    [-5, -2],
    [2, 5],
    [5, 3],
    [3, -5],
    [-2, 6],
    [0, -7],
    [-4, -6],
    [-6, 4],
    [-8, 0],
    [7, -4],
    [6, 7],
    [-7, -8],
];

/// Standard sample pattern in 1/16 pixel units relative to the pixel center.
pub fn sample_pattern(num_samples: usize) -> Result<&'static [[i8; 2]]> {
    match num_samples {
        1 => Ok(&SAMPLES_1),
        2 => Ok(&SAMPLES_2),
        4 => Ok(&SAMPLES_4),
        8 => Ok(&SAMPLES_8),
        16 => Ok(&SAMPLES_16),
        n => Err(CoreError::UnsupportedSampleCount(n).into()),
    }
}

/// Sample positions in subpixel units relative to the pixel corner.
fn sample_positions(num_samples: usize) -> Result<Vec<[i64; 2]>> {
    Ok(sample_pattern(num_samples)?
        .iter()
        .map(|&[x, y]| [HALF_PIXEL + x as i64 * 16, HALF_PIXEL + y as i64 * 16])
        .collect())
}

/// Closed-form barycentric coordinates of `p` in the triangle `v1 v2 v3`.
/// Degenerate triangles yield non-finite weights.
pub fn barycentric_coefficients(p: [f32; 2], v1: [f32; 2], v2: [f32; 2], v3: [f32; 2]) -> [f32; 3] {
    let [x, y] = p;
    let [x1, y1] = v1;
    let [x2, y2] = v2;
    let [x3, y3] = v3;

    let det = (y2 - y3) * (x1 - x3) + (x3 - x2) * (y1 - y3);
    let b0 = ((y2 - y3) * (x - x3) + (x3 - x2) * (y - y3)) / det;
    let b1 = ((y3 - y1) * (x - x3) + (x1 - x3) * (y - y3)) / det;
    [b0, b1, 1.0 - b0 - b1]
}

fn to_subpixel(v: f32) -> i64 {
    (v.clamp(-GUARD_BAND, GUARD_BAND) as f64 * SUBPIXEL_SCALE as f64).round() as i64
}

fn floor_to_pixel(v: i64) -> i32 {
    v.div_euclid(SUBPIXEL_SCALE) as i32
}

/// Inclusive pixel bounds of a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelBounds {
    x0: i32,
    y0: i32,
    x1: i32,
    y1: i32,
}

impl PixelBounds {
    fn is_empty(&self) -> bool {
        self.x0 > self.x1 || self.y0 > self.y1
    }

    fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }
}

/// Pixels a draw may touch: the viewport intersected with the render target,
/// half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterRegion {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl RasterRegion {
    pub fn new(viewport: &ViewportState, target_width: usize, target_height: usize) -> Self {
        let rect = viewport.rect;
        let target_height = target_height as i32;
        // Rows are flipped around the target, so the viewport's bottom edge
        // lands on row `target_height - bottom`.
        Self {
            x0: rect.left.max(0),
            y0: (target_height - rect.bottom - rect.height).max(0),
            x1: (rect.left + rect.width).min(target_width as i32),
            y1: (target_height - rect.bottom).min(target_height),
        }
    }

    fn clamp(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> PixelBounds {
        PixelBounds {
            x0: x0.max(self.x0),
            y0: y0.max(self.y0),
            x1: x1.min(self.x1 - 1),
            y1: y1.min(self.y1 - 1),
        }
    }
}

/// Per-primitive coverage used by the packet walk.
trait Coverage {
    /// Depth at a covered sample, `None` when the sample is outside.
    fn sample_depth(&self, sx: i64, sy: i64) -> Option<f32>;

    /// Vertex weights at a pixel center: perspective corrected, then
    /// linear in window space.
    fn barycentric(&self, cx: i64, cy: i64) -> ([f32; 3], [f32; 3]);
}

fn rasterize_bounds<C: Coverage>(
    coverage: &C,
    bounds: PixelBounds,
    samples: &[[i64; 2]],
    packets: &mut Vec<FragmentPacket>,
    depths: &mut Vec<f32>,
) {
    if bounds.is_empty() {
        return;
    }
    let num_samples = samples.len();
    let start_x = bounds.x0 & !1;
    let start_y = bounds.y0 & !1;

    for y in (start_y..=bounds.y1).step_by(2) {
        for x in (start_x..=bounds.x1).step_by(2) {
            let base = depths.len();
            depths.resize(base + 4 * num_samples, 0.0);
            let mut mask = 0u64;

            for frag in 0..4 {
                let (px, py) = (x + (frag & 1) as i32, y + (frag >> 1) as i32);
                if !bounds.contains(px, py) {
                    continue;
                }
                for (sample, offset) in samples.iter().enumerate() {
                    let sx = px as i64 * SUBPIXEL_SCALE + offset[0];
                    let sy = py as i64 * SUBPIXEL_SCALE + offset[1];
                    if let Some(depth) = coverage.sample_depth(sx, sy) {
                        let bit = frag * num_samples + sample;
                        mask |= 1 << bit;
                        depths[base + bit] = depth;
                    }
                }
            }

            if mask == 0 {
                depths.truncate(base);
                continue;
            }

            let mut barycentric = [[0.0; 4]; 3];
            let mut linear_barycentric = [[0.0; 4]; 3];
            for frag in 0..4 {
                let cx = (x + (frag & 1) as i32) as i64 * SUBPIXEL_SCALE + HALF_PIXEL;
                let cy = (y + (frag >> 1) as i32) as i64 * SUBPIXEL_SCALE + HALF_PIXEL;
                let (perspective, linear) = coverage.barycentric(cx, cy);
                for vertex in 0..3 {
                    barycentric[vertex][frag] = perspective[vertex];
                    linear_barycentric[vertex][frag] = linear[vertex];
                }
            }

            packets.push(FragmentPacket {
                position: [x, y],
                coverage: mask,
                barycentric,
                linear_barycentric,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EdgeFunction {
    a: i64,
    b: i64,
    c: i64,
    inclusive: bool,
}

impl EdgeFunction {
    fn new(p0: [i64; 2], p1: [i64; 2], state: &RasterizationState) -> Self {
        let [x0, y0] = p0;
        let [x1, y1] = p1;
        let (xd, yd) = (x1 - x0, y1 - y0);

        let inclusive = if yd == 0 {
            match state.vertical_fill {
                VerticalFill::Bottom => xd >= 0,
                VerticalFill::Top => xd <= 0,
            }
        } else {
            match state.horizontal_fill {
                HorizontalFill::Left => yd <= 0,
                HorizontalFill::Right => yd >= 0,
            }
        };

        Self {
            a: y0 - y1,
            b: x1 - x0,
            c: x0 * y1 - y0 * x1,
            inclusive,
        }
    }

    fn evaluate(&self, x: i64, y: i64) -> i64 {
        self.a * x + self.b * y + self.c
    }

    fn is_inside(&self, value: i64) -> bool {
        if self.inclusive {
            value >= 0
        } else {
            value > 0
        }
    }

    fn reverse(&mut self) {
        self.a = -self.a;
        self.b = -self.b;
        self.c = -self.c;
        self.inclusive = !self.inclusive;
    }
}

/// Edge set, bounds and facing of one triangle.
#[derive(Debug, Clone, Copy)]
pub struct TriangleSetup {
    /// `e01`, `e12`, `e20`, oriented positive inside.
    edges: [EdgeFunction; 3],
    depths: [f64; 3],
    inv_w: [f64; 3],
    bounds: PixelBounds,
    face: FaceType,
}

impl TriangleSetup {
    pub fn visible_face(&self) -> FaceType {
        self.face
    }
}

impl Coverage for TriangleSetup {
    fn sample_depth(&self, sx: i64, sy: i64) -> Option<f32> {
        let [e01, e12, e20] = self.edges;
        let (v01, v12, v20) = (e01.evaluate(sx, sy), e12.evaluate(sx, sy), e20.evaluate(sx, sy));
        if !(e01.is_inside(v01) && e12.is_inside(v12) && e20.is_inside(v20)) {
            return None;
        }
        // Edge values sum to twice the area at every point.
        let sum = (v01 + v12 + v20) as f64;
        let depth = (v12 as f64 * self.depths[0] + v20 as f64 * self.depths[1] + v01 as f64 * self.depths[2]) / sum;
        Some(depth as f32)
    }

    fn barycentric(&self, cx: i64, cy: i64) -> ([f32; 3], [f32; 3]) {
        let [e01, e12, e20] = self.edges;
        let e = [
            e12.evaluate(cx, cy) as f64,
            e20.evaluate(cx, cy) as f64,
            e01.evaluate(cx, cy) as f64,
        ];
        let weighted: [f64; 3] = std::array::from_fn(|i| e[i] * self.inv_w[i]);
        let weighted_sum: f64 = weighted.iter().sum();
        let edge_sum: f64 = e.iter().sum();
        (
            weighted.map(|v| (v / weighted_sum) as f32),
            e.map(|v| (v / edge_sum) as f32),
        )
    }
}

/// Fixed-point triangle rasterizer for one draw call.
#[derive(Debug, Clone)]
pub struct TriangleRasterizer {
    region: RasterRegion,
    samples: Vec<[i64; 2]>,
    state: RasterizationState,
}

impl TriangleRasterizer {
    pub fn new(region: RasterRegion, num_samples: usize, state: RasterizationState) -> Result<Self> {
        Ok(Self {
            region,
            samples: sample_positions(num_samples)?,
            state,
        })
    }

    /// Window coordinates in, `w` holding `1 / clip_w`. `None` for
    /// degenerate (zero area) triangles.
    pub fn setup(&self, v0: Vec4, v1: Vec4, v2: Vec4) -> Option<TriangleSetup> {
        let p = [v0, v1, v2].map(|v| [to_subpixel(v[0]), to_subpixel(v[1])]);
        let mut edges = [
            EdgeFunction::new(p[0], p[1], &self.state),
            EdgeFunction::new(p[1], p[2], &self.state),
            EdgeFunction::new(p[2], p[0], &self.state),
        ];

        let s = edges[0].evaluate(p[2][0], p[2][1]);
        if s == 0 {
            log(LogCategory::Raster, LogLevel::Trace, || {
                "Dropping degenerate triangle".to_string()
            });
            return None;
        }
        // y points down, so counter-clockwise in normalized device
        // coordinates shows up as a negative area here.
        let ndc_ccw = s < 0;
        if ndc_ccw {
            edges.iter_mut().for_each(EdgeFunction::reverse);
        }
        let face = if (self.state.winding == Winding::Ccw) == ndc_ccw {
            FaceType::Front
        } else {
            FaceType::Back
        };

        let min_x = p.iter().map(|v| v[0]).min().unwrap_or(0);
        let max_x = p.iter().map(|v| v[0]).max().unwrap_or(0);
        let min_y = p.iter().map(|v| v[1]).min().unwrap_or(0);
        let max_y = p.iter().map(|v| v[1]).max().unwrap_or(0);
        let bounds = self.region.clamp(
            floor_to_pixel(min_x),
            floor_to_pixel(min_y),
            floor_to_pixel(max_x),
            floor_to_pixel(max_y),
        );

        Some(TriangleSetup {
            edges,
            depths: [v0[2] as f64, v1[2] as f64, v2[2] as f64],
            inv_w: [v0[3] as f64, v1[3] as f64, v2[3] as f64],
            bounds,
            face,
        })
    }

    pub fn rasterize(&self, setup: &TriangleSetup, packets: &mut Vec<FragmentPacket>, depths: &mut Vec<f32>) {
        rasterize_bounds(setup, setup.bounds, &self.samples, packets, depths);
    }
}

struct LineCoverage {
    origin: [f64; 2],
    dir: [f64; 2],
    length: f64,
    half_width: f64,
    depths: [f64; 2],
    inv_w: [f64; 2],
}

impl LineCoverage {
    /// `(t, s)`: position along the line in `[0, 1)` and signed distance.
    fn project(&self, sx: i64, sy: i64) -> (f64, f64) {
        let dx = sx as f64 / SUBPIXEL_SCALE as f64 - self.origin[0];
        let dy = sy as f64 / SUBPIXEL_SCALE as f64 - self.origin[1];
        let t = (dx * self.dir[0] + dy * self.dir[1]) / self.length;
        let s = dy * self.dir[0] - dx * self.dir[1];
        (t, s)
    }
}

impl Coverage for LineCoverage {
    fn sample_depth(&self, sx: i64, sy: i64) -> Option<f32> {
        let (t, s) = self.project(sx, sy);
        if (0.0..1.0).contains(&t) && s >= -self.half_width && s < self.half_width {
            Some((self.depths[0] + t * (self.depths[1] - self.depths[0])) as f32)
        } else {
            None
        }
    }

    fn barycentric(&self, cx: i64, cy: i64) -> ([f32; 3], [f32; 3]) {
        let t = self.project(cx, cy).0.clamp(0.0, 1.0);
        let w0 = (1.0 - t) * self.inv_w[0];
        let w1 = t * self.inv_w[1];
        let b0 = if w0 + w1 != 0.0 { w0 / (w0 + w1) } else { 1.0 - t };
        (
            [b0 as f32, (1.0 - b0) as f32, 0.0],
            [(1.0 - t) as f32, t as f32, 0.0],
        )
    }
}

/// Wide-line rasterizer; a line covers the samples of the rectangle
/// `line_width` wide centered on it.
#[derive(Debug, Clone)]
pub struct LineRasterizer {
    region: RasterRegion,
    samples: Vec<[i64; 2]>,
    line_width: f32,
}

impl LineRasterizer {
    pub fn new(region: RasterRegion, num_samples: usize, line_width: f32) -> Result<Self> {
        Ok(Self {
            region,
            samples: sample_positions(num_samples)?,
            line_width,
        })
    }

    pub fn rasterize(&self, v0: Vec4, v1: Vec4, packets: &mut Vec<FragmentPacket>, depths: &mut Vec<f32>) {
        let origin = [v0[0] as f64, v0[1] as f64];
        let delta = [v1[0] as f64 - origin[0], v1[1] as f64 - origin[1]];
        let length = delta[0].hypot(delta[1]);
        if length == 0.0 || !length.is_finite() || self.line_width <= 0.0 {
            return;
        }

        let half_width = self.line_width as f64 / 2.0;
        let min_x = origin[0].min(v1[0] as f64) - half_width;
        let max_x = origin[0].max(v1[0] as f64) + half_width;
        let min_y = origin[1].min(v1[1] as f64) - half_width;
        let max_y = origin[1].max(v1[1] as f64) + half_width;
        let bounds = self.region.clamp(
            min_x.floor() as i32,
            min_y.floor() as i32,
            max_x.floor() as i32,
            max_y.floor() as i32,
        );

        let coverage = LineCoverage {
            origin,
            dir: [delta[0] / length, delta[1] / length],
            length,
            half_width,
            depths: [v0[2] as f64, v1[2] as f64],
            inv_w: [v0[3] as f64, v1[3] as f64],
        };
        rasterize_bounds(&coverage, bounds, &self.samples, packets, depths);
    }
}

struct PointCoverage {
    center: [f64; 2],
    half_size: f64,
    depth: f32,
}

impl Coverage for PointCoverage {
    fn sample_depth(&self, sx: i64, sy: i64) -> Option<f32> {
        let x = sx as f64 / SUBPIXEL_SCALE as f64;
        let y = sy as f64 / SUBPIXEL_SCALE as f64;
        let inside = |v: f64, c: f64| v >= c - self.half_size && v < c + self.half_size;
        (inside(x, self.center[0]) && inside(y, self.center[1])).then_some(self.depth)
    }

    fn barycentric(&self, _cx: i64, _cy: i64) -> ([f32; 3], [f32; 3]) {
        ([1.0, 0.0, 0.0], [1.0, 0.0, 0.0])
    }
}

/// Rasterizes points as axis-aligned squares.
#[derive(Debug, Clone)]
pub struct PointRasterizer {
    region: RasterRegion,
    samples: Vec<[i64; 2]>,
}

impl PointRasterizer {
    pub fn new(region: RasterRegion, num_samples: usize) -> Result<Self> {
        Ok(Self {
            region,
            samples: sample_positions(num_samples)?,
        })
    }

    pub fn rasterize(&self, v: Vec4, point_size: f32, packets: &mut Vec<FragmentPacket>, depths: &mut Vec<f32>) {
        if point_size <= 0.0 || !point_size.is_finite() {
            return;
        }
        let half_size = point_size as f64 / 2.0;
        let center = [v[0] as f64, v[1] as f64];
        let bounds = self.region.clamp(
            (center[0] - half_size).floor() as i32,
            (center[1] - half_size).floor() as i32,
            (center[0] + half_size).floor() as i32,
            (center[1] + half_size).floor() as i32,
        );
        let coverage = PointCoverage {
            center,
            half_size,
            depth: v[2],
        };
        rasterize_bounds(&coverage, bounds, &self.samples, packets, depths);
    }
}
