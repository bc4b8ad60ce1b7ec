//! GPU colorization path.
//!
//! A single-band mode compiles into one WGSL program per distinct
//! (expression, ramp kind) pair. Everything else, including the domain, the
//! ramp stops and the sampling window, travels in [`ShaderUniforms`], so a
//! program is reused by every tile and every provider sharing the cache.
//!
//! The fragment stage samples the decoded window directly with
//! `sample_nearest` or `sample_bilinear`, which follow the same buffer and
//! no-data rules as the CPU resampler.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use bytemuck::{Pod, Zeroable};
use tracing::debug;

use super::SingleBand;
use crate::color::ramp::MAX_STOPS;
use crate::color::RampKind;
use crate::error::{AnyResult, Error, Result};
use crate::resample::{ResampleMethod, ResampleParams};

/// Opaque handle of a program compiled by a [`GpuSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Compositing surface executing generated WGSL.
///
/// `draw` binds the uniform block at `@group(0) @binding(0)` and the band
/// planes at `@binding(1)`, renders a `width x height` target with the
/// program's `vs_main`/`fs_main` and returns it as RGBA8.
pub trait GpuSurface: Send + Sync {
    fn compile(&self, wgsl: &str) -> AnyResult<ProgramHandle>;

    fn draw(
        &self,
        program: ProgramHandle,
        uniforms: &[u8],
        bands: &[f32],
        width: usize,
        height: usize,
    ) -> AnyResult<Vec<u8>>;

    fn release(&self, program: ProgramHandle);
}

/// Uniform block shared by every generated program. Layout matches the
/// WGSL `Uniforms` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShaderUniforms {
    pub domain: [f32; 2],
    pub display_range: [f32; 2],
    pub sampling_window: [f32; 4],
    pub source_size: [u32; 2],
    pub target_size: [u32; 2],
    pub nodata: f32,
    pub has_nodata: u32,
    pub has_display_range: u32,
    pub clamp_low: u32,
    pub clamp_high: u32,
    pub buffer: u32,
    pub method: u32,
    pub interpolation: u32,
    pub stop_count: u32,
    pub band_count: u32,
    pub _padding: [u32; 2],
    /// Stop positions, four per vector.
    pub positions: [[f32; 4]; MAX_STOPS / 4],
    pub colors: [[f32; 4]; MAX_STOPS],
    pub segment_start: [[f32; 4]; MAX_STOPS],
    pub segment_end: [[f32; 4]; MAX_STOPS],
}

fn to_f32x4(v: [f64; 4]) -> [f32; 4] {
    v.map(|c| c as f32)
}

impl ShaderUniforms {
    #[must_use]
    pub fn new(single: &SingleBand, params: &ResampleParams) -> Self {
        let mut u = Self::zeroed();
        u.domain = [single.domain.min as f32, single.domain.max as f32];
        if let Some(range) = single.display_range {
            u.display_range = [range.min as f32, range.max as f32];
            u.has_display_range = 1;
        }
        u.sampling_window = params.window.map(|c| c as f32);
        u.source_size = [params.source_width as u32, params.source_height as u32];
        u.target_size = [params.target_width as u32, params.target_height as u32];
        if let Some(nodata) = params.nodata.filter(|v| !v.is_nan()) {
            u.nodata = nodata as f32;
            u.has_nodata = 1;
        }
        u.clamp_low = u32::from(single.clamp_low);
        u.clamp_high = u32::from(single.clamp_high);
        u.buffer = params.buffer as u32;
        u.method = match params.method {
            ResampleMethod::Nearest => 0,
            ResampleMethod::Bilinear => 1,
        };
        u.interpolation = single.ramp.mode().code();
        u.band_count = single.read_bands().len() as u32;

        let ramp = &single.ramp;
        u.stop_count = ramp.positions().len().min(MAX_STOPS) as u32;
        for (i, (&t, color)) in ramp.positions().iter().zip(ramp.colors()).take(MAX_STOPS).enumerate() {
            u.positions[i / 4][i % 4] = t as f32;
            u.colors[i] = to_f32x4(color.to_array());
        }
        for (i, segment) in ramp.segments().iter().take(MAX_STOPS).enumerate() {
            u.segment_start[i] = to_f32x4(segment.start);
            u.segment_end[i] = to_f32x4(segment.end);
        }
        u
    }
}

/// Cache key of a generated program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    /// Canonical expression text, `None` for a plain band.
    pub expression: Option<String>,
    pub kind: RampKind,
}

impl ShaderKey {
    #[must_use]
    pub fn for_single(single: &SingleBand) -> Self {
        Self {
            expression: single.expression.as_ref().map(|e| e.canonical().to_string()),
            kind: single.ramp.kind(),
        }
    }
}

const PRELUDE: &str = r"struct Uniforms {
    domain: vec2<f32>,
    display_range: vec2<f32>,
    sampling_window: vec4<f32>,
    source_size: vec2<u32>,
    target_size: vec2<u32>,
    nodata: f32,
    has_nodata: u32,
    has_display_range: u32,
    clamp_low: u32,
    clamp_high: u32,
    buffer: u32,
    method: u32,
    interpolation: u32,
    stop_count: u32,
    band_count: u32,
    padding0: u32,
    padding1: u32,
    positions: array<vec4<f32>, 8>,
    colors: array<vec4<f32>, 32>,
    segment_start: array<vec4<f32>, 32>,
    segment_end: array<vec4<f32>, 32>,
}

struct Sampled {
    value: f32,
    valid: bool,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(0) @binding(1) var<storage, read> bands: array<f32>;

const TRANSPARENT: vec4<f32> = vec4<f32>(0.0, 0.0, 0.0, 0.0);
const F32_MAX: f32 = 3.40282347e38;
const XN: f32 = 0.96422;
const ZN: f32 = 0.82521;
const T0: f32 = 0.13793103;
const T1: f32 = 0.20689655;
const T2: f32 = 0.12841855;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32((index << 1u) & 2u);
    let y = f32(index & 2u);
    return vec4<f32>(x * 2.0 - 1.0, 1.0 - y * 2.0, 0.0, 1.0);
}

fn is_finite(v: f32) -> bool {
    return v == v && abs(v) <= F32_MAX;
}

fn is_nodata(v: f32) -> bool {
    if (v != v) {
        return true;
    }
    if (u.has_nodata == 0u) {
        return false;
    }
    if (u.nodata == 0.0 || !is_finite(u.nodata)) {
        return v == u.nodata;
    }
    return abs((v - u.nodata) / u.nodata) < 1e-6;
}

fn texel(slot: u32, col: u32, row: u32) -> f32 {
    let plane = u.source_size.x * u.source_size.y;
    return bands[slot * plane + row * u.source_size.x + col];
}

fn effective_size() -> vec2<f32> {
    let inner = vec2<i32>(u.source_size) - vec2<i32>(2 * i32(u.buffer));
    return vec2<f32>(max(inner, vec2<i32>(1)));
}

fn mapped(frac: vec2<f32>) -> vec2<f32> {
    return u.sampling_window.xy + frac * (u.sampling_window.zw - u.sampling_window.xy);
}

fn sample_nearest(slot: u32, frac: vec2<f32>) -> Sampled {
    let p = max(effective_size() * mapped(frac), vec2<f32>(0.0));
    let cell = min(vec2<u32>(u.buffer) + vec2<u32>(p), u.source_size - vec2<u32>(1u));
    let v = texel(slot, cell.x, cell.y);
    return Sampled(v, !is_nodata(v));
}

fn sample_bilinear(slot: u32, frac: vec2<f32>) -> Sampled {
    let limit = vec2<f32>(u.source_size - vec2<u32>(1u));
    let raw = clamp(effective_size() * mapped(frac) + vec2<f32>(f32(u.buffer)), vec2<f32>(0.0), limit);
    let lo = floor(raw);
    let hi = min(ceil(raw), limit);
    let t = raw - lo;
    let l = vec2<u32>(lo);
    let h = vec2<u32>(hi);
    var values = array<f32, 4>(
        texel(slot, l.x, l.y),
        texel(slot, h.x, l.y),
        texel(slot, l.x, h.y),
        texel(slot, h.x, h.y),
    );
    var weights = array<f32, 4>(
        (1.0 - t.x) * (1.0 - t.y),
        t.x * (1.0 - t.y),
        (1.0 - t.x) * t.y,
        t.x * t.y,
    );
    var sum = 0.0;
    var total = 0.0;
    var first = 0.0;
    var found = false;
    for (var i = 0u; i < 4u; i++) {
        let v = values[i];
        if (is_nodata(v)) {
            continue;
        }
        if (!found) {
            first = v;
            found = true;
        }
        sum += v * weights[i];
        total += weights[i];
    }
    if (!found) {
        return Sampled(0.0, false);
    }
    if (total <= 1.1920929e-7) {
        return Sampled(first, true);
    }
    return Sampled(sum / total, true);
}

fn sample_band(slot: u32, frac: vec2<f32>) -> Sampled {
    if (u.method == 1u) {
        return sample_bilinear(slot, frac);
    }
    return sample_nearest(slot, frac);
}

fn hue_channel(h: f32, m1: f32, m2: f32) -> f32 {
    var v = m1;
    if (h < 60.0) {
        v = m1 + (m2 - m1) * h / 60.0;
    } else if (h < 180.0) {
        v = m2;
    } else if (h < 240.0) {
        v = m1 + (m2 - m1) * (240.0 - h) / 60.0;
    }
    return clamp(v, 0.0, 1.0);
}

fn wrap_hue(h: f32) -> f32 {
    if (h >= 360.0) {
        return h - 360.0;
    }
    if (h < 0.0) {
        return h + 360.0;
    }
    return h;
}

fn hsl_to_rgb(c: vec3<f32>) -> vec3<f32> {
    let h = c.x - 360.0 * floor(c.x / 360.0);
    let l = c.z;
    let m2 = l + select(1.0 - l, l, l < 0.5) * c.y;
    let m1 = 2.0 * l - m2;
    return vec3<f32>(
        hue_channel(wrap_hue(h + 120.0), m1, m2),
        hue_channel(h, m1, m2),
        hue_channel(wrap_hue(h - 120.0), m1, m2),
    );
}

fn lab_to_xyz_f(t: f32) -> f32 {
    if (t > T1) {
        return t * t * t;
    }
    return T2 * (t - T0);
}

fn linear_to_srgb(x: f32) -> f32 {
    if (x <= 0.0031308) {
        return 12.92 * x;
    }
    return 1.055 * pow(x, 1.0 / 2.4) - 0.055;
}

fn lab_to_rgb(c: vec3<f32>) -> vec3<f32> {
    let fy = (c.x + 16.0) / 116.0;
    let x = XN * lab_to_xyz_f(fy + c.y / 500.0);
    let z = ZN * lab_to_xyz_f(fy - c.z / 200.0);
    let y = lab_to_xyz_f(fy);
    return clamp(vec3<f32>(
        linear_to_srgb(3.1338561 * x - 1.6168667 * y - 0.4906146 * z),
        linear_to_srgb(-0.9787684 * x + 1.9161415 * y + 0.0334540 * z),
        linear_to_srgb(0.0719453 * x - 0.2289914 * y + 1.4052427 * z),
    ), vec3<f32>(0.0), vec3<f32>(1.0));
}

fn from_space(v: vec4<f32>) -> vec4<f32> {
    if (u.interpolation == 1u || u.interpolation == 2u) {
        return vec4<f32>(hsl_to_rgb(v.xyz), v.w);
    }
    if (u.interpolation == 3u) {
        return vec4<f32>(lab_to_rgb(v.xyz), v.w);
    }
    return v;
}

fn stop_position(i: u32) -> f32 {
    return u.positions[i / 4u][i % 4u];
}

fn colorize(value: f32) -> vec4<f32> {
    if (!is_finite(value)) {
        return TRANSPARENT;
    }
    if (u.has_display_range != 0u && (value < u.display_range.x || value > u.display_range.y)) {
        return TRANSPARENT;
    }
    if ((value < u.domain.x && u.clamp_low == 0u) || (value > u.domain.y && u.clamp_high == 0u)) {
        return TRANSPARENT;
    }
    let range = u.domain.y - u.domain.x;
    var t = 0.0;
    if (range != 0.0) {
        t = (value - u.domain.x) / range;
    }
    return colormap(clamp(t, 0.0, 1.0));
}
";

const CONTINUOUS: &str = r"
fn colormap(t: f32) -> vec4<f32> {
    if (u.stop_count == 0u) {
        return TRANSPARENT;
    }
    for (var i = 0u; i + 1u < u.stop_count; i++) {
        let t0 = stop_position(i);
        let t1 = stop_position(i + 1u);
        if (t < t1) {
            if (t <= t0) {
                return u.colors[i];
            }
            let span = t1 - t0;
            var local = 0.0;
            if (span > 0.0) {
                local = (t - t0) / span;
            }
            return from_space(mix(u.segment_start[i], u.segment_end[i], local));
        }
    }
    return u.colors[u.stop_count - 1u];
}
";

const DISCRETE: &str = r"
fn colormap(t: f32) -> vec4<f32> {
    var index = 0u;
    for (var i = 0u; i < u.stop_count; i++) {
        if (stop_position(i) <= t) {
            index = i;
        }
    }
    return u.colors[index];
}
";

/// Generate the WGSL program for a single-band mode.
#[must_use]
pub fn generate_wgsl(single: &SingleBand) -> String {
    let mut source = String::with_capacity(PRELUDE.len() + 1024);
    source.push_str(PRELUDE);
    source.push_str(match single.ramp.kind() {
        RampKind::Continuous => CONTINUOUS,
        RampKind::Discrete => DISCRETE,
    });

    let read = single.read_bands();
    source.push_str(
        "\n@fragment\nfn fs_main(@builtin(position) position: vec4<f32>) -> @location(0) vec4<f32> {\n\
         \x20   let frac = floor(position.xy) / vec2<f32>(u.target_size);\n",
    );
    for (slot, band) in read.iter().enumerate() {
        let _ = writeln!(source, "    let sample_{band} = sample_band({slot}u, frac);");
        let _ = writeln!(source, "    if (!sample_{band}.valid) {{\n        return TRANSPARENT;\n    }}");
        let _ = writeln!(source, "    let band_{band} = sample_{band}.value;");
    }
    let value = match &single.expression {
        Some(expr) if !expr.bands().is_empty() => expr.to_wgsl(&|band| format!("band_{band}")),
        Some(expr) => expr.to_wgsl(&|_| "0.0f".to_string()),
        None => format!("band_{}", single.band),
    };
    let _ = writeln!(source, "    return colorize({value});\n}}");
    source
}

/// Compiled programs of one GPU surface, keyed by [`ShaderKey`].
pub struct ShaderProgramCache {
    surface: Arc<dyn GpuSurface>,
    programs: Mutex<AHashMap<ShaderKey, ProgramHandle>>,
}

impl ShaderProgramCache {
    #[must_use]
    pub fn new(surface: Arc<dyn GpuSurface>) -> Self {
        Self {
            surface,
            programs: Mutex::new(AHashMap::new()),
        }
    }

    /// Program for `single`, compiling it on first use.
    pub fn program_for(&self, single: &SingleBand) -> Result<ProgramHandle> {
        let key = ShaderKey::for_single(single);
        let mut programs = self.programs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = programs.get(&key) {
            return Ok(*handle);
        }
        let handle = self.surface.compile(&generate_wgsl(single)).map_err(Error::Gpu)?;
        debug!(expression = ?key.expression, kind = ?key.kind, "compiled shader program");
        programs.insert(key, handle);
        Ok(handle)
    }

    /// Colorize a decoded window on the GPU.
    ///
    /// `bands[i]` holds the window of band `single.read_bands()[i]`, sized
    /// `params.source_width * params.source_height`.
    pub fn render(&self, single: &SingleBand, params: &ResampleParams, bands: &[Vec<f32>]) -> Result<Vec<u8>> {
        let program = self.program_for(single)?;
        let uniforms = ShaderUniforms::new(single, params);
        let planes = bands.concat();
        self.surface
            .draw(
                program,
                bytemuck::bytes_of(&uniforms),
                &planes,
                params.target_width,
                params.target_height,
            )
            .map_err(Error::Gpu)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every compiled program.
    pub fn release_all(&self) {
        let drained: Vec<ProgramHandle> = {
            let mut programs = self.programs.lock().unwrap_or_else(|e| e.into_inner());
            programs.drain().map(|(_, handle)| handle).collect()
        };
        for handle in drained {
            self.surface.release(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::space::from_space;
    use crate::color::{ColorRamp, InterpolationMode, Rgba};
    use crate::expression::Expression;
    use crate::stats::BandDomain;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn parse_wgsl(label: &str, source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
            panic!("WGSL parse failed for {label}: {}", error.emit_to_string(source))
        });
        naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|error| panic!("WGSL validation failed for {label}: {error:?}"));
        module
    }

    fn single(expression: Option<&str>, kind: RampKind, mode: InterpolationMode) -> SingleBand {
        let stops = vec![
            (0.0, Rgba::parse("navy").unwrap()),
            (0.3, Rgba::parse("gold").unwrap()),
            (0.7, Rgba::parse("crimson").unwrap()),
            (1.0, Rgba::parse("#ffffff80").unwrap()),
        ];
        SingleBand {
            band: 0,
            expression: expression.map(|e| Expression::parse(e).unwrap()),
            domain: BandDomain::new(-10.0, 30.0),
            ramp: ColorRamp::new(stops, kind, mode).unwrap(),
            display_range: Some(BandDomain::new(-5.0, 25.0)),
            clamp_low: false,
            clamp_high: true,
        }
    }

    fn params() -> ResampleParams {
        ResampleParams {
            source_width: 66,
            source_height: 66,
            target_width: 256,
            target_height: 256,
            window: [0.5, 0.0, 1.0, 0.5],
            method: ResampleMethod::Bilinear,
            buffer: 1,
            nodata: Some(-9999.0),
        }
    }

    /// Mirror of the WGSL `colormap` over a uniform block.
    fn emulate_colormap(u: &ShaderUniforms, kind: RampKind, mode: InterpolationMode, t: f32) -> [f32; 4] {
        let position = |i: usize| u.positions[i / 4][i % 4];
        let count = u.stop_count as usize;
        match kind {
            RampKind::Discrete => {
                let index = (0..count).filter(|&i| position(i) <= t).last().unwrap_or(0);
                u.colors[index]
            }
            RampKind::Continuous => {
                for i in 0..count - 1 {
                    let (t0, t1) = (position(i), position(i + 1));
                    if t < t1 {
                        if t <= t0 {
                            return u.colors[i];
                        }
                        let local = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
                        let mut v = [0.0f64; 4];
                        for (c, out) in v.iter_mut().enumerate() {
                            let a = u.segment_start[i][c];
                            let b = u.segment_end[i][c];
                            *out = f64::from(a + (b - a) * local);
                        }
                        return from_space(v, mode).map(|c| c as f32);
                    }
                }
                u.colors[count - 1]
            }
        }
    }

    #[test]
    fn test_uniform_layout_size() {
        assert_eq!(std::mem::size_of::<ShaderUniforms>(), 1760);
        assert_eq!(std::mem::size_of::<ShaderUniforms>() % 16, 0);
    }

    #[test]
    fn test_generated_programs_validate() {
        for kind in [RampKind::Continuous, RampKind::Discrete] {
            for expression in [None, Some("(b2 - b1) / (b2 + b1)"), Some("-b1 ** 2 + sqrt(abs(b3))"), Some("pi")] {
                let s = single(expression, kind, InterpolationMode::Lab);
                let source = generate_wgsl(&s);
                assert!(source.contains("fn sample_nearest"));
                assert!(source.contains("fn sample_bilinear"));
                let module = parse_wgsl(&format!("{kind:?} {expression:?}"), &source);
                assert!(module.entry_points.iter().any(|e| e.name == "fs_main"));
                assert!(module.entry_points.iter().any(|e| e.name == "vs_main"));
            }
        }
    }

    #[test]
    fn test_uniforms_reproduce_cpu_ramp() {
        for kind in [RampKind::Continuous, RampKind::Discrete] {
            for mode in [InterpolationMode::Rgb, InterpolationMode::Hsl, InterpolationMode::HslLong, InterpolationMode::Lab] {
                let s = single(None, kind, mode);
                let u = ShaderUniforms::new(&s, &params());
                for step in 0..=200 {
                    let t = step as f64 / 200.0;
                    let cpu = s.ramp.color_at(t).to_bytes();
                    let gpu = emulate_colormap(&u, kind, mode, t as f32).map(|c| f64::from(c));
                    let gpu = Rgba::new(gpu[0], gpu[1], gpu[2], gpu[3]).to_bytes();
                    for c in 0..4 {
                        assert!(
                            (i32::from(cpu[c]) - i32::from(gpu[c])).abs() <= 1,
                            "{kind:?} {mode:?} t={t}: cpu {cpu:?} gpu {gpu:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_uniform_fields() {
        let s = single(None, RampKind::Continuous, InterpolationMode::Hsl);
        let u = ShaderUniforms::new(&s, &params());
        assert_eq!(u.domain, [-10.0, 30.0]);
        assert_eq!(u.display_range, [-5.0, 25.0]);
        assert_eq!(u.has_display_range, 1);
        assert_eq!((u.clamp_low, u.clamp_high), (0, 1));
        assert_eq!(u.sampling_window, [0.5, 0.0, 1.0, 0.5]);
        assert_eq!(u.source_size, [66, 66]);
        assert_eq!(u.buffer, 1);
        assert_eq!(u.method, 1);
        assert_eq!(u.interpolation, InterpolationMode::Hsl.code());
        assert_eq!(u.stop_count, 4);
        assert_eq!(u.positions[0], [0.0, 0.3, 0.7, 1.0]);
        assert_eq!(u.has_nodata, 1);
        assert_eq!(u.nodata, -9999.0);
    }

    #[derive(Default)]
    struct RecordingSurface {
        compiled: AtomicU64,
        released: Mutex<Vec<ProgramHandle>>,
    }

    impl GpuSurface for RecordingSurface {
        fn compile(&self, wgsl: &str) -> AnyResult<ProgramHandle> {
            if !wgsl.contains("fn fs_main") {
                return Err("missing entry point".into());
            }
            Ok(ProgramHandle(self.compiled.fetch_add(1, Ordering::SeqCst)))
        }

        fn draw(
            &self,
            _program: ProgramHandle,
            uniforms: &[u8],
            bands: &[f32],
            width: usize,
            height: usize,
        ) -> AnyResult<Vec<u8>> {
            let u: &ShaderUniforms = bytemuck::try_from_bytes(uniforms).map_err(|e| format!("{e:?}"))?;
            let plane = (u.source_size[0] * u.source_size[1]) as usize;
            if bands.len() != plane * u.band_count as usize {
                return Err("band planes do not match uniforms".into());
            }
            Ok(vec![0; width * height * 4])
        }

        fn release(&self, program: ProgramHandle) {
            self.released.lock().unwrap().push(program);
        }
    }

    #[test]
    fn test_program_cache_reuses_by_canonical_form() {
        let surface = Arc::new(RecordingSurface::default());
        let cache = ShaderProgramCache::new(surface.clone());
        let a = single(Some("b1*2"), RampKind::Continuous, InterpolationMode::Rgb);
        let b = single(Some("( b1 * 2 )"), RampKind::Continuous, InterpolationMode::Lab);
        let c = single(Some("b1*2"), RampKind::Discrete, InterpolationMode::Rgb);

        let ha = cache.program_for(&a).unwrap();
        assert_eq!(cache.program_for(&b).unwrap(), ha);
        assert_ne!(cache.program_for(&c).unwrap(), ha);
        assert_eq!(surface.compiled.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);

        cache.release_all();
        assert!(cache.is_empty());
        assert_eq!(surface.released.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_render_uploads_all_planes() {
        let surface = Arc::new(RecordingSurface::default());
        let cache = ShaderProgramCache::new(surface);
        let s = single(Some("b1 + b3"), RampKind::Continuous, InterpolationMode::Rgb);
        let p = params();
        let plane = vec![1.0f32; p.source_width * p.source_height];
        let out = cache.render(&s, &p, &[plane.clone(), plane]).unwrap();
        assert_eq!(out.len(), 256 * 256 * 4);
    }
}
