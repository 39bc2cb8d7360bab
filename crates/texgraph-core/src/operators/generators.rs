//! Generators: operators with no inputs.

use crate::buffer::{GrayscaleBuffer, ImageBuffer, SharedImage, TextureBuffer};
use crate::color::Color;
use crate::error::OperatorError;
use crate::noise::{CellFeature, Cellular, Fractal, Metric, NoiseField, Octaves, Perlin};
use crate::params::{Gradient, ParamSet, ParamSpec};
use crate::rng::SeedStream;

use super::EvalContext;

const SEED_MAX: i64 = u32::MAX as i64;

pub(super) fn constant_params() -> Vec<ParamSpec> {
    vec![ParamSpec::scalar("value", 0.5, 0.0, 1.0)]
}

pub(super) fn eval_constant(
    params: &ParamSet,
    _inputs: &[SharedImage],
    ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let value = params.scalar("value")?;
    Ok(vec![ImageBuffer::Grayscale(GrayscaleBuffer::new(
        ctx.width, ctx.height, value,
    ))])
}

pub(super) fn constant_color_params() -> Vec<ParamSpec> {
    vec![ParamSpec::color("color", Color::rgb(0.8, 0.4, 0.7))]
}

pub(super) fn eval_constant_color(
    params: &ParamSet,
    _inputs: &[SharedImage],
    ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let color = params.color("color")?;
    Ok(vec![ImageBuffer::Color(TextureBuffer::new(
        ctx.width, ctx.height, color,
    ))])
}

pub(super) fn perlin_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::integer("seed", 0, 0, SEED_MAX),
        ParamSpec::integer("scale", 4, 1, 256).describe("Lattice cells across the texture."),
        ParamSpec::integer("octaves", 4, 1, 12),
        ParamSpec::scalar("persistence", 0.5, 0.0, 1.0),
        ParamSpec::integer("lacunarity", 2, 1, 4)
            .describe("Frequency ratio between octaves. Integral so tiling holds."),
        ParamSpec::boolean("periodic", true).describe("Tile seamlessly."),
    ]
}

/// Normalized pixel-center coordinates. `u` reaches 1.0 one pixel past the
/// right edge, so a periodic pattern continues seamlessly across the border.
#[inline]
fn uv(x: u32, y: u32, ctx: &EvalContext) -> (f64, f64) {
    (
        x as f64 / ctx.width as f64,
        y as f64 / ctx.height as f64,
    )
}

pub(super) fn eval_perlin_noise(
    params: &ParamSet,
    _inputs: &[SharedImage],
    ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let seed = params.integer("seed")? as u32;
    let scale = params.integer("scale")? as u32;
    let octaves = Octaves {
        count: params.integer("octaves")? as u32,
        persistence: params.scalar("persistence")?,
        lacunarity: params.integer("lacunarity")? as f64,
    };

    let mut base = Perlin::new(seed);
    if params.flag("periodic")? {
        base = base.periodic(scale, scale);
    }
    let noise = Fractal::new(base, octaves);

    let scale = scale as f64;
    let buf = GrayscaleBuffer::from_fn(ctx.width, ctx.height, |x, y| {
        let (u, v) = uv(x, y, ctx);
        noise.unit(u * scale, v * scale)
    });
    Ok(vec![ImageBuffer::Grayscale(buf)])
}

pub(super) fn cellular_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::integer("seed", 0, 0, SEED_MAX),
        ParamSpec::integer("scale", 4, 1, 256),
        ParamSpec::scalar("jitter", 1.0, 0.0, 1.0),
        ParamSpec::choice(
            "distance",
            "euclidean",
            &["euclidean", "manhattan", "chebyshev"],
        ),
        ParamSpec::choice("feature", "f1", &["f1", "f2", "f2_minus_f1"]),
        ParamSpec::boolean("periodic", true),
    ]
}

pub(super) fn eval_cellular(
    params: &ParamSet,
    _inputs: &[SharedImage],
    ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let seed = params.integer("seed")? as u32;
    let scale = params.integer("scale")? as u32;
    let distance = match params.choice("distance")? {
        "manhattan" => Metric::Manhattan,
        "chebyshev" => Metric::Chebyshev,
        _ => Metric::Euclidean,
    };
    let feature = match params.choice("feature")? {
        "f2" => CellFeature::F2,
        "f2_minus_f1" => CellFeature::F2MinusF1,
        _ => CellFeature::F1,
    };

    let mut noise = Cellular::new(seed)
        .jitter(params.scalar("jitter")?)
        .metric(distance)
        .feature(feature);
    if params.flag("periodic")? {
        noise = noise.periodic(scale, scale);
    }

    let scale = scale as f64;
    let buf = GrayscaleBuffer::from_fn(ctx.width, ctx.height, |x, y| {
        let (u, v) = uv(x, y, ctx);
        noise.unit(u * scale, v * scale)
    });
    Ok(vec![ImageBuffer::Grayscale(buf)])
}

pub(super) fn checker_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::integer("tiles", 8, 1, 256).describe("Squares per row."),
        ParamSpec::color("color1", Color::white()),
        ParamSpec::color("color2", Color::black()),
    ]
}

pub(super) fn eval_checker(
    params: &ParamSet,
    _inputs: &[SharedImage],
    ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let tiles = params.integer("tiles")? as f64;
    let c1 = params.color("color1")?;
    let c2 = params.color("color2")?;

    let buf = TextureBuffer::from_fn(ctx.width, ctx.height, |x, y| {
        let (u, v) = uv(x, y, ctx);
        let cell = (u * tiles).floor() as i64 + (v * tiles).floor() as i64;
        if cell % 2 == 0 {
            c1
        } else {
            c2
        }
    });
    Ok(vec![ImageBuffer::Color(buf)])
}

pub(super) fn gradient_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::choice(
            "direction",
            "horizontal",
            &["horizontal", "vertical", "radial"],
        ),
        ParamSpec::scalar("start", 0.0, 0.0, 1.0),
        ParamSpec::scalar("end", 1.0, 0.0, 1.0),
    ]
}

pub(super) fn eval_gradient(
    params: &ParamSet,
    _inputs: &[SharedImage],
    ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let start = params.scalar("start")?;
    let end = params.scalar("end")?;
    let direction = params.choice("direction")?;

    let denom_x = (ctx.width as f64 - 1.0).max(1.0);
    let denom_y = (ctx.height as f64 - 1.0).max(1.0);

    let buf = GrayscaleBuffer::from_fn(ctx.width, ctx.height, |x, y| {
        let u = x as f64 / denom_x;
        let v = y as f64 / denom_y;
        let t = match direction {
            "vertical" => v,
            "radial" => {
                let dx = u - 0.5;
                let dy = v - 0.5;
                ((dx * dx + dy * dy).sqrt() / 0.5).min(1.0)
            }
            _ => u,
        };
        start + (end - start) * t
    });
    Ok(vec![ImageBuffer::Grayscale(buf)])
}

pub(super) fn brick_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::integer("seed", 0, 0, SEED_MAX),
        ParamSpec::integer("columns", 4, 1, 64),
        ParamSpec::integer("rows", 6, 1, 64),
        ParamSpec::scalar("offset", 0.5, 0.0, 1.0).describe("Shift of odd rows, in bricks."),
        ParamSpec::scalar("offset_jitter", 0.1, 0.0, 1.0)
            .describe("Largest random extra shift per row, in bricks."),
        ParamSpec::scalar("gap_x", 0.03, 0.0, 0.5).describe("Mortar width, fraction of the texture."),
        ParamSpec::scalar("gap_y", 0.03, 0.0, 0.5).describe("Mortar height, fraction of the texture."),
        ParamSpec::scalar("bevel", 0.05, 0.0, 0.5).describe("Falloff width at brick edges."),
        ParamSpec::boolean("random_tone", false).describe("Give each brick a random ramp position."),
        ParamSpec::gradient("gradient", Gradient::grayscale()),
    ]
}

pub(super) fn eval_brick(
    params: &ParamSet,
    _inputs: &[SharedImage],
    ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let seed = params.integer("seed")? as u32;
    let columns = params.integer("columns")? as usize;
    let rows = params.integer("rows")? as usize;
    let offset = params.scalar("offset")?;
    let jitter = params.scalar("offset_jitter")?;
    let bevel = params.scalar("bevel")?;
    let random_tone = params.flag("random_tone")?;
    let ramp = params.gradient("gradient")?;

    let mut shift_rng = SeedStream::new(seed, "brick-rows");
    let shifts: Vec<f64> = (0..rows).map(|_| shift_rng.unit() * jitter).collect();
    let mut tone_rng = SeedStream::new(seed, "brick-tones");
    let tones: Vec<f64> = (0..rows * columns).map(|_| tone_rng.unit()).collect();

    let (nx, ny) = (columns as f64, rows as f64);
    // Gaps measured in bricks.
    let gap_x = params.scalar("gap_x")? * nx;
    let gap_y = params.scalar("gap_y")? * ny;

    let buf = TextureBuffer::from_fn(ctx.width, ctx.height, |x, y| {
        let (u, v) = uv(x, y, ctx);
        let vv = v * ny;
        let row = (vv as usize).min(rows - 1);
        let fy = vv.fract();

        let stagger = if row % 2 == 1 { offset } else { 0.0 };
        let uu = (u * nx + stagger + shifts[row]).rem_euclid(nx);
        let column = (uu as usize).min(columns - 1);
        let fx = uu.fract();

        let in_mortar = (gap_x > 0.0 && fx <= gap_x) || (gap_y > 0.0 && fy <= gap_y);
        if in_mortar {
            return ramp.sample(0.0);
        }
        let mut value = if random_tone {
            tones[row * columns + column]
        } else {
            1.0
        };
        let edge = ((fx - gap_x).min(1.0 - fx) / nx).min((fy - gap_y).min(1.0 - fy) / ny)
            * nx.min(ny);
        if edge < bevel {
            value *= edge / bevel;
        }
        ramp.sample(value)
    });
    Ok(vec![ImageBuffer::Color(buf)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperatorKind;
    use crate::params::ColorStop;

    fn eval(kind: OperatorKind, params: ParamSet, w: u32, h: u32) -> ImageBuffer {
        let def = kind.def();
        let params = params.resolve(&def.params).unwrap();
        def.evaluate(&params, &[], &EvalContext::new(w, h))
            .unwrap()
            .remove(0)
    }

    #[test]
    fn perlin_same_seed_is_bit_identical() {
        let p = ParamSet::new().with("seed", 42_i64);
        let a = eval(OperatorKind::PerlinNoise, p.clone(), 32, 32);
        let b = eval(OperatorKind::PerlinNoise, p, 32, 32);
        assert_eq!(a, b);
    }

    #[test]
    fn perlin_seed_changes_output() {
        let a = eval(OperatorKind::PerlinNoise, ParamSet::new().with("seed", 1_i64), 16, 16);
        let b = eval(OperatorKind::PerlinNoise, ParamSet::new().with("seed", 2_i64), 16, 16);
        assert_ne!(a, b);
    }

    #[test]
    fn perlin_values_in_unit_range() {
        let img = eval(OperatorKind::PerlinNoise, ParamSet::new().with("seed", 9_i64), 32, 32);
        let gray = img.as_grayscale().unwrap();
        assert!(gray.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn perlin_periodic_is_seamless() {
        // Column 0 must equal the field one full period to the right.
        let p = ParamSet::new().with("seed", 5_i64).with("scale", 2_i64);
        let img = eval(OperatorKind::PerlinNoise, p, 16, 16);
        let gray = img.as_grayscale().unwrap();
        let noise = Fractal::new(Perlin::new(5).periodic(2, 2), Octaves::default());
        for y in 0..16 {
            let v = y as f64 / 16.0 * 2.0;
            let wrapped = noise.unit(2.0, v);
            assert!((wrapped - gray.get(0, y)).abs() < 1e-9);
        }
    }

    #[test]
    fn perlin_lacunarity_is_a_parameter_and_keeps_tiling() {
        let base = ParamSet::new().with("seed", 5_i64).with("scale", 2_i64);
        let doubled = eval(OperatorKind::PerlinNoise, base.clone(), 16, 16);
        let tripled = eval(
            OperatorKind::PerlinNoise,
            base.with("lacunarity", 3_i64),
            16,
            16,
        );
        assert_ne!(doubled, tripled);

        let gray = tripled.as_grayscale().unwrap();
        let octaves = Octaves {
            lacunarity: 3.0,
            ..Octaves::default()
        };
        let noise = Fractal::new(Perlin::new(5).periodic(2, 2), octaves);
        for y in 0..16 {
            let v = y as f64 / 16.0 * 2.0;
            assert!((noise.unit(2.0, v) - gray.get(0, y)).abs() < 1e-9);
        }
    }

    #[test]
    fn cellular_values_in_unit_range() {
        let img = eval(OperatorKind::Cellular, ParamSet::new().with("seed", 3_i64), 16, 16);
        let gray = img.as_grayscale().unwrap();
        assert!(gray.data.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn checker_alternates() {
        let img = eval(OperatorKind::Checker, ParamSet::new().with("tiles", 2_i64), 4, 4);
        let tex = img.as_color().unwrap();
        assert_eq!(tex.get(0, 0), Color::white());
        assert_eq!(tex.get(2, 0), Color::black());
        assert_eq!(tex.get(2, 2), Color::white());
    }

    #[test]
    fn gradient_horizontal_spans_start_to_end() {
        let p = ParamSet::new().with("start", 0.2).with("end", 0.8);
        let img = eval(OperatorKind::Gradient, p, 5, 1);
        let gray = img.as_grayscale().unwrap();
        assert!((gray.get(0, 0) - 0.2).abs() < 1e-12);
        assert!((gray.get(4, 0) - 0.8).abs() < 1e-12);
        assert!((gray.get(2, 0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn brick_rows_are_staggered() {
        let p = ParamSet::new().with("offset_jitter", 0.0);
        let img = eval(OperatorKind::Brick, p, 64, 64);
        let tex = img.as_color().unwrap();
        // Mortar at the origin.
        assert_eq!(tex.get(0, 0), Color::black());
        // Middle of the first brick in row 0.
        assert_eq!(tex.get(8, 5), Color::white());
        // Row 1 is shifted half a brick, so the same column is a joint.
        assert_eq!(tex.get(8, 16), Color::black());
    }

    #[test]
    fn brick_maps_through_gradient() {
        let ramp = Gradient::new(vec![
            ColorStop::new(0.0, Color::rgb(0.2, 0.1, 0.0)),
            ColorStop::new(1.0, Color::rgb(0.8, 0.3, 0.2)),
        ])
        .unwrap();
        let p = ParamSet::new()
            .with("offset_jitter", 0.0)
            .with("gradient", ramp);
        let img = eval(OperatorKind::Brick, p, 64, 64);
        let tex = img.as_color().unwrap();
        assert_eq!(tex.get(0, 0), Color::rgb(0.2, 0.1, 0.0));
        assert_eq!(tex.get(8, 5), Color::rgb(0.8, 0.3, 0.2));
    }

    #[test]
    fn brick_random_tones_depend_on_seed() {
        let p = |seed: i64| {
            ParamSet::new()
                .with("seed", seed)
                .with("random_tone", true)
                .with("offset_jitter", 0.0)
        };
        let a = eval(OperatorKind::Brick, p(1), 64, 64);
        assert_eq!(a, eval(OperatorKind::Brick, p(1), 64, 64));
        assert_ne!(a, eval(OperatorKind::Brick, p(2), 64, 64));

        // Brick centers in row 0 carry their own tone.
        let tex = a.as_color().unwrap();
        let centers: Vec<f64> = [8, 24, 40, 56].iter().map(|&x| tex.get(x, 5).r).collect();
        assert!(centers.iter().any(|&c| (c - centers[0]).abs() > 1e-9));
    }

    #[test]
    fn constant_color_default() {
        let img = eval(OperatorKind::ConstantColor, ParamSet::new(), 2, 2);
        assert_eq!(img.as_color().unwrap().get(1, 1), Color::rgb(0.8, 0.4, 0.7));
    }
}
