//! Operators that merge several inputs.

use crate::buffer::{GrayscaleBuffer, ImageBuffer, SharedImage, TextureBuffer};
use crate::color::Color;
use crate::error::OperatorError;
use crate::params::{ParamSet, ParamSpec};

use super::{color_input, gray_input, EvalContext};

pub(super) const BLEND_MODES: &[&str] = &[
    "normal",
    "multiply",
    "divide",
    "screen",
    "overlay",
    "dodge",
    "burn",
    "difference",
    "addition",
    "subtract",
];

pub(super) fn blend_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::choice("mode", "normal", BLEND_MODES),
        ParamSpec::scalar("factor", 1.0, 0.0, 1.0).describe("Opacity of the layer."),
        ParamSpec::boolean("invert_alpha", false),
    ]
}

/// Layer function on RGB, before opacity is applied.
fn blend_channel(mode: &str, base: f64, layer: f64) -> f64 {
    match mode {
        "multiply" => base * layer,
        "divide" => layer / (base + 1.0),
        "screen" => 1.0 - (1.0 - base) * (1.0 - layer),
        "overlay" => base * (base + 2.0 * layer * (1.0 - base)),
        "dodge" => base / ((1.0 - layer) + 1.0),
        "burn" => 1.0 - (1.0 - base) / (layer + 1.0),
        "difference" => (base - layer).abs(),
        "addition" => base + layer,
        "subtract" => base - layer,
        _ => layer,
    }
}

pub(super) fn eval_blend(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let mode = params.choice("mode")?;
    let factor = params.scalar("factor")?;
    let invert_alpha = params.flag("invert_alpha")?;
    let base = color_input(inputs, 0)?;
    let layer = color_input(inputs, 1)?;

    let data = base
        .data
        .iter()
        .zip(&layer.data)
        .map(|(b, l)| {
            let coverage = if invert_alpha { 1.0 - l.a } else { l.a };
            let alpha = coverage * factor;
            let mixed = Color::rgb(
                blend_channel(mode, b.r, l.r),
                blend_channel(mode, b.g, l.g),
                blend_channel(mode, b.b, l.b),
            )
            .saturate();
            Color::rgba(
                b.r * (1.0 - alpha) + mixed.r * alpha,
                b.g * (1.0 - alpha) + mixed.g * alpha,
                b.b * (1.0 - alpha) + mixed.b * alpha,
                b.a,
            )
        })
        .collect();

    Ok(vec![ImageBuffer::Color(TextureBuffer {
        width: base.width,
        height: base.height,
        data,
    })])
}

pub(super) fn mask_params() -> Vec<ParamSpec> {
    vec![ParamSpec::boolean("invert", false)]
}

pub(super) fn eval_mask(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let invert = params.flag("invert")?;
    let a = color_input(inputs, 0)?;
    let b = color_input(inputs, 1)?;
    let mask = gray_input(inputs, 2)?;

    let data = a
        .data
        .iter()
        .zip(&b.data)
        .zip(&mask.data)
        .map(|((ca, cb), &m)| {
            let w = if invert { 1.0 - m } else { m };
            ca.lerp(cb, w)
        })
        .collect();

    Ok(vec![ImageBuffer::Color(TextureBuffer {
        width: a.width,
        height: a.height,
        data,
    })])
}

pub(super) fn eval_combine(
    _params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let r = gray_input(inputs, 0)?;
    let g = gray_input(inputs, 1)?;
    let b = gray_input(inputs, 2)?;
    let a = gray_input(inputs, 3)?;

    let data = (0..r.data.len())
        .map(|i| Color::rgba(r.data[i], g.data[i], b.data[i], a.data[i]))
        .collect();

    Ok(vec![ImageBuffer::Color(TextureBuffer {
        width: r.width,
        height: r.height,
        data,
    })])
}

pub(super) fn add_params() -> Vec<ParamSpec> {
    vec![ParamSpec::boolean("clamp", true)]
}

pub(super) fn eval_add(
    params: &ParamSet,
    inputs: &[SharedImage],
    ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let clamp = params.flag("clamp")?;
    let mut sum = GrayscaleBuffer::new(ctx.width, ctx.height, 0.0);
    for index in 0..inputs.len() {
        let input = gray_input(inputs, index)?;
        for (acc, v) in sum.data.iter_mut().zip(&input.data) {
            *acc += v;
        }
    }
    if clamp {
        sum = sum.map(|v| v.clamp(0.0, 1.0));
    }
    Ok(vec![ImageBuffer::Grayscale(sum)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::OperatorKind;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn solid(c: Color) -> ImageBuffer {
        ImageBuffer::Color(TextureBuffer::new(2, 2, c))
    }

    fn gray(v: f64) -> ImageBuffer {
        ImageBuffer::Grayscale(GrayscaleBuffer::new(2, 2, v))
    }

    fn eval(kind: OperatorKind, params: ParamSet, inputs: &[ImageBuffer]) -> ImageBuffer {
        let def = kind.def();
        let params = params.resolve(&def.params).unwrap();
        let inputs: Vec<SharedImage> = inputs.iter().cloned().map(SharedImage::new).collect();
        def.evaluate(&params, &inputs, &EvalContext::new(2, 2))
            .unwrap()
            .remove(0)
    }

    fn blend(mode: &str, factor: f64, base: Color, layer: Color) -> Color {
        let params = ParamSet::new().with("mode", mode).with("factor", factor);
        eval(OperatorKind::Blend, params, &[solid(base), solid(layer)])
            .as_color()
            .unwrap()
            .get(0, 0)
    }

    #[test]
    fn blend_normal_full_factor_is_layer() {
        let c = blend("normal", 1.0, Color::gray(0.2), Color::rgb(0.9, 0.1, 0.5));
        assert!(approx_eq(c.r, 0.9) && approx_eq(c.g, 0.1) && approx_eq(c.b, 0.5));
    }

    #[test]
    fn blend_multiply_half_factor() {
        // mixed = 0.5 * 0.4 = 0.2; out = 0.5 * 0.5 + 0.2 * 0.5 = 0.35
        let c = blend("multiply", 0.5, Color::gray(0.5), Color::gray(0.4));
        assert!(approx_eq(c.r, 0.35), "got {}", c.r);
    }

    #[test]
    fn blend_output_alpha_is_base_alpha() {
        let c = blend(
            "screen",
            0.7,
            Color::rgba(0.3, 0.3, 0.3, 0.25),
            Color::rgba(0.6, 0.6, 0.6, 1.0),
        );
        assert!(approx_eq(c.a, 0.25));
    }

    #[test]
    fn blend_layer_alpha_scales_weight() {
        let c = blend("normal", 1.0, Color::black(), Color::rgba(1.0, 1.0, 1.0, 0.5));
        assert!(approx_eq(c.r, 0.5));
    }

    #[test]
    fn blend_addition_and_subtract_clamp() {
        let c = blend("addition", 1.0, Color::gray(0.7), Color::gray(0.6));
        assert!(approx_eq(c.r, 1.0));
        let c = blend("subtract", 1.0, Color::gray(0.3), Color::gray(0.6));
        assert!(approx_eq(c.r, 0.0));
    }

    #[test]
    fn blend_zero_factor_is_base() {
        for mode in BLEND_MODES {
            let c = blend(mode, 0.0, Color::rgb(0.1, 0.2, 0.3), Color::gray(0.9));
            assert!(approx_eq(c.g, 0.2), "mode {}", mode);
        }
    }

    #[test]
    fn mask_interpolates() {
        let out = eval(
            OperatorKind::Mask,
            ParamSet::new(),
            &[solid(Color::black()), solid(Color::white()), gray(0.25)],
        );
        assert!(approx_eq(out.as_color().unwrap().get(0, 0).r, 0.25));

        let out = eval(
            OperatorKind::Mask,
            ParamSet::new().with("invert", true),
            &[solid(Color::black()), solid(Color::white()), gray(0.25)],
        );
        assert!(approx_eq(out.as_color().unwrap().get(0, 0).r, 0.75));
    }

    #[test]
    fn combine_builds_rgba() {
        let out = eval(
            OperatorKind::Combine,
            ParamSet::new(),
            &[gray(0.1), gray(0.2), gray(0.3), gray(0.4)],
        );
        assert_eq!(out.as_color().unwrap().get(1, 0), Color::rgba(0.1, 0.2, 0.3, 0.4));
    }

    #[test]
    fn add_sums_any_number_of_inputs() {
        let out = eval(
            OperatorKind::Add,
            ParamSet::new().with("clamp", false),
            &[gray(0.5), gray(0.25), gray(0.5)],
        );
        assert!(approx_eq(out.as_grayscale().unwrap().get(0, 0), 1.25));

        let out = eval(OperatorKind::Add, ParamSet::new(), &[gray(0.5), gray(0.75)]);
        assert!(approx_eq(out.as_grayscale().unwrap().get(0, 0), 1.0));
    }
}
