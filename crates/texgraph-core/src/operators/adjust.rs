//! Per-pixel color and value adjustments.

use crate::buffer::{ImageBuffer, SharedImage, TextureBuffer};
use crate::color::Color;
use crate::error::OperatorError;
use crate::params::{Gradient, ParamSet, ParamSpec};

use super::{color_input, gray_input, EvalContext};

pub(super) fn eval_invert(
    _params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let input = color_input(inputs, 0)?;
    let out = input.map(|c| c.map_rgb(|v| 1.0 - v));
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn threshold_params() -> Vec<ParamSpec> {
    vec![ParamSpec::scalar("threshold", 0.5, 0.0, 1.0)]
}

pub(super) fn eval_threshold(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let threshold = params.scalar("threshold")?;
    let input = gray_input(inputs, 0)?;
    let out = input.map(|v| if v >= threshold { 1.0 } else { 0.0 });
    Ok(vec![ImageBuffer::Grayscale(out)])
}

pub(super) fn levels_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::scalar("in_low", 0.0, 0.0, 1.0),
        ParamSpec::scalar("in_high", 1.0, 0.0, 1.0),
        ParamSpec::scalar("gamma", 1.0, 0.1, 10.0),
        ParamSpec::scalar("out_low", 0.0, 0.0, 1.0),
        ParamSpec::scalar("out_high", 1.0, 0.0, 1.0),
    ]
}

pub(super) fn eval_levels(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let in_low = params.scalar("in_low")?;
    let in_high = params.scalar("in_high")?;
    let gamma = params.scalar("gamma")?;
    let out_low = params.scalar("out_low")?;
    let out_high = params.scalar("out_high")?;

    let range = in_high - in_low;
    if range.abs() < f64::EPSILON {
        return Err(OperatorError::new(format!(
            "degenerate input range: in_low and in_high are both {}",
            in_low
        )));
    }

    let input = color_input(inputs, 0)?;
    let out = input.map(|c| {
        c.map_rgb(|v| {
            let t = ((v - in_low) / range).clamp(0.0, 1.0).powf(1.0 / gamma);
            out_low + (out_high - out_low) * t
        })
    });
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn curves_params() -> Vec<ParamSpec> {
    vec![ParamSpec::curve("curve")]
}

pub(super) fn eval_curves(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let curve = params.curve("curve")?;
    let input = color_input(inputs, 0)?;
    let out = input.map(|c| c.map_rgb(|v| curve.eval(v)));
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn color_correct_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::scalar("brightness", 0.0, -1.0, 1.0),
        ParamSpec::scalar("contrast", 1.0, 0.0, 5.0),
        ParamSpec::scalar("hue_shift", 0.0, -180.0, 180.0).describe("Degrees."),
        ParamSpec::scalar("saturation", 1.0, 0.0, 2.0),
        ParamSpec::scalar("gamma", 1.0, 1.0 / 256.0, 3.0),
    ]
}

/// O = ((I - 0.5) * contrast + brightness) + 0.5, then hue/saturation in HSV,
/// then gamma. Clamped to [0, 1] after each stage.
pub(super) fn eval_color_correct(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let brightness = params.scalar("brightness")?;
    let contrast = params.scalar("contrast")?;
    let hue_shift = params.scalar("hue_shift")?;
    let saturation = params.scalar("saturation")?;
    let gamma = params.scalar("gamma")?;

    let input = color_input(inputs, 0)?;
    let out = input.map(|c| {
        let c = c.map_rgb(|v| ((v - 0.5) * contrast + brightness + 0.5).clamp(0.0, 1.0));
        let mut hsv = c.hsv().rotate(hue_shift);
        hsv.s = (hsv.s * saturation).clamp(0.0, 1.0);
        Color::from(hsv).map_rgb(|v| v.clamp(0.0, 1.0).powf(1.0 / gamma))
    });
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn colorize_params() -> Vec<ParamSpec> {
    vec![ParamSpec::gradient("gradient", Gradient::grayscale())]
}

pub(super) fn eval_colorize(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let ramp = params.gradient("gradient")?;
    let input = gray_input(inputs, 0)?;
    let out = input.map(|v| ramp.sample(v));
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn eval_to_grayscale(
    _params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let input = color_input(inputs, 0)?;
    Ok(vec![ImageBuffer::Grayscale(input.to_grayscale())])
}

pub(super) fn math_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::choice(
            "function",
            "add",
            &["add", "multiply", "subtract_from", "power"],
        ),
        ParamSpec::scalar("a", 0.0, -16.0, 16.0),
        ParamSpec::boolean("red", true),
        ParamSpec::boolean("green", true),
        ParamSpec::boolean("blue", true),
        ParamSpec::boolean("alpha", false),
    ]
}

/// Non-finite results (a negative base raised to a fractional power, say)
/// fail the output check and surface as an evaluation failure.
pub(super) fn eval_math(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let a = params.scalar("a")?;
    let f: fn(f64, f64) -> f64 = match params.choice("function")? {
        "add" => |i, k| i + k,
        "multiply" => |i, k| i * k,
        "subtract_from" => |i, k| k - i,
        "power" => f64::powf,
        other => return Err(OperatorError::new(format!("unknown math function '{}'", other))),
    };
    let mask = [
        params.flag("red")?,
        params.flag("green")?,
        params.flag("blue")?,
        params.flag("alpha")?,
    ];
    let apply = |on: bool, v: f64| if on { f(v, a) } else { v };

    let input = color_input(inputs, 0)?;
    let out = input.map(|c| {
        Color::rgba(
            apply(mask[0], c.r),
            apply(mask[1], c.g),
            apply(mask[2], c.b),
            apply(mask[3], c.a),
        )
    });
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn modulus_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::scalar("modulus", 0.5, 0.01, 1.0),
        ParamSpec::boolean("normalize", true).describe("Stretch [0, modulus) back to [0, 1)."),
        ParamSpec::integer("x_bias", 0, 0, 64)
            .describe("Adds a horizontal ramp of this many periods before wrapping."),
    ]
}

pub(super) fn eval_modulus(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let m = params.scalar("modulus")?;
    let scale = if params.flag("normalize")? { 1.0 / m } else { 1.0 };
    let periods = params.integer("x_bias")? as f64;
    let input = color_input(inputs, 0)?;
    let width = f64::from(input.width);

    let out = TextureBuffer::from_fn(input.width, input.height, |x, y| {
        let bias = f64::from(x) / width * m * periods;
        input
            .get(x, y)
            .map_rgb(|v| ((v + bias) % m * scale).clamp(0.0, 1.0))
    });
    Ok(vec![ImageBuffer::Color(out)])
}
