//! Neighbourhood filters and geometric transforms.

use crate::buffer::{GrayscaleBuffer, ImageBuffer, SharedImage, TextureBuffer};
use crate::color::Color;
use crate::error::OperatorError;
use crate::params::{ParamSet, ParamSpec};

use super::{color_input, gray_input, EvalContext};

pub(super) fn blur_params() -> Vec<ParamSpec> {
    vec![ParamSpec::scalar("radius", 0.01, 0.0, 0.25).describe("Fraction of the width.")]
}

fn channels(c: Color) -> [f64; 4] {
    [c.r, c.g, c.b, c.a]
}

/// One box pass of width `2r + 1` along x (`horizontal`) or y. Edges wrap,
/// so a tileable input stays tileable.
fn box_pass(src: &TextureBuffer, r: i32, horizontal: bool) -> TextureBuffer {
    let (w, h) = (src.width as i32, src.height as i32);
    let (lines, len) = if horizontal { (h, w) } else { (w, h) };
    let at = |line: i32, i: i32| {
        if horizontal {
            src.get_wrapped(i, line)
        } else {
            src.get_wrapped(line, i)
        }
    };
    let norm = 1.0 / f64::from(2 * r + 1);

    let mut out = src.clone();
    for line in 0..lines {
        let mut acc = [0.0; 4];
        for i in -r..=r {
            for (a, v) in acc.iter_mut().zip(channels(at(line, i))) {
                *a += v;
            }
        }
        for i in 0..len {
            let [cr, cg, cb, ca] = acc.map(|v| v * norm);
            let (x, y) = if horizontal { (i, line) } else { (line, i) };
            out.set(x as u32, y as u32, Color::rgba(cr, cg, cb, ca));

            let leaving = channels(at(line, i - r));
            let entering = channels(at(line, i + r + 1));
            for ((a, e), l) in acc.iter_mut().zip(entering).zip(leaving) {
                *a += e - l;
            }
        }
    }
    out
}

pub(super) fn eval_blur(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let input = color_input(inputs, 0)?;
    let r = (params.scalar("radius")? * f64::from(input.width)).round() as i32;
    if r == 0 {
        return Ok(vec![ImageBuffer::Color(input.clone())]);
    }

    // Three box passes per axis approximate a Gaussian.
    let mut out = input.clone();
    for _ in 0..3 {
        out = box_pass(&box_pass(&out, r, true), r, false);
    }
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn transform_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::scalar("scale_x", 1.0, 0.01, 100.0),
        ParamSpec::scalar("scale_y", 1.0, 0.01, 100.0),
        ParamSpec::scalar("rotation", 0.0, -360.0, 360.0).describe("Degrees."),
        ParamSpec::scalar("offset_x", 0.0, -1.0, 1.0),
        ParamSpec::scalar("offset_y", 0.0, -1.0, 1.0),
    ]
}

/// Samples the input at the inverse-transformed position of each pixel,
/// about the texture center, wrapping at the borders.
pub(super) fn eval_transform(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let input = color_input(inputs, 0)?;
    let scale_x = params.scalar("scale_x")?;
    let scale_y = params.scalar("scale_y")?;
    let angle = params.scalar("rotation")?.to_radians();
    let offset_x = params.scalar("offset_x")?;
    let offset_y = params.scalar("offset_y")?;

    let w = input.width as f64;
    let h = input.height as f64;
    let (sin_a, cos_a) = (-angle).sin_cos();

    let out = TextureBuffer::from_fn(input.width, input.height, |x, y| {
        let dx = (x as f64 + 0.5) / w - 0.5 - offset_x;
        let dy = (y as f64 + 0.5) / h - 0.5 - offset_y;
        let rx = (dx * cos_a - dy * sin_a) / scale_x;
        let ry = (dx * sin_a + dy * cos_a) / scale_y;
        input.sample_wrapped((rx + 0.5) * w - 0.5, (ry + 0.5) * h - 0.5)
    });
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn normal_map_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::scalar("strength", 1.0, 0.0, 32.0),
        ParamSpec::boolean("invert", false),
    ]
}

/// Sobel gradient of a wrapped height field, Y-up tangent space.
fn sobel_normal(height: &GrayscaleBuffer, x: i32, y: i32, strength: f64, invert: bool) -> Color {
    let mut s = [[0.0; 3]; 3];
    for (dy, row) in s.iter_mut().enumerate() {
        for (dx, sample) in row.iter_mut().enumerate() {
            let v = height.get_wrapped(x + dx as i32 - 1, y + dy as i32 - 1);
            *sample = if invert { 1.0 - v } else { v };
        }
    }

    // Gx = | -1 0 1 |   Gy = | -1 -2 -1 |
    //      | -2 0 2 |        |  0  0  0 |
    //      | -1 0 1 |        |  1  2  1 |
    let gx = (s[0][2] + 2.0 * s[1][2] + s[2][2]) - (s[0][0] + 2.0 * s[1][0] + s[2][0]);
    let gy = (s[2][0] + 2.0 * s[2][1] + s[2][2]) - (s[0][0] + 2.0 * s[0][1] + s[0][2]);

    let n = [-gx * strength, gy * strength, 1.0];
    let inv_len = n.iter().map(|v| v * v).sum::<f64>().sqrt().recip();
    let [r, g, b] = n.map(|v| 0.5 + 0.5 * v * inv_len);
    Color::rgb(r, g, b)
}

pub(super) fn eval_normal_map(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let strength = params.scalar("strength")?;
    let invert = params.flag("invert")?;
    let height = gray_input(inputs, 0)?;

    let out = TextureBuffer::from_fn(height.width, height.height, |x, y| {
        sobel_normal(height, x as i32, y as i32, strength, invert)
    });
    Ok(vec![ImageBuffer::Normal(out)])
}

pub(super) fn eval_split_channels(
    _params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let input = color_input(inputs, 0)?;
    let plane = |f: fn(Color) -> f64| ImageBuffer::Grayscale(input.map(f));
    Ok(vec![
        plane(|c| c.r),
        plane(|c| c.g),
        plane(|c| c.b),
        plane(|c| c.a),
    ])
}

/// Central differences of a wrapped height field, per pixel.
fn slope(height: &GrayscaleBuffer, x: i32, y: i32) -> (f64, f64) {
    let du = height.get_wrapped(x + 1, y) - height.get_wrapped(x - 1, y);
    let dv = height.get_wrapped(x, y + 1) - height.get_wrapped(x, y - 1);
    (0.5 * du, 0.5 * dv)
}

pub(super) fn warp_params() -> Vec<ParamSpec> {
    vec![ParamSpec::scalar("strength", 1.0, 0.0, 8.0)
        .describe("Displacement in texture widths per unit of height change per pixel.")]
}

pub(super) fn eval_warp(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let strength = params.scalar("strength")?;
    let input = color_input(inputs, 0)?;
    let height = gray_input(inputs, 1)?;
    let (w, h) = (f64::from(input.width), f64::from(input.height));

    let out = TextureBuffer::from_fn(input.width, input.height, |x, y| {
        let (du, dv) = slope(height, x as i32, y as i32);
        input.sample_wrapped(
            f64::from(x) + du * strength * w,
            f64::from(y) + dv * strength * h,
        )
    });
    Ok(vec![ImageBuffer::Color(out)])
}

pub(super) fn emboss_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::scalar("strength", 8.0, 0.0, 64.0),
        ParamSpec::scalar("angle", 45.0, 0.0, 360.0).describe("Light direction in degrees."),
    ]
}

pub(super) fn eval_emboss(
    params: &ParamSet,
    inputs: &[SharedImage],
    _ctx: &EvalContext,
) -> Result<Vec<ImageBuffer>, OperatorError> {
    let strength = params.scalar("strength")?;
    let (sin, cos) = params.scalar("angle")?.to_radians().sin_cos();
    let input = color_input(inputs, 0)?;
    let height = gray_input(inputs, 1)?;

    let out = TextureBuffer::from_fn(input.width, input.height, |x, y| {
        let (du, dv) = slope(height, x as i32, y as i32);
        let lift = strength * (du * cos + dv * sin);
        input
            .get(x, y)
            .map_rgb(|v| (v + lift).clamp(0.0, 1.0))
    });
    Ok(vec![ImageBuffer::Color(out)])
}
