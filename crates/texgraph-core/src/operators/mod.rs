//! The fixed operator library.
//!
//! Every operator kind has a static [`OperatorDef`] in the registry: its
//! sockets, arity, parameter schema and the pure function that evaluates it.
//! Adding an operator is one enum variant plus one registry entry.

mod adjust;
mod combine;
mod filters;
mod generators;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::buffer::{ChannelType, GrayscaleBuffer, ImageBuffer, SharedImage, TextureBuffer};
use crate::color::Color;
use crate::error::{GraphError, OperatorError};
use crate::params::{ParamSet, ParamSpec};

/// Resolution and other per-pass inputs shared by all operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalContext {
    pub width: u32,
    pub height: u32,
}

impl EvalContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Evaluation function: inputs are already coerced to the declared socket
/// types and sized to the context resolution.
pub type EvalFn =
    fn(&ParamSet, &[SharedImage], &EvalContext) -> Result<Vec<ImageBuffer>, OperatorError>;

/// Value used for an input socket that has no incoming connection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketDefault {
    Gray(f64),
    Color(Color),
}

impl SocketDefault {
    /// Materialize the default as a buffer of the socket's channel type.
    pub fn to_buffer(self, channel: ChannelType, ctx: &EvalContext) -> ImageBuffer {
        let buf = match self {
            SocketDefault::Gray(v) => {
                ImageBuffer::Grayscale(GrayscaleBuffer::new(ctx.width, ctx.height, v))
            }
            SocketDefault::Color(c) => {
                ImageBuffer::Color(TextureBuffer::new(ctx.width, ctx.height, c))
            }
        };
        buf.coerce(channel)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSocket {
    pub name: &'static str,
    pub channel: ChannelType,
    pub default: SocketDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSocket {
    pub name: &'static str,
    pub channel: ChannelType,
}

/// Number of input sockets an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Arity {
    /// Exactly the declared inputs.
    Fixed,
    /// The single declared input repeated at least `min` times.
    Variadic { min: usize },
}

/// Static description of one operator kind.
#[derive(Clone, Serialize)]
pub struct OperatorDef {
    pub kind: OperatorKind,
    pub label: &'static str,
    pub description: &'static str,
    pub inputs: Vec<InputSocket>,
    pub outputs: Vec<OutputSocket>,
    pub arity: Arity,
    pub params: Vec<ParamSpec>,
    #[serde(skip)]
    eval: EvalFn,
}

impl fmt::Debug for OperatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorDef")
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl OperatorDef {
    /// Number of inputs a freshly added node gets.
    pub fn default_input_count(&self) -> usize {
        match self.arity {
            Arity::Fixed => self.inputs.len(),
            Arity::Variadic { min } => min,
        }
    }

    /// Socket description for input `index` on a node with `count` inputs.
    pub fn input(&self, index: usize, count: usize) -> Option<&InputSocket> {
        if index >= count {
            return None;
        }
        match self.arity {
            Arity::Fixed => self.inputs.get(index),
            Arity::Variadic { .. } => self.inputs.first(),
        }
    }

    pub fn output(&self, index: usize) -> Option<&OutputSocket> {
        self.outputs.get(index)
    }

    /// Check a requested input count against the declared arity.
    pub fn check_input_count(&self, count: usize) -> Result<(), GraphError> {
        let ok = match self.arity {
            Arity::Fixed => count == self.inputs.len(),
            Arity::Variadic { min } => count >= min,
        };
        if ok {
            Ok(())
        } else {
            Err(GraphError::invalid_param(
                "input_count",
                format!("{} does not accept {} inputs", self.kind, count),
            ))
        }
    }

    /// Run the operator and check its outputs against the declaration.
    pub fn evaluate(
        &self,
        params: &ParamSet,
        inputs: &[SharedImage],
        ctx: &EvalContext,
    ) -> Result<Vec<ImageBuffer>, OperatorError> {
        let outputs = (self.eval)(params, inputs, ctx)?;
        if outputs.len() != self.outputs.len() {
            return Err(OperatorError::new(format!(
                "{} produced {} outputs, expected {}",
                self.kind,
                outputs.len(),
                self.outputs.len()
            )));
        }
        for (out, decl) in outputs.iter().zip(&self.outputs) {
            if out.channel_type() != decl.channel {
                return Err(OperatorError::new(format!(
                    "output '{}' is {}, expected {}",
                    decl.name,
                    out.channel_type(),
                    decl.channel
                )));
            }
            if out.resolution() != (ctx.width, ctx.height) {
                return Err(OperatorError::new(format!(
                    "output '{}' is {}x{}, expected {}x{}",
                    decl.name,
                    out.width(),
                    out.height(),
                    ctx.width,
                    ctx.height
                )));
            }
            if !out.is_finite() {
                return Err(OperatorError::new(format!(
                    "output '{}' contains non-finite values",
                    decl.name
                )));
            }
        }
        Ok(outputs)
    }
}

/// The closed set of operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    // Generators
    Constant,
    ConstantColor,
    PerlinNoise,
    Cellular,
    Checker,
    Gradient,
    Brick,
    // Adjustments
    Invert,
    Threshold,
    Levels,
    Curves,
    ColorCorrect,
    Colorize,
    ToGrayscale,
    Math,
    Modulus,
    // Combiners
    Blend,
    Mask,
    Combine,
    Add,
    // Filters and transforms
    Blur,
    Transform,
    NormalMap,
    SplitChannels,
    Warp,
    Emboss,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 26] = [
        OperatorKind::Constant,
        OperatorKind::ConstantColor,
        OperatorKind::PerlinNoise,
        OperatorKind::Cellular,
        OperatorKind::Checker,
        OperatorKind::Gradient,
        OperatorKind::Brick,
        OperatorKind::Invert,
        OperatorKind::Threshold,
        OperatorKind::Levels,
        OperatorKind::Curves,
        OperatorKind::ColorCorrect,
        OperatorKind::Colorize,
        OperatorKind::ToGrayscale,
        OperatorKind::Math,
        OperatorKind::Modulus,
        OperatorKind::Blend,
        OperatorKind::Mask,
        OperatorKind::Combine,
        OperatorKind::Add,
        OperatorKind::Blur,
        OperatorKind::Transform,
        OperatorKind::NormalMap,
        OperatorKind::SplitChannels,
        OperatorKind::Warp,
        OperatorKind::Emboss,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperatorKind::Constant => "constant",
            OperatorKind::ConstantColor => "constant_color",
            OperatorKind::PerlinNoise => "perlin_noise",
            OperatorKind::Cellular => "cellular",
            OperatorKind::Checker => "checker",
            OperatorKind::Gradient => "gradient",
            OperatorKind::Brick => "brick",
            OperatorKind::Invert => "invert",
            OperatorKind::Threshold => "threshold",
            OperatorKind::Levels => "levels",
            OperatorKind::Curves => "curves",
            OperatorKind::ColorCorrect => "color_correct",
            OperatorKind::Colorize => "colorize",
            OperatorKind::ToGrayscale => "to_grayscale",
            OperatorKind::Math => "math",
            OperatorKind::Modulus => "modulus",
            OperatorKind::Blend => "blend",
            OperatorKind::Mask => "mask",
            OperatorKind::Combine => "combine",
            OperatorKind::Add => "add",
            OperatorKind::Blur => "blur",
            OperatorKind::Transform => "transform",
            OperatorKind::NormalMap => "normal_map",
            OperatorKind::SplitChannels => "split_channels",
            OperatorKind::Warp => "warp",
            OperatorKind::Emboss => "emboss",
        }
    }

    /// Registry entry for this kind.
    pub fn def(self) -> &'static OperatorDef {
        let registry = registry();
        // ALL and the registry are built in the same order.
        &registry[self as usize]
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperatorKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| GraphError::InvalidOperatorKind(s.to_string()))
    }
}

/// All operator definitions, in [`OperatorKind::ALL`] order.
pub fn registry() -> &'static [OperatorDef] {
    static REGISTRY: OnceLock<Vec<OperatorDef>> = OnceLock::new();
    REGISTRY.get_or_init(|| OperatorKind::ALL.iter().map(|&k| build_def(k)).collect())
}

fn input(name: &'static str, channel: ChannelType, default: SocketDefault) -> InputSocket {
    InputSocket {
        name,
        channel,
        default,
    }
}

fn output(name: &'static str, channel: ChannelType) -> OutputSocket {
    OutputSocket { name, channel }
}

const GRAY: ChannelType = ChannelType::Grayscale;
const COLOR: ChannelType = ChannelType::Color;

fn build_def(kind: OperatorKind) -> OperatorDef {
    let fixed = |label: &'static str,
                 description: &'static str,
                 inputs: Vec<InputSocket>,
                 outputs: Vec<OutputSocket>,
                 params: Vec<ParamSpec>,
                 eval: EvalFn| OperatorDef {
        kind,
        label,
        description,
        inputs,
        outputs,
        arity: Arity::Fixed,
        params,
        eval,
    };

    match kind {
        // -----------------------------------------------------------------
        // Generators
        // -----------------------------------------------------------------
        OperatorKind::Constant => fixed(
            "Constant",
            "Uniform grayscale value.",
            vec![],
            vec![output("out", GRAY)],
            generators::constant_params(),
            generators::eval_constant,
        ),
        OperatorKind::ConstantColor => fixed(
            "Constant Color",
            "Uniform color.",
            vec![],
            vec![output("out", COLOR)],
            generators::constant_color_params(),
            generators::eval_constant_color,
        ),
        OperatorKind::PerlinNoise => fixed(
            "Perlin Noise",
            "Seeded fractal gradient noise. Octaves double in frequency.",
            vec![],
            vec![output("out", GRAY)],
            generators::perlin_params(),
            generators::eval_perlin_noise,
        ),
        OperatorKind::Cellular => fixed(
            "Cellular",
            "Seeded Worley noise.",
            vec![],
            vec![output("out", GRAY)],
            generators::cellular_params(),
            generators::eval_cellular,
        ),
        OperatorKind::Checker => fixed(
            "Checker",
            "Two-color checkerboard.",
            vec![],
            vec![output("out", COLOR)],
            generators::checker_params(),
            generators::eval_checker,
        ),
        OperatorKind::Gradient => fixed(
            "Gradient",
            "Linear or radial ramp between two values.",
            vec![],
            vec![output("out", GRAY)],
            generators::gradient_params(),
            generators::eval_gradient,
        ),
        OperatorKind::Brick => fixed(
            "Brick",
            "Staggered brick rows with mortar gaps, mapped through a color ramp.",
            vec![],
            vec![output("out", COLOR)],
            generators::brick_params(),
            generators::eval_brick,
        ),

        // -----------------------------------------------------------------
        // Adjustments
        // -----------------------------------------------------------------
        OperatorKind::Invert => fixed(
            "Invert",
            "O = 1 - I on RGB; alpha is kept.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", COLOR)],
            vec![],
            adjust::eval_invert,
        ),
        OperatorKind::Threshold => fixed(
            "Threshold",
            "1 where the input reaches the threshold, else 0.",
            vec![input("in", GRAY, SocketDefault::Gray(0.0))],
            vec![output("out", GRAY)],
            adjust::threshold_params(),
            adjust::eval_threshold,
        ),
        OperatorKind::Levels => fixed(
            "Levels",
            "Remaps [in_low, in_high] to [out_low, out_high] with gamma.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", COLOR)],
            adjust::levels_params(),
            adjust::eval_levels,
        ),
        OperatorKind::Curves => fixed(
            "Curves",
            "Applies a piecewise-linear transfer curve to RGB.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", COLOR)],
            adjust::curves_params(),
            adjust::eval_curves,
        ),
        OperatorKind::ColorCorrect => fixed(
            "Color Correct",
            "Brightness, contrast, hue, saturation and gamma.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", COLOR)],
            adjust::color_correct_params(),
            adjust::eval_color_correct,
        ),
        OperatorKind::Colorize => fixed(
            "Colorize",
            "Maps grayscale through a color ramp.",
            vec![input("in", GRAY, SocketDefault::Gray(0.0))],
            vec![output("out", COLOR)],
            adjust::colorize_params(),
            adjust::eval_colorize,
        ),
        OperatorKind::ToGrayscale => fixed(
            "To Grayscale",
            "Luminance of the input.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", GRAY)],
            vec![],
            adjust::eval_to_grayscale,
        ),
        OperatorKind::Math => fixed(
            "Math",
            "Per-channel I + a, I * a, a - I or I ^ a.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", COLOR)],
            adjust::math_params(),
            adjust::eval_math,
        ),
        OperatorKind::Modulus => fixed(
            "Modulus",
            "RGB wrapped by a modulus, optionally rescaled to [0, 1].",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", COLOR)],
            adjust::modulus_params(),
            adjust::eval_modulus,
        ),

        // -----------------------------------------------------------------
        // Combiners
        // -----------------------------------------------------------------
        OperatorKind::Blend => fixed(
            "Blend",
            "Layers the second input over the first. Layer alpha times factor \
             is the blend weight; output alpha is the base alpha.",
            vec![
                input("base", COLOR, SocketDefault::Color(Color::gray(0.5))),
                input("layer", COLOR, SocketDefault::Color(Color::white())),
            ],
            vec![output("out", COLOR)],
            combine::blend_params(),
            combine::eval_blend,
        ),
        OperatorKind::Mask => fixed(
            "Mask",
            "O = (1 - m) * a + m * b.",
            vec![
                input("a", COLOR, SocketDefault::Color(Color::black())),
                input("b", COLOR, SocketDefault::Color(Color::white())),
                input("mask", GRAY, SocketDefault::Gray(0.5)),
            ],
            vec![output("out", COLOR)],
            combine::mask_params(),
            combine::eval_mask,
        ),
        OperatorKind::Combine => fixed(
            "Combine",
            "Builds RGBA from four grayscale inputs.",
            vec![
                input("r", GRAY, SocketDefault::Gray(0.0)),
                input("g", GRAY, SocketDefault::Gray(0.0)),
                input("b", GRAY, SocketDefault::Gray(0.0)),
                input("a", GRAY, SocketDefault::Gray(1.0)),
            ],
            vec![output("out", COLOR)],
            vec![],
            combine::eval_combine,
        ),
        OperatorKind::Add => OperatorDef {
            kind,
            label: "Add",
            description: "Sum of any number of grayscale inputs.",
            inputs: vec![input("in", GRAY, SocketDefault::Gray(0.0))],
            outputs: vec![output("out", GRAY)],
            arity: Arity::Variadic { min: 2 },
            params: combine::add_params(),
            eval: combine::eval_add,
        },

        // -----------------------------------------------------------------
        // Filters and transforms
        // -----------------------------------------------------------------
        OperatorKind::Blur => fixed(
            "Blur",
            "Three-pass box blur; radius is a fraction of the width.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", COLOR)],
            filters::blur_params(),
            filters::eval_blur,
        ),
        OperatorKind::Transform => fixed(
            "Transform",
            "Scale, rotate and offset with wrapped bilinear sampling.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![output("out", COLOR)],
            filters::transform_params(),
            filters::eval_transform,
        ),
        OperatorKind::NormalMap => fixed(
            "Normal Map",
            "Tangent-space normals from a height field (Sobel).",
            vec![input("height", GRAY, SocketDefault::Gray(0.5))],
            vec![output("out", ChannelType::Normal)],
            filters::normal_map_params(),
            filters::eval_normal_map,
        ),
        OperatorKind::SplitChannels => fixed(
            "Split Channels",
            "Separates RGBA into four grayscale outputs.",
            vec![input("in", COLOR, SocketDefault::Color(Color::black()))],
            vec![
                output("r", GRAY),
                output("g", GRAY),
                output("b", GRAY),
                output("a", GRAY),
            ],
            vec![],
            filters::eval_split_channels,
        ),
        OperatorKind::Warp => fixed(
            "Warp",
            "Offsets lookups into the input by the gradient of a height field.",
            vec![
                input("in", COLOR, SocketDefault::Color(Color::black())),
                input("height", GRAY, SocketDefault::Gray(0.5)),
            ],
            vec![output("out", COLOR)],
            filters::warp_params(),
            filters::eval_warp,
        ),
        OperatorKind::Emboss => fixed(
            "Emboss",
            "Lightens or darkens RGB along a light direction using a height field's gradient.",
            vec![
                input("in", COLOR, SocketDefault::Color(Color::gray(0.5))),
                input("height", GRAY, SocketDefault::Gray(0.5)),
            ],
            vec![output("out", COLOR)],
            filters::emboss_params(),
            filters::eval_emboss,
        ),
    }
}

pub(crate) fn gray_input<'a>(
    inputs: &'a [SharedImage],
    index: usize,
) -> Result<&'a GrayscaleBuffer, OperatorError> {
    inputs
        .get(index)
        .and_then(|b| b.as_grayscale())
        .ok_or_else(|| OperatorError::new(format!("input {} is not a grayscale buffer", index)))
}

pub(crate) fn color_input<'a>(
    inputs: &'a [SharedImage],
    index: usize,
) -> Result<&'a TextureBuffer, OperatorError> {
    inputs
        .get(index)
        .and_then(|b| b.as_color())
        .ok_or_else(|| OperatorError::new(format!("input {} is not a color buffer", index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kind: OperatorKind, params: ParamSet, inputs: &[ImageBuffer]) -> Vec<ImageBuffer> {
        let def = kind.def();
        let params = params.resolve(&def.params).unwrap();
        let inputs: Vec<SharedImage> = inputs.iter().cloned().map(SharedImage::new).collect();
        def.evaluate(&params, &inputs, &EvalContext::new(8, 8)).unwrap()
    }

    #[test]
    fn test_registry_matches_kind_order() {
        for kind in OperatorKind::ALL {
            assert_eq!(kind.def().kind, kind);
        }
    }

    #[test]
    fn test_tags_round_trip() {
        for kind in OperatorKind::ALL {
            assert_eq!(kind.as_str().parse::<OperatorKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        let err = "hologram".parse::<OperatorKind>().unwrap_err();
        assert_eq!(err, GraphError::InvalidOperatorKind("hologram".to_string()));
    }

    #[test]
    fn test_defaults_validate_against_schema() {
        for def in registry() {
            for spec in &def.params {
                spec.validate(&spec.default).unwrap_or_else(|e| {
                    panic!("{}: default for '{}' invalid: {}", def.kind, spec.name, e)
                });
            }
        }
    }

    #[test]
    fn test_every_operator_runs_on_defaults() {
        let ctx = EvalContext::new(8, 8);
        for def in registry() {
            let count = def.default_input_count();
            let inputs: Vec<ImageBuffer> = (0..count)
                .map(|i| {
                    let socket = def.input(i, count).unwrap();
                    socket.default.to_buffer(socket.channel, &ctx)
                })
                .collect();
            let outputs = run(def.kind, ParamSet::new(), &inputs);
            assert_eq!(outputs.len(), def.outputs.len(), "{}", def.kind);
        }
    }

    #[test]
    fn test_variadic_input_lookup() {
        let def = OperatorKind::Add.def();
        assert_eq!(def.default_input_count(), 2);
        assert!(def.input(4, 5).is_some());
        assert!(def.input(5, 5).is_none());
        assert!(def.check_input_count(1).is_err());
        assert!(def.check_input_count(6).is_ok());

        let blend = OperatorKind::Blend.def();
        assert!(blend.check_input_count(3).is_err());
    }

    #[test]
    fn test_schema_serializes() {
        let json = serde_json::to_value(OperatorKind::Blend.def()).unwrap();
        assert_eq!(json["kind"], "blend");
        assert_eq!(json["inputs"][1]["name"], "layer");
        assert_eq!(json["params"][0]["name"], "mode");
        assert_eq!(json["params"][0]["type"], "enum");
    }
}
