//! Operator parameters: typed values, declared domains and per-node sets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{GraphError, OperatorError};

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Scalar(f64),
    Integer(i64),
    Bool(bool),
    Color(Color),
    Enum(String),
    Curve(Curve),
    Gradient(Gradient),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Scalar(_) => "scalar",
            ParamValue::Integer(_) => "integer",
            ParamValue::Bool(_) => "bool",
            ParamValue::Color(_) => "color",
            ParamValue::Enum(_) => "enum",
            ParamValue::Curve(_) => "curve",
            ParamValue::Gradient(_) => "gradient",
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Scalar(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Integer(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<Color> for ParamValue {
    fn from(v: Color) -> Self {
        ParamValue::Color(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Enum(v.to_string())
    }
}

impl From<Curve> for ParamValue {
    fn from(v: Curve) -> Self {
        ParamValue::Curve(v)
    }
}

impl From<Gradient> for ParamValue {
    fn from(v: Gradient) -> Self {
        ParamValue::Gradient(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Scalar(v) => write!(f, "{}", v),
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Color(c) => write!(f, "rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),
            ParamValue::Enum(v) => f.write_str(v),
            ParamValue::Curve(c) => write!(f, "curve({} points)", c.points().len()),
            ParamValue::Gradient(g) => write!(f, "gradient({} stops)", g.stops().len()),
        }
    }
}

/// Piecewise-linear transfer curve over [0, 1].
///
/// Control points are sorted by strictly increasing `x`, all coordinates lie
/// in [0, 1], and there are at least two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Curve {
    points: Vec<[f64; 2]>,
}

impl Curve {
    pub fn new(points: Vec<[f64; 2]>) -> Result<Self, String> {
        if points.len() < 2 {
            return Err(format!(
                "curve needs at least 2 control points, got {}",
                points.len()
            ));
        }
        for p in &points {
            if !(0.0..=1.0).contains(&p[0]) || !(0.0..=1.0).contains(&p[1]) {
                return Err(format!(
                    "curve point ({}, {}) lies outside [0, 1]",
                    p[0], p[1]
                ));
            }
        }
        if points.windows(2).any(|w| w[1][0] <= w[0][0]) {
            return Err("curve x coordinates must be strictly increasing".to_string());
        }
        Ok(Self { points })
    }

    /// The identity curve `y = x`.
    pub fn identity() -> Self {
        Self {
            points: vec![[0.0, 0.0], [1.0, 1.0]],
        }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    /// Evaluate at `x`, holding the end values outside the control range.
    pub fn eval(&self, x: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if x <= first[0] {
            return first[1];
        }
        if x >= last[0] {
            return last[1];
        }
        // First point with px > x; x is strictly inside so idx >= 1.
        let idx = self.points.partition_point(|p| p[0] <= x);
        let a = self.points[idx - 1];
        let b = self.points[idx];
        let t = (x - a[0]) / (b[0] - a[0]);
        a[1] + (b[1] - a[1]) * t
    }
}

impl TryFrom<Vec<[f64; 2]>> for Curve {
    type Error = String;

    fn try_from(points: Vec<[f64; 2]>) -> Result<Self, Self::Error> {
        Curve::new(points)
    }
}

impl From<Curve> for Vec<[f64; 2]> {
    fn from(curve: Curve) -> Self {
        curve.points
    }
}

/// One color stop of a [`Gradient`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColorStop {
    pub position: f64,
    pub color: Color,
}

impl ColorStop {
    pub fn new(position: f64, color: Color) -> Self {
        Self { position, color }
    }
}

/// Color ramp over [0, 1].
///
/// At least one stop; positions lie in [0, 1] and never decrease. Two stops
/// at the same position make a hard edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColorStop>", into = "Vec<ColorStop>")]
pub struct Gradient {
    stops: Vec<ColorStop>,
}

impl Gradient {
    pub fn new(stops: Vec<ColorStop>) -> Result<Self, String> {
        if stops.is_empty() {
            return Err("gradient needs at least one stop".to_string());
        }
        for stop in &stops {
            if !(0.0..=1.0).contains(&stop.position) {
                return Err(format!("stop position {} lies outside [0, 1]", stop.position));
            }
            let c = stop.color;
            if ![c.r, c.g, c.b, c.a].iter().all(|v| (0.0..=1.0).contains(v)) {
                return Err(format!("stop at {} has a color outside [0, 1]", stop.position));
            }
        }
        if stops.windows(2).any(|w| w[1].position < w[0].position) {
            return Err("stop positions must not decrease".to_string());
        }
        Ok(Self { stops })
    }

    /// Opaque black to opaque white.
    pub fn grayscale() -> Self {
        Self {
            stops: vec![
                ColorStop::new(0.0, Color::black()),
                ColorStop::new(1.0, Color::white()),
            ],
        }
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Color at `t`, holding the end colors outside the stop range.
    pub fn sample(&self, t: f64) -> Color {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return Color::black();
        };
        if t.is_nan() || t <= first.position {
            return first.color;
        }
        if t >= last.position {
            return last.color;
        }
        // first.position < t < last.position, so 1 <= idx < len.
        let idx = self.stops.partition_point(|s| s.position <= t);
        let (a, b) = (self.stops[idx - 1], self.stops[idx]);
        a.color
            .lerp(&b.color, (t - a.position) / (b.position - a.position))
    }
}

impl TryFrom<Vec<ColorStop>> for Gradient {
    type Error = String;

    fn try_from(stops: Vec<ColorStop>) -> Result<Self, Self::Error> {
        Gradient::new(stops)
    }
}

impl From<Gradient> for Vec<ColorStop> {
    fn from(gradient: Gradient) -> Self {
        gradient.stops
    }
}

/// Declared type and valid domain of a parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    Scalar { min: f64, max: f64 },
    Integer { min: i64, max: i64 },
    Bool,
    Color,
    Enum { options: &'static [&'static str] },
    Curve,
    Gradient,
}

/// Schema entry for one operator parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: ParamKind,
    pub default: ParamValue,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn scalar(name: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Scalar { min, max },
            default: ParamValue::Scalar(default),
            description: "",
        }
    }

    pub fn integer(name: &'static str, default: i64, min: i64, max: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Integer { min, max },
            default: ParamValue::Integer(default),
            description: "",
        }
    }

    pub fn boolean(name: &'static str, default: bool) -> Self {
        Self {
            name,
            kind: ParamKind::Bool,
            default: ParamValue::Bool(default),
            description: "",
        }
    }

    pub fn color(name: &'static str, default: Color) -> Self {
        Self {
            name,
            kind: ParamKind::Color,
            default: ParamValue::Color(default),
            description: "",
        }
    }

    pub fn choice(
        name: &'static str,
        default: &'static str,
        options: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            kind: ParamKind::Enum { options },
            default: ParamValue::Enum(default.to_string()),
            description: "",
        }
    }

    pub fn curve(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Curve,
            default: ParamValue::Curve(Curve::identity()),
            description: "",
        }
    }

    pub fn gradient(name: &'static str, default: Gradient) -> Self {
        Self {
            name,
            kind: ParamKind::Gradient,
            default: ParamValue::Gradient(default),
            description: "",
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Check `value` against this parameter's type and domain.
    pub fn validate(&self, value: &ParamValue) -> Result<(), GraphError> {
        let fail = |reason: String| Err(GraphError::invalid_param(self.name, reason));
        match (&self.kind, value) {
            (ParamKind::Scalar { min, max }, ParamValue::Scalar(v)) => {
                if !v.is_finite() {
                    return fail(format!("{} is not a finite number", v));
                }
                if v < min || v > max {
                    return fail(format!("{} is outside [{}, {}]", v, min, max));
                }
                Ok(())
            }
            (ParamKind::Integer { min, max }, ParamValue::Integer(v)) => {
                if v < min || v > max {
                    return fail(format!("{} is outside [{}, {}]", v, min, max));
                }
                Ok(())
            }
            (ParamKind::Bool, ParamValue::Bool(_)) => Ok(()),
            (ParamKind::Color, ParamValue::Color(c)) => {
                let in_range = [c.r, c.g, c.b, c.a]
                    .iter()
                    .all(|v| v.is_finite() && (0.0..=1.0).contains(v));
                if !in_range {
                    return fail("color components must lie in [0, 1]".to_string());
                }
                Ok(())
            }
            (ParamKind::Enum { options }, ParamValue::Enum(v)) => {
                if !options.contains(&v.as_str()) {
                    return fail(format!(
                        "'{}' is not one of [{}]",
                        v,
                        options.join(", ")
                    ));
                }
                Ok(())
            }
            (ParamKind::Curve, ParamValue::Curve(c)) => {
                Curve::new(c.points().to_vec()).map(|_| ()).or_else(fail)
            }
            (ParamKind::Gradient, ParamValue::Gradient(g)) => {
                Gradient::new(g.stops().to_vec()).map(|_| ()).or_else(fail)
            }
            (_, other) => fail(format!(
                "expected {} value, got {}",
                self.kind_name(),
                other.type_name()
            )),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self.kind {
            ParamKind::Scalar { .. } => "scalar",
            ParamKind::Integer { .. } => "integer",
            ParamKind::Bool => "bool",
            ParamKind::Color => "color",
            ParamKind::Enum { .. } => "enum",
            ParamKind::Curve => "curve",
            ParamKind::Gradient => "gradient",
        }
    }
}

/// Named parameter values of one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet(BTreeMap<String, ParamValue>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        self.0.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fill in defaults from `schema` and validate every entry.
    ///
    /// Names not declared by the schema are rejected.
    pub fn resolve(&self, schema: &[ParamSpec]) -> Result<ParamSet, GraphError> {
        for name in self.0.keys() {
            if !schema.iter().any(|s| s.name == name) {
                return Err(GraphError::invalid_param(
                    name.as_str(),
                    "no such parameter for this operator",
                ));
            }
        }
        let mut resolved = ParamSet::new();
        for spec in schema {
            let value = match self.0.get(spec.name) {
                Some(v) => {
                    spec.validate(v)?;
                    v.clone()
                }
                None => spec.default.clone(),
            };
            resolved.0.insert(spec.name.to_string(), value);
        }
        Ok(resolved)
    }

    pub fn scalar(&self, name: &str) -> Result<f64, OperatorError> {
        match self.get(name) {
            Some(ParamValue::Scalar(v)) => Ok(*v),
            Some(ParamValue::Integer(v)) => Ok(*v as f64),
            _ => Err(missing(name, "scalar")),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64, OperatorError> {
        match self.get(name) {
            Some(ParamValue::Integer(v)) => Ok(*v),
            _ => Err(missing(name, "integer")),
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool, OperatorError> {
        match self.get(name) {
            Some(ParamValue::Bool(v)) => Ok(*v),
            _ => Err(missing(name, "bool")),
        }
    }

    pub fn color(&self, name: &str) -> Result<Color, OperatorError> {
        match self.get(name) {
            Some(ParamValue::Color(c)) => Ok(*c),
            _ => Err(missing(name, "color")),
        }
    }

    pub fn choice(&self, name: &str) -> Result<&str, OperatorError> {
        match self.get(name) {
            Some(ParamValue::Enum(v)) => Ok(v.as_str()),
            _ => Err(missing(name, "enum")),
        }
    }

    pub fn curve(&self, name: &str) -> Result<&Curve, OperatorError> {
        match self.get(name) {
            Some(ParamValue::Curve(c)) => Ok(c),
            _ => Err(missing(name, "curve")),
        }
    }

    pub fn gradient(&self, name: &str) -> Result<&Gradient, OperatorError> {
        match self.get(name) {
            Some(ParamValue::Gradient(g)) => Ok(g),
            _ => Err(missing(name, "gradient")),
        }
    }
}

fn missing(name: &str, kind: &str) -> OperatorError {
    OperatorError::new(format!("parameter '{}' is not a resolved {} value", name, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn curve_rejects_bad_control_points() {
        assert!(Curve::new(vec![[0.0, 0.0]]).is_err());
        assert!(Curve::new(vec![[0.5, 0.0], [0.5, 1.0]]).is_err());
        assert!(Curve::new(vec![[0.0, 0.0], [1.2, 1.0]]).is_err());
        assert!(Curve::new(vec![[0.0, 0.0], [0.4, 0.9], [1.0, 1.0]]).is_ok());
    }

    #[test]
    fn curve_eval_is_piecewise_linear() {
        let curve = Curve::new(vec![[0.2, 0.0], [0.6, 1.0], [1.0, 0.5]]).unwrap();
        assert!(approx_eq(curve.eval(0.0), 0.0));
        assert!(approx_eq(curve.eval(0.4), 0.5));
        assert!(approx_eq(curve.eval(0.6), 1.0));
        assert!(approx_eq(curve.eval(0.8), 0.75));
        assert!(approx_eq(curve.eval(2.0), 0.5));
    }

    #[test]
    fn curve_deserialize_validates() {
        let ok: Result<Curve, _> = serde_json::from_str("[[0.0, 0.0], [1.0, 1.0]]");
        assert!(ok.is_ok());
        let bad: Result<Curve, _> = serde_json::from_str("[[1.0, 0.0], [0.0, 1.0]]");
        assert!(bad.is_err());
    }

    #[test]
    fn gradient_samples_between_stops() {
        let ramp = Gradient::new(vec![
            ColorStop::new(0.0, Color::rgb(1.0, 0.0, 0.0)),
            ColorStop::new(0.5, Color::rgb(0.0, 1.0, 0.0)),
            ColorStop::new(1.0, Color::rgb(0.0, 0.0, 1.0)),
        ])
        .unwrap();
        assert_eq!(ramp.sample(-1.0), Color::rgb(1.0, 0.0, 0.0));
        assert_eq!(ramp.sample(0.5), Color::rgb(0.0, 1.0, 0.0));
        let quarter = ramp.sample(0.25);
        assert!(approx_eq(quarter.r, 0.5) && approx_eq(quarter.g, 0.5));
        assert_eq!(ramp.sample(7.0), Color::rgb(0.0, 0.0, 1.0));
    }

    #[test]
    fn gradient_hard_edge_and_single_stop() {
        let edge = Gradient::new(vec![
            ColorStop::new(0.0, Color::black()),
            ColorStop::new(0.5, Color::black()),
            ColorStop::new(0.5, Color::white()),
            ColorStop::new(1.0, Color::white()),
        ])
        .unwrap();
        assert_eq!(edge.sample(0.49), Color::black());
        assert_eq!(edge.sample(0.5), Color::white());

        let flat = Gradient::new(vec![ColorStop::new(0.3, Color::gray(0.2))]).unwrap();
        assert_eq!(flat.sample(0.9), Color::gray(0.2));
    }

    #[test]
    fn gradient_rejects_bad_stops() {
        assert!(Gradient::new(vec![]).is_err());
        assert!(Gradient::new(vec![ColorStop::new(1.5, Color::black())]).is_err());
        assert!(Gradient::new(vec![
            ColorStop::new(0.8, Color::black()),
            ColorStop::new(0.2, Color::white()),
        ])
        .is_err());
        let bad: Result<Gradient, _> =
            serde_json::from_str(r#"[{"position":0.0,"color":{"r":2.0,"g":0.0,"b":0.0}}]"#);
        assert!(bad.is_err());
        let ok: Gradient =
            serde_json::from_str(r#"[{"position":0.0,"color":{"r":0.5,"g":0.0,"b":0.0}}]"#)
                .unwrap();
        assert_eq!(ok.stops()[0].color.a, 1.0);
    }

    #[test]
    fn scalar_domain_is_enforced() {
        let spec = ParamSpec::scalar("factor", 1.0, 0.0, 1.0);
        assert!(spec.validate(&ParamValue::Scalar(0.5)).is_ok());
        assert!(spec.validate(&ParamValue::Scalar(1.5)).is_err());
        assert!(spec.validate(&ParamValue::Scalar(f64::NAN)).is_err());
        assert!(spec.validate(&ParamValue::Bool(true)).is_err());
    }

    #[test]
    fn enum_domain_is_enforced() {
        let spec = ParamSpec::choice("mode", "normal", &["normal", "multiply"]);
        assert!(spec.validate(&"multiply".into()).is_ok());
        let err = spec.validate(&"hue".into()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameterValue { ref name, .. } if name == "mode"));
    }

    #[test]
    fn resolve_fills_defaults_and_rejects_unknown_names() {
        let schema = vec![
            ParamSpec::scalar("a", 0.25, 0.0, 1.0),
            ParamSpec::boolean("b", true),
        ];
        let resolved = ParamSet::new().with("a", 0.75).resolve(&schema).unwrap();
        assert_eq!(resolved.scalar("a").unwrap(), 0.75);
        assert!(resolved.flag("b").unwrap());

        let err = ParamSet::new().with("zzz", 1.0).resolve(&schema).unwrap_err();
        assert!(err.to_string().contains("zzz"));
    }

    #[test]
    fn param_value_json_shape() {
        let json = serde_json::to_string(&ParamValue::Scalar(0.5)).unwrap();
        assert_eq!(json, r#"{"scalar":0.5}"#);
        let back: ParamValue = serde_json::from_str(r#"{"enum":"multiply"}"#).unwrap();
        assert_eq!(back, ParamValue::Enum("multiply".to_string()));
    }
}
