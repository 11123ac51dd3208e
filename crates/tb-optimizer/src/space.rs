//! Parameter space: sampling and unit-cube encoding.
//!
//! Every parameter kind is projected onto `[0, 1]`, so the surrogate only
//! ever sees points of the unit hypercube. Dimension order follows the order
//! the specs were given in.

use rand::Rng;
use std::collections::HashSet;
use tb_types::{Candidate, ParamKind, ParamSpec, ParamValue, SpaceError};

/// Values below this are floored before taking a log.
const LOG_FLOOR: f64 = 1e-18;
/// Minimum span for float kinds, guards the division in `encode`.
const MIN_FLOAT_SPAN: f64 = 1e-12;

/// Sampling and encoding for a single parameter.
pub trait ParamCodec {
    /// Draw a value uniformly from the parameter's domain.
    fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue;

    /// Project a value onto `[0, 1]`.
    fn encode(&self, value: &ParamValue) -> Result<f64, SpaceError>;

    /// Inverse of [`ParamCodec::encode`]; `x` is clamped to `[0, 1]`.
    fn decode(&self, x: f64) -> ParamValue;
}

impl ParamCodec for ParamSpec {
    fn sample<R: Rng>(&self, rng: &mut R) -> ParamValue {
        match &self.kind {
            ParamKind::Float { low, high } => ParamValue::Float(rng.random_range(*low..=*high)),
            ParamKind::LogFloat { low, high } => {
                let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                ParamValue::Float(log_val.exp().clamp(*low, *high))
            }
            ParamKind::Int { low, high } => ParamValue::Int(rng.random_range(*low..=*high)),
            ParamKind::Categorical { choices } => {
                let idx = rng.random_range(0..choices.len());
                ParamValue::Choice(choices[idx].clone())
            }
        }
    }

    fn encode(&self, value: &ParamValue) -> Result<f64, SpaceError> {
        match &self.kind {
            ParamKind::Float { low, high } => {
                let x = numeric(self, value)?;
                Ok((x - low) / (high - low).max(MIN_FLOAT_SPAN))
            }
            ParamKind::LogFloat { low, high } => {
                let x = numeric(self, value)?.max(LOG_FLOOR).ln();
                let (lo, hi) = (low.ln(), high.ln());
                Ok((x - lo) / (hi - lo).max(MIN_FLOAT_SPAN))
            }
            ParamKind::Int { low, high } => {
                let v = match value {
                    ParamValue::Int(v) => *v as f64,
                    _ => return Err(type_mismatch(self, "int")),
                };
                let (lo, hi) = (*low as f64, *high as f64);
                Ok((v - lo) / (hi - lo).max(1.0))
            }
            ParamKind::Categorical { choices } => {
                let needle = match value {
                    ParamValue::Choice(v) => v.clone(),
                    ParamValue::Int(v) => serde_json::Value::from(*v),
                    ParamValue::Float(v) => serde_json::Value::from(*v),
                };
                let idx = choices.iter().position(|c| *c == needle).ok_or_else(|| {
                    SpaceError::UnknownChoice {
                        name: self.name.clone(),
                        value: needle.to_string(),
                    }
                })?;
                if choices.len() == 1 {
                    return Ok(0.0);
                }
                Ok(idx as f64 / (choices.len() - 1) as f64)
            }
        }
    }

    fn decode(&self, x: f64) -> ParamValue {
        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        match &self.kind {
            ParamKind::Float { low, high } => ParamValue::Float(low + x * (high - low)),
            ParamKind::LogFloat { low, high } => {
                let (lo, hi) = (low.ln(), high.ln());
                ParamValue::Float((lo + x * (hi - lo)).exp().clamp(*low, *high))
            }
            ParamKind::Int { low, high } => {
                let span = (high - low) as f64;
                let v = (*low as f64 + x * span).round() as i64;
                ParamValue::Int(v.clamp(*low, *high))
            }
            ParamKind::Categorical { choices } => {
                let last = choices.len().saturating_sub(1);
                let idx = ((x * last as f64).round() as usize).min(last);
                ParamValue::Choice(choices[idx].clone())
            }
        }
    }
}

fn numeric(spec: &ParamSpec, value: &ParamValue) -> Result<f64, SpaceError> {
    match value {
        ParamValue::Float(v) => Ok(*v),
        ParamValue::Int(v) => Ok(*v as f64),
        ParamValue::Choice(_) => Err(type_mismatch(spec, "float")),
    }
}

fn type_mismatch(spec: &ParamSpec, expected: &str) -> SpaceError {
    SpaceError::TypeMismatch {
        name: spec.name.clone(),
        expected: expected.to_string(),
    }
}

/// The full search space: an ordered, validated list of parameter specs.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    specs: Vec<ParamSpec>,
}

impl ParameterSpace {
    /// Validate and wrap the specs. Fails on an empty list, duplicate names
    /// or any spec violating its bounds/choices invariants.
    pub fn new(specs: Vec<ParamSpec>) -> Result<Self, SpaceError> {
        if specs.is_empty() {
            return Err(SpaceError::Empty);
        }
        let mut names = HashSet::with_capacity(specs.len());
        for spec in &specs {
            spec.validate()?;
            if !names.insert(spec.name.as_str()) {
                return Err(SpaceError::DuplicateName {
                    name: spec.name.clone(),
                });
            }
        }
        Ok(Self { specs })
    }

    pub fn builder() -> SpaceBuilder {
        SpaceBuilder::default()
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Dimensionality of the encoded space.
    pub fn dims(&self) -> usize {
        self.specs.len()
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Candidate {
        self.specs
            .iter()
            .map(|spec| (spec.name.clone(), spec.sample(rng)))
            .collect()
    }

    pub fn encode(&self, candidate: &Candidate) -> Result<Vec<f64>, SpaceError> {
        self.specs
            .iter()
            .map(|spec| {
                let value = candidate
                    .get(&spec.name)
                    .ok_or_else(|| SpaceError::MissingValue {
                        name: spec.name.clone(),
                    })?;
                spec.encode(value)
            })
            .collect()
    }

    pub fn decode(&self, point: &[f64]) -> Result<Candidate, SpaceError> {
        if point.len() != self.dims() {
            return Err(SpaceError::DimensionMismatch {
                expected: self.dims(),
                actual: point.len(),
            });
        }
        Ok(self
            .specs
            .iter()
            .zip(point)
            .map(|(spec, &x)| (spec.name.clone(), spec.decode(x)))
            .collect())
    }
}

/// Chained construction; the first invalid spec is reported by `build`.
#[derive(Debug, Default)]
pub struct SpaceBuilder {
    specs: Vec<Result<ParamSpec, SpaceError>>,
}

impl SpaceBuilder {
    pub fn float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.specs.push(ParamSpec::float(name, low, high));
        self
    }

    pub fn log_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.specs.push(ParamSpec::log_float(name, low, high));
        self
    }

    pub fn int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.specs.push(ParamSpec::int(name, low, high));
        self
    }

    pub fn categorical(mut self, name: impl Into<String>, choices: Vec<serde_json::Value>) -> Self {
        self.specs.push(ParamSpec::categorical(name, choices));
        self
    }

    pub fn build(self) -> Result<ParameterSpace, SpaceError> {
        let specs = self.specs.into_iter().collect::<Result<Vec<_>, _>>()?;
        ParameterSpace::new(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn sample_space() -> ParameterSpace {
        ParameterSpace::builder()
            .log_float("learning_rate", 1e-5, 1e-2)
            .float("gamma", 0.90, 0.999)
            .int("batch_size", 64, 512)
            .categorical("net_arch", vec![json!("small"), json!("medium"), json!("large")])
            .build()
            .unwrap()
    }

    #[test]
    fn random_samples_respect_bounds() {
        let space = sample_space();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..200 {
            let c = space.sample(&mut rng);
            match c.get("learning_rate") {
                Some(ParamValue::Float(v)) => {
                    assert!((1e-5..=1e-2).contains(v), "lr out of bounds: {v}")
                }
                other => panic!("unexpected learning_rate value: {other:?}"),
            }
            match c.get("gamma") {
                Some(ParamValue::Float(v)) => assert!((0.90..=0.999).contains(v)),
                other => panic!("unexpected gamma value: {other:?}"),
            }
            match c.get("batch_size") {
                Some(ParamValue::Int(v)) => assert!((64..=512).contains(v)),
                other => panic!("unexpected batch_size value: {other:?}"),
            }
            match c.get("net_arch") {
                Some(ParamValue::Choice(v)) => {
                    assert!(["small", "medium", "large"].contains(&v.as_str().unwrap()))
                }
                other => panic!("unexpected net_arch value: {other:?}"),
            }
        }
    }

    #[test]
    fn sampling_is_deterministic_per_seed() {
        let space = sample_space();
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..20 {
            assert_eq!(space.sample(&mut a), space.sample(&mut b));
        }
    }

    #[test]
    fn int_sampling_hits_both_endpoints() {
        let spec = ParamSpec::int("n", 0, 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let seen: HashSet<i64> = (0..200)
            .map(|_| match spec.sample(&mut rng) {
                ParamValue::Int(v) => v,
                other => panic!("unexpected value {other:?}"),
            })
            .collect();
        assert_eq!(seen, HashSet::from([0, 1, 2]));
    }

    #[test]
    fn encode_projects_onto_unit_interval() {
        let float = ParamSpec::float("x", 2.0, 6.0).unwrap();
        assert_eq!(float.encode(&ParamValue::Float(3.0)).unwrap(), 0.25);

        let log = ParamSpec::log_float("lr", 1e-4, 1e-2).unwrap();
        let mid = log.encode(&ParamValue::Float(1e-3)).unwrap();
        assert!((mid - 0.5).abs() < 1e-12);

        let int = ParamSpec::int("n", 10, 20).unwrap();
        assert_eq!(int.encode(&ParamValue::Int(15)).unwrap(), 0.5);

        let cat = ParamSpec::categorical("c", vec![json!("a"), json!("b"), json!("c")]).unwrap();
        assert_eq!(cat.encode(&ParamValue::Choice(json!("c"))).unwrap(), 1.0);

        let single = ParamSpec::categorical("only", vec![json!(true)]).unwrap();
        assert_eq!(single.encode(&ParamValue::Choice(json!(true))).unwrap(), 0.0);
    }

    #[test]
    fn log_encode_floors_non_positive_values() {
        let log = ParamSpec::log_float("lr", 1e-4, 1e-2).unwrap();
        let x = log.encode(&ParamValue::Float(-1.0)).unwrap();
        assert!(x.is_finite());
        assert!(x < 0.0);
    }

    #[test]
    fn encode_rejects_foreign_values() {
        let cat = ParamSpec::categorical("c", vec![json!("a"), json!("b")]).unwrap();
        assert!(matches!(
            cat.encode(&ParamValue::Choice(json!("z"))),
            Err(SpaceError::UnknownChoice { .. })
        ));

        let int = ParamSpec::int("n", 0, 4).unwrap();
        assert!(matches!(
            int.encode(&ParamValue::Float(1.0)),
            Err(SpaceError::TypeMismatch { .. })
        ));

        let float = ParamSpec::float("x", 0.0, 1.0).unwrap();
        assert!(matches!(
            float.encode(&ParamValue::Choice(json!("a"))),
            Err(SpaceError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn numeric_choices_match_plain_values() {
        let cat = ParamSpec::categorical("width", vec![json!(16), json!(32), json!(64)]).unwrap();
        assert_eq!(cat.encode(&ParamValue::Int(32)).unwrap(), 0.5);
    }

    #[test]
    fn encode_decode_round_trip() {
        let space = sample_space();
        for &x in &[0.0, 0.1, 0.37, 0.5, 0.93, 1.0] {
            let point = vec![x; space.dims()];
            let candidate = space.decode(&point).unwrap();
            let encoded = space.encode(&candidate).unwrap();

            // float kinds are continuous
            assert!((encoded[0] - x).abs() < 1e-9, "log_float: {} vs {x}", encoded[0]);
            assert!((encoded[1] - x).abs() < 1e-9, "float: {} vs {x}", encoded[1]);
            // int kinds are exact up to rounding to the nearest integer
            assert!((encoded[2] - x).abs() <= 0.5 / 448.0 + 1e-12);
        }

        let cat = &space.specs()[3];
        for idx in 0..3 {
            let x = idx as f64 / 2.0;
            assert_eq!(cat.encode(&cat.decode(x)).unwrap(), x);
        }
    }

    #[test]
    fn decode_clamps_out_of_range_points() {
        let int = ParamSpec::int("n", 1, 3).unwrap();
        assert_eq!(int.decode(-4.0), ParamValue::Int(1));
        assert_eq!(int.decode(7.0), ParamValue::Int(3));
        assert_eq!(int.decode(f64::NAN), ParamValue::Int(1));
    }

    #[test]
    fn space_encode_requires_every_parameter() {
        let space = sample_space();
        let partial = Candidate::new().with("gamma", ParamValue::Float(0.95));
        assert!(matches!(
            space.encode(&partial),
            Err(SpaceError::MissingValue { .. })
        ));
        assert!(matches!(
            space.decode(&[0.5]),
            Err(SpaceError::DimensionMismatch { expected: 4, actual: 1 })
        ));
    }

    #[test]
    fn construction_errors() {
        assert_eq!(ParameterSpace::new(vec![]), Err(SpaceError::Empty));
        assert!(matches!(
            ParameterSpace::builder().float("x", 1.0, 1.0).build(),
            Err(SpaceError::InvertedBounds { .. })
        ));
        assert!(matches!(
            ParameterSpace::builder().int("n", 3, 3).build(),
            Err(SpaceError::InvertedBounds { .. })
        ));
        assert!(matches!(
            ParameterSpace::builder()
                .float("x", 0.0, 1.0)
                .int("x", 0, 3)
                .build(),
            Err(SpaceError::DuplicateName { .. })
        ));
    }
}
