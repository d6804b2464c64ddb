//! Case generators for design-of-experiments sweeps.
//!
//! A generator turns the design variable declarations of a problem into a
//! lazy sequence of [`Case`]s. Generators are configured values: the driver
//! only ever receives a built instance, and a configuration naming a
//! generator kind without its parameters is rejected.

use mdo_core::{DesignVarMeta, MdoError, MdoResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::case::Case;

pub trait CaseGenerator: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Lazily produce the cases for the given design variables.
    fn generate<'a>(
        &'a self,
        design_vars: &'a [DesignVarMeta],
    ) -> MdoResult<Box<dyn Iterator<Item = Case> + 'a>>;
}

/// Explicitly listed cases, run in order.
#[derive(Debug, Clone, Default)]
pub struct ListGenerator {
    cases: Vec<Case>,
}

impl ListGenerator {
    pub fn new(cases: Vec<Case>) -> Self {
        Self { cases }
    }
}

impl CaseGenerator for ListGenerator {
    fn kind(&self) -> &'static str {
        "list"
    }

    fn generate<'a>(
        &'a self,
        design_vars: &'a [DesignVarMeta],
    ) -> MdoResult<Box<dyn Iterator<Item = Case> + 'a>> {
        for (name, _) in self.cases.iter().flatten() {
            if !design_vars.iter().any(|dv| &dv.name == name) {
                return Err(MdoError::Validation(format!(
                    "listed case sets '{name}', which is not a design variable"
                )));
            }
        }
        Ok(Box::new(self.cases.iter().cloned()))
    }
}

/// Every combination of evenly spaced levels between the bounds of each
/// design variable entry. The first entry varies fastest.
#[derive(Debug, Clone)]
pub struct FullFactorialGenerator {
    levels: usize,
}

impl FullFactorialGenerator {
    pub fn new(levels: usize) -> MdoResult<Self> {
        if levels == 0 {
            return Err(MdoError::Config(
                "full-factorial generator needs at least one level".into(),
            ));
        }
        Ok(Self { levels })
    }
}

impl CaseGenerator for FullFactorialGenerator {
    fn kind(&self) -> &'static str {
        "full-factorial"
    }

    fn generate<'a>(
        &'a self,
        design_vars: &'a [DesignVarMeta],
    ) -> MdoResult<Box<dyn Iterator<Item = Case> + 'a>> {
        let layout = bounded_layout(design_vars, self.kind())?;
        let factors: Vec<(f64, f64)> = layout
            .iter()
            .flat_map(|entry| std::iter::repeat((entry.lower, entry.upper)).take(entry.size))
            .collect();
        let levels = self.levels;
        let total = u32::try_from(factors.len())
            .ok()
            .and_then(|n| levels.checked_pow(n))
            .ok_or_else(|| {
                MdoError::Config(format!(
                    "{levels} levels over {} factors is too many cases",
                    factors.len()
                ))
            })?;

        Ok(Box::new((0..total).map(move |index| -> Case {
            let mut rem = index;
            let mut values = factors.iter().map(|&(lower, upper)| {
                let level = rem % levels;
                rem /= levels;
                level_value(lower, upper, level, levels)
            });
            layout
                .iter()
                .map(|entry| (entry.name.clone(), values.by_ref().take(entry.size).collect()))
                .collect()
        })))
    }
}

fn level_value(lower: f64, upper: f64, level: usize, levels: usize) -> f64 {
    if levels == 1 {
        return lower;
    }
    lower + (upper - lower) * level as f64 / (levels - 1) as f64
}

/// Independent uniform samples between the bounds of each design variable.
///
/// Without a seed one is drawn at construction, so every call to
/// `generate` replays the same sequence.
#[derive(Debug, Clone)]
pub struct UniformGenerator {
    num_samples: usize,
    seed: u64,
}

impl UniformGenerator {
    pub fn new(num_samples: usize, seed: Option<u64>) -> Self {
        Self {
            num_samples,
            seed: seed.unwrap_or_else(rand::random),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl CaseGenerator for UniformGenerator {
    fn kind(&self) -> &'static str {
        "uniform"
    }

    fn generate<'a>(
        &'a self,
        design_vars: &'a [DesignVarMeta],
    ) -> MdoResult<Box<dyn Iterator<Item = Case> + 'a>> {
        let layout = bounded_layout(design_vars, self.kind())?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok(Box::new((0..self.num_samples).map(move |_| -> Case {
            let mut case = Vec::with_capacity(layout.len());
            for entry in &layout {
                let values: Vec<f64> = (0..entry.size)
                    .map(|_| entry.lower + rng.gen::<f64>() * (entry.upper - entry.lower))
                    .collect();
                case.push((entry.name.clone(), values));
            }
            case
        })))
    }
}

struct BoundedVar {
    name: String,
    size: usize,
    lower: f64,
    upper: f64,
}

fn bounded_layout(design_vars: &[DesignVarMeta], kind: &str) -> MdoResult<Vec<BoundedVar>> {
    design_vars
        .iter()
        .map(|dv| {
            let (lower, upper) = dv.bounds().ok_or_else(|| {
                MdoError::Config(format!(
                    "{kind} generator requires lower and upper bounds on design variable '{}'",
                    dv.name
                ))
            })?;
            if lower > upper {
                return Err(MdoError::Config(format!(
                    "design variable '{}' has lower bound {lower} above upper bound {upper}",
                    dv.name
                )));
            }
            Ok(BoundedVar {
                name: dv.name.clone(),
                size: dv.size,
                lower,
                upper,
            })
        })
        .collect()
}

/// A listed value: a scalar is shorthand for a one-element array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaseValue {
    Scalar(f64),
    Array(Vec<f64>),
}

impl CaseValue {
    fn into_values(self) -> Vec<f64> {
        match self {
            CaseValue::Scalar(value) => vec![value],
            CaseValue::Array(values) => values,
        }
    }
}

/// Parameters of a generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GeneratorSpec {
    List {
        cases: Vec<BTreeMap<String, CaseValue>>,
    },
    FullFactorial {
        levels: usize,
    },
    Uniform {
        num_samples: usize,
        #[serde(default)]
        seed: Option<u64>,
    },
}

/// Generator configuration as read from a file.
///
/// A bare string names a generator kind without configuring it, which is
/// always a configuration error when built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratorConfig {
    Spec(GeneratorSpec),
    Kind(String),
}

impl GeneratorConfig {
    pub fn build(&self) -> MdoResult<Arc<dyn CaseGenerator>> {
        match self {
            GeneratorConfig::Spec(spec) => spec.build(),
            GeneratorConfig::Kind(kind) => Err(MdoError::Config(format!(
                "DOEDriver requires a configured case generator, \
                 but only the generator kind '{kind}' was given"
            ))),
        }
    }
}

impl GeneratorSpec {
    pub fn build(&self) -> MdoResult<Arc<dyn CaseGenerator>> {
        Ok(match self {
            GeneratorSpec::List { cases } => {
                let cases: Vec<Case> = cases
                    .iter()
                    .map(|case| {
                        case.iter()
                            .map(|(name, value)| (name.clone(), value.clone().into_values()))
                            .collect()
                    })
                    .collect();
                Arc::new(ListGenerator::new(cases))
            }
            GeneratorSpec::FullFactorial { levels } => {
                Arc::new(FullFactorialGenerator::new(*levels)?)
            }
            GeneratorSpec::Uniform { num_samples, seed } => {
                Arc::new(UniformGenerator::new(*num_samples, *seed))
            }
        })
    }
}

pub fn load_generator_config(path: &Path) -> MdoResult<GeneratorConfig> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|err| MdoError::Parse(format!("generator file '{}': {err}", path.display())))
}
