//! Flat fit parameters: structured keys, bounds, expressions, and the
//! ordered collection the solver iterates over.
//!
//! Every model in a fit is described by flat parameters such as
//! `gaussian_amplitude_1` or `pseudovoigt_fwhmg_2_3`. [`Parameters`] keeps
//! them in insertion order, so the order the model list is declared in is
//! the order the minimizer, the statistics, and the reports see.

pub mod bounds;
pub mod expression;
pub mod key;
pub mod parameter;

pub use bounds::{Bounds, BoundsError};
pub use expression::{EvaluationContext, Expression, ExpressionError};
pub use key::ParameterKey;
pub use parameter::{Parameter, ParameterError};

use crate::error::Result;
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Ordered collection of fit parameters.
///
/// Iteration, the varying subset, and serialization all follow insertion
/// order. Expression-bound parameters are re-evaluated in dependency order
/// whenever the varying values change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Parameters {
    params: IndexMap<ParameterKey, Parameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter, replacing any previous one under the same key.
    ///
    /// Fails when the parameter's expression does not parse or would close
    /// a dependency cycle with the parameters already present.
    pub fn add(&mut self, param: Parameter) -> std::result::Result<(), ParameterError> {
        if let Some(expr) = param.expr() {
            Expression::parse(expr).map_err(|e| ParameterError::ExpressionEvaluation {
                name: param.name(),
                message: format!("failed to parse expression: {}", e),
            })?;
        }
        self.params.insert(param.key().clone(), param);
        self.check_circular()?;
        Ok(())
    }

    pub fn add_param(
        &mut self,
        key: ParameterKey,
        value: f64,
    ) -> std::result::Result<(), ParameterError> {
        self.add(Parameter::new(key, value))
    }

    pub fn add_param_with_bounds(
        &mut self,
        key: ParameterKey,
        value: f64,
        min: f64,
        max: f64,
    ) -> std::result::Result<(), ParameterError> {
        self.add(Parameter::with_bounds(key, value, min, max)?)
    }

    pub fn add_param_with_expr(
        &mut self,
        key: ParameterKey,
        value: f64,
        expr: &str,
    ) -> std::result::Result<(), ParameterError> {
        self.add(Parameter::with_expr(key, value, expr))
    }

    pub fn get(&self, key: &ParameterKey) -> Option<&Parameter> {
        self.params.get(key)
    }

    pub fn get_mut(&mut self, key: &ParameterKey) -> Option<&mut Parameter> {
        self.params.get_mut(key)
    }

    /// Look a parameter up by its flat string name.
    pub fn get_by_name(&self, name: &str) -> Option<&Parameter> {
        let key = ParameterKey::parse(name).ok()?;
        self.params.get(&key)
    }

    pub fn contains(&self, key: &ParameterKey) -> bool {
        self.params.contains_key(key)
    }

    pub fn remove(&mut self, key: &ParameterKey) -> Option<Parameter> {
        // shift_remove keeps the insertion order of the remaining entries.
        self.params.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParameterKey> {
        self.params.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParameterKey, &Parameter)> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ParameterKey, &mut Parameter)> {
        self.params.iter_mut()
    }

    /// Flat string names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.params.keys().map(ParameterKey::name).collect()
    }

    /// Keys of the parameters the minimizer actually varies, in insertion
    /// order.
    pub fn varying_keys(&self) -> Vec<ParameterKey> {
        self.params
            .iter()
            .filter(|(_, p)| p.vary())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn n_varying(&self) -> usize {
        self.params.values().filter(|p| p.vary()).count()
    }

    /// Internal (unbounded) coordinates of the varying parameters, in
    /// insertion order.
    pub fn varying_internal(&self) -> std::result::Result<Vec<f64>, ParameterError> {
        self.params
            .values()
            .filter(|p| p.vary())
            .map(|p| p.to_internal())
            .collect()
    }

    /// Write internal coordinates proposed by the solver back into the
    /// varying parameters, then re-evaluate all expressions.
    pub fn update_from_internal(&mut self, values: &[f64]) -> std::result::Result<(), ParameterError> {
        let varying = self.varying_keys();
        if values.len() != varying.len() {
            return Err(ParameterError::SizeMismatch {
                expected: varying.len(),
                actual: values.len(),
            });
        }

        for (key, &internal) in varying.iter().zip(values) {
            let param = self.params.get_mut(key).ok_or(ParameterError::NotFound {
                name: key.name(),
            })?;
            // to_external lands inside the box up to round-off; the clamp
            // keeps set_value from tripping on the edge.
            let external = param.bounds().clamp(param.from_internal(internal));
            param.set_value(external)?;
        }

        self.update_expressions()
    }

    /// Restore every parameter to its starting value.
    pub fn reset(&mut self) {
        for param in self.params.values_mut() {
            param.reset();
        }
        if let Err(e) = self.update_expressions() {
            warn!("expression update failed during reset: {}", e);
        }
    }

    /// Re-evaluate expression-bound parameters in dependency order.
    pub fn update_expressions(&mut self) -> std::result::Result<(), ParameterError> {
        let order = self.evaluation_order()?;
        for key in order {
            let expr_str = match self.params.get(&key).and_then(|p| p.expr()) {
                Some(expr) => expr.to_string(),
                None => continue,
            };
            let expr = Expression::parse(&expr_str).map_err(|e| {
                ParameterError::ExpressionEvaluation {
                    name: key.name(),
                    message: format!("failed to parse expression: {}", e),
                }
            })?;
            let value = expr
                .evaluate(self)
                .map_err(|e| ParameterError::ExpressionEvaluation {
                    name: key.name(),
                    message: format!("failed to evaluate expression: {}", e),
                })?;
            if let Some(param) = self.params.get_mut(&key) {
                param.set_value(value)?;
            }
        }
        Ok(())
    }

    /// Keys of the parameters a given parameter's expression references,
    /// restricted to parameters present in the collection.
    fn dependencies(&self, param: &Parameter) -> std::result::Result<Vec<ParameterKey>, ParameterError> {
        let Some(expr_str) = param.expr() else {
            return Ok(Vec::new());
        };
        let expr = Expression::parse(expr_str).map_err(|e| {
            ParameterError::ExpressionEvaluation {
                name: param.name(),
                message: format!("failed to parse expression: {}", e),
            }
        })?;
        Ok(expr
            .variables()
            .iter()
            .filter_map(|name| ParameterKey::parse(name).ok())
            .filter(|key| self.params.contains_key(key))
            .collect())
    }

    /// All keys in an order where every parameter comes after the
    /// parameters its expression depends on. Fails on dependency cycles.
    fn evaluation_order(&self) -> std::result::Result<Vec<ParameterKey>, ParameterError> {
        fn visit(
            key: &ParameterKey,
            collection: &Parameters,
            done: &mut HashSet<ParameterKey>,
            in_progress: &mut HashSet<ParameterKey>,
            order: &mut Vec<ParameterKey>,
        ) -> std::result::Result<(), ParameterError> {
            if done.contains(key) {
                return Ok(());
            }
            if !in_progress.insert(key.clone()) {
                return Err(ParameterError::CircularDependency { name: key.name() });
            }
            if let Some(param) = collection.params.get(key) {
                for dep in collection.dependencies(param)? {
                    visit(&dep, collection, done, in_progress, order)?;
                }
            }
            in_progress.remove(key);
            done.insert(key.clone());
            order.push(key.clone());
            Ok(())
        }

        let mut done = HashSet::new();
        let mut in_progress = HashSet::new();
        let mut order = Vec::with_capacity(self.params.len());
        for key in self.params.keys() {
            visit(key, self, &mut done, &mut in_progress, &mut order)?;
        }
        Ok(order)
    }

    fn check_circular(&self) -> std::result::Result<(), ParameterError> {
        self.evaluation_order().map(|_| ())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let params: Parameters = serde_json::from_str(json)?;
        params.check_circular()?;
        Ok(params)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }
}

impl EvaluationContext for Parameters {
    fn get_variable(&self, name: &str) -> std::result::Result<f64, ExpressionError> {
        self.get_by_name(name)
            .map(Parameter::value)
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }
}
