// src/asset/operator.rs

//! Computations attached to assets.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::asset::context::PipelineContext;
use crate::asset::result::UpstreamResults;
use crate::errors::{FlowError, Result};

/// The role an operator plays in the pipeline.
///
/// The kind is descriptive; every kind is executed the same way through
/// [`Compute::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
    Source,
    Transform,
    Aggregate,
    Custom,
}

impl Default for OperatorKind {
    fn default() -> Self {
        OperatorKind::Custom
    }
}

impl std::str::FromStr for OperatorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(OperatorKind::Source),
            "transform" => Ok(OperatorKind::Transform),
            "aggregate" => Ok(OperatorKind::Aggregate),
            "custom" => Ok(OperatorKind::Custom),
            other => Err(format!(
                "invalid operator kind: {other} (expected source, transform, aggregate or custom)"
            )),
        }
    }
}

/// The single capability every operator exposes.
///
/// Closures of the right shape implement this automatically.
pub trait Compute: Send + Sync {
    fn apply(&self, inputs: &UpstreamResults, ctx: &PipelineContext) -> anyhow::Result<Value>;
}

impl<F> Compute for F
where
    F: Fn(&UpstreamResults, &PipelineContext) -> anyhow::Result<Value> + Send + Sync,
{
    fn apply(&self, inputs: &UpstreamResults, ctx: &PipelineContext) -> anyhow::Result<Value> {
        self(inputs, ctx)
    }
}

/// A named unit of computation. Immutable once built.
#[derive(Clone)]
pub struct Operator {
    name: String,
    kind: OperatorKind,
    compute: Arc<dyn Compute>,
    input_schema: Option<Value>,
    output_schema: Option<Value>,
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .finish_non_exhaustive()
    }
}

impl Operator {
    pub fn new(
        name: impl Into<String>,
        kind: OperatorKind,
        compute: impl Compute + 'static,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FlowError::InvalidAsset(
                "operator name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            name,
            kind,
            compute: Arc::new(compute),
            input_schema: None,
            output_schema: None,
        })
    }

    pub fn source<F>(name: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(&UpstreamResults, &PipelineContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, OperatorKind::Source, f)
    }

    pub fn transform<F>(name: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(&UpstreamResults, &PipelineContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, OperatorKind::Transform, f)
    }

    pub fn aggregate<F>(name: impl Into<String>, f: F) -> Result<Self>
    where
        F: Fn(&UpstreamResults, &PipelineContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, OperatorKind::Aggregate, f)
    }

    /// Wrap a closure under an explicit kind.
    pub fn from_fn<F>(name: impl Into<String>, kind: OperatorKind, f: F) -> Result<Self>
    where
        F: Fn(&UpstreamResults, &PipelineContext) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::new(name, kind, f)
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn input_schema(&self) -> Option<&Value> {
        self.input_schema.as_ref()
    }

    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    /// Run the computation.
    pub fn apply(&self, inputs: &UpstreamResults, ctx: &PipelineContext) -> anyhow::Result<Value> {
        self.compute.apply(inputs, ctx)
    }
}
