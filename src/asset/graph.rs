// src/asset/graph.rs

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::asset::AssetName;
use crate::asset::operator::Operator;
use crate::dag::validate::validate_graph;
use crate::errors::{FlowError, Result};

/// A node in the pipeline DAG.
#[derive(Debug, Clone)]
pub struct Asset {
    pub name: AssetName,
    pub asset_type: String,
    pub uri: String,
    pub operator: Option<Operator>,
    pub schema: Option<Value>,
    pub metadata: BTreeMap<String, String>,
    pub config: Map<String, Value>,
}

impl Asset {
    /// Create an asset. Name and URI must be non-empty.
    pub fn new(name: impl Into<AssetName>, uri: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let uri = uri.into();

        if name.trim().is_empty() {
            return Err(FlowError::InvalidAsset(
                "asset name must not be empty".to_string(),
            ));
        }
        if uri.trim().is_empty() {
            return Err(FlowError::InvalidAsset(format!(
                "asset '{name}' must have a non-empty uri"
            )));
        }

        Ok(Self {
            name,
            asset_type: "table".to_string(),
            uri,
            operator: None,
            schema: None,
            metadata: BTreeMap::new(),
            config: Map::new(),
        })
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn with_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = asset_type.into();
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// The full DAG for one pipeline.
///
/// Immutable once built; engines share it read-only (typically behind an
/// `Arc`) across all workers of a run.
#[derive(Debug, Clone)]
pub struct AssetGraph {
    name: String,
    assets: Vec<Asset>,
    index: HashMap<AssetName, usize>,
    dependencies: HashMap<AssetName, Vec<AssetName>>,
}

impl AssetGraph {
    /// Build and validate a graph.
    ///
    /// Fails on duplicate names, dependencies on undeclared assets,
    /// self-dependencies and cycles.
    pub fn new(
        name: impl Into<String>,
        assets: Vec<Asset>,
        dependencies: HashMap<AssetName, Vec<AssetName>>,
    ) -> Result<Self> {
        let graph = Self::new_unchecked(name, assets, dependencies)?;
        validate_graph(&graph)?;
        Ok(graph)
    }

    /// Build a graph checking only name uniqueness.
    ///
    /// Used by callers that validate later (the engines always re-plan and
    /// therefore re-check dependencies and cycles before running anything).
    pub fn new_unchecked(
        name: impl Into<String>,
        assets: Vec<Asset>,
        dependencies: HashMap<AssetName, Vec<AssetName>>,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FlowError::Config(
                "asset graph name must not be empty".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(assets.len());
        for (i, asset) in assets.iter().enumerate() {
            if index.insert(asset.name.clone(), i).is_some() {
                return Err(FlowError::DuplicateAsset(asset.name.clone()));
            }
        }

        Ok(Self {
            name,
            assets,
            index,
            dependencies,
        })
    }

    pub fn builder(name: impl Into<String>) -> AssetGraphBuilder {
        AssetGraphBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assets in declaration order.
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.index.get(name).map(|&i| &self.assets[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declaration position of an asset; used to break ordering ties.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn asset_names(&self) -> impl Iterator<Item = &str> {
        self.assets.iter().map(|a| a.name.as_str())
    }

    /// Declared upstream names of an asset.
    pub fn dependencies_of(&self, name: &str) -> &[AssetName] {
        self.dependencies
            .get(name)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependencies(&self) -> &HashMap<AssetName, Vec<AssetName>> {
        &self.dependencies
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Fluent construction of an [`AssetGraph`].
#[derive(Debug)]
pub struct AssetGraphBuilder {
    name: String,
    assets: Vec<Asset>,
    dependencies: HashMap<AssetName, Vec<AssetName>>,
}

impl AssetGraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assets: Vec::new(),
            dependencies: HashMap::new(),
        }
    }

    pub fn asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    /// Add an asset together with its upstream names.
    pub fn asset_after(mut self, asset: Asset, deps: &[&str]) -> Self {
        if !deps.is_empty() {
            self.dependencies.insert(
                asset.name.clone(),
                deps.iter().map(|d| d.to_string()).collect(),
            );
        }
        self.assets.push(asset);
        self
    }

    pub fn depends_on(mut self, asset: &str, dep: &str) -> Self {
        self.dependencies
            .entry(asset.to_string())
            .or_default()
            .push(dep.to_string());
        self
    }

    pub fn build(self) -> Result<AssetGraph> {
        AssetGraph::new(self.name, self.assets, self.dependencies)
    }

    pub fn build_unchecked(self) -> Result<AssetGraph> {
        AssetGraph::new_unchecked(self.name, self.assets, self.dependencies)
    }
}
