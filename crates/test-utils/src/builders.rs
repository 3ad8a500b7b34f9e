#![allow(dead_code)]

use std::collections::BTreeMap;

use assetflow::asset::{Asset, AssetGraph, Operator, OperatorKind};
use assetflow::config::{AssetConfig, ConfigFile, RawConfigFile, ScheduleConfig};
use assetflow::errors::Result;
use assetflow::types::ErrorStrategy;
use serde_json::{Map, Value};

use crate::operators::{Recorder, echo_upstream};

/// An asset with a `mem://` uri and no operator.
pub fn asset(name: &str) -> Asset {
    Asset::new(name, format!("mem://{name}")).unwrap()
}

pub fn asset_with(name: &str, operator: Operator) -> Asset {
    asset(name).with_operator(operator)
}

/// `names[0] -> names[1] -> ...`, every asset echoing its upstream data.
pub fn chain(recorder: &Recorder, names: &[&str]) -> AssetGraph {
    let mut builder = AssetGraph::builder("chain");
    let mut previous: Option<&str> = None;
    for name in names {
        let a = asset_with(name, echo_upstream(recorder, name));
        builder = match previous {
            Some(dep) => builder.asset_after(a, &[dep]),
            None => builder.asset(a),
        };
        previous = Some(name);
    }
    builder.build().unwrap()
}

/// `a -> {b, c} -> d`, every asset echoing its upstream data.
pub fn diamond(recorder: &Recorder) -> AssetGraph {
    AssetGraph::builder("diamond")
        .asset(asset_with("a", echo_upstream(recorder, "a")))
        .asset_after(asset_with("b", echo_upstream(recorder, "b")), &["a"])
        .asset_after(asset_with("c", echo_upstream(recorder, "c")), &["a"])
        .asset_after(asset_with("d", echo_upstream(recorder, "d")), &["b", "c"])
        .build()
        .unwrap()
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(pipeline: &str) -> Self {
        Self {
            config: RawConfigFile {
                pipeline: pipeline.to_string(),
                ..RawConfigFile::default()
            },
        }
    }

    pub fn with_asset(mut self, name: &str, asset: AssetConfig) -> Self {
        self.config.asset.insert(name.to_string(), asset);
        self
    }

    pub fn with_schedule(mut self, name: &str, schedule: ScheduleConfig) -> Self {
        self.config.schedule.insert(name.to_string(), schedule);
        self
    }

    pub fn error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.config.engine.error_strategy = strategy;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.engine.max_workers = Some(n);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

/// Builder for `AssetConfig`.
pub struct AssetConfigBuilder {
    asset: AssetConfig,
}

impl AssetConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            asset: AssetConfig {
                cmd: cmd.to_string(),
                uri: None,
                kind: OperatorKind::Custom,
                asset_type: None,
                after: vec![],
                metadata: BTreeMap::new(),
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.asset.after.push(dep.to_string());
        self
    }

    pub fn kind(mut self, kind: OperatorKind) -> Self {
        self.asset.kind = kind;
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        self.asset.uri = Some(uri.to_string());
        self
    }

    pub fn build(self) -> AssetConfig {
        self.asset
    }
}

/// Builder for `ScheduleConfig`.
pub struct ScheduleConfigBuilder {
    schedule: ScheduleConfig,
}

impl ScheduleConfigBuilder {
    fn empty() -> Self {
        Self {
            schedule: ScheduleConfig {
                cron: None,
                interval: None,
                event: None,
                filters: BTreeMap::new(),
                min_interval: None,
                timezone: "UTC".to_string(),
                graph: None,
                paused: false,
                config: Map::new(),
            },
        }
    }

    pub fn cron(expr: &str) -> Self {
        let mut b = Self::empty();
        b.schedule.cron = Some(expr.to_string());
        b
    }

    pub fn interval(duration: &str) -> Self {
        let mut b = Self::empty();
        b.schedule.interval = Some(duration.to_string());
        b
    }

    pub fn event(event_type: &str) -> Self {
        let mut b = Self::empty();
        b.schedule.event = Some(event_type.to_string());
        b
    }

    pub fn filter(mut self, key: &str, value: Value) -> Self {
        self.schedule.filters.insert(key.to_string(), value);
        self
    }

    pub fn timezone(mut self, tz: &str) -> Self {
        self.schedule.timezone = tz.to_string();
        self
    }

    pub fn graph(mut self, graph: &str) -> Self {
        self.schedule.graph = Some(graph.to_string());
        self
    }

    pub fn paused(mut self) -> Self {
        self.schedule.paused = true;
        self
    }

    pub fn build(self) -> ScheduleConfig {
        self.schedule
    }
}
