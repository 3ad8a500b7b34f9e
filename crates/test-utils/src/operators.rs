//! Canned operators for engine tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetflow::asset::{Operator, OperatorKind};
use assetflow::errors::TransientError;
use serde_json::{Value, json};

/// Shared log of which operators ran, in call order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.calls.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| c == name)
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// Returns `value` every time.
pub fn constant(name: &str, value: Value) -> Operator {
    Operator::source(name, move |_, _| Ok(value.clone())).unwrap()
}

/// Records the call and returns `value`.
pub fn recording(recorder: &Recorder, name: &str, value: Value) -> Operator {
    let recorder = recorder.clone();
    let label = name.to_string();
    Operator::source(name, move |_, _| {
        recorder.record(&label);
        Ok(value.clone())
    })
    .unwrap()
}

/// Records the call and returns `{"asset": name, "inputs": {...upstream data}}`.
pub fn echo_upstream(recorder: &Recorder, name: &str) -> Operator {
    let recorder = recorder.clone();
    let label = name.to_string();
    Operator::transform(name, move |inputs, _| {
        recorder.record(&label);
        Ok(json!({ "asset": label, "inputs": inputs.to_json() }))
    })
    .unwrap()
}

/// Records the call and fails with `message`.
pub fn failing(recorder: &Recorder, name: &str, message: &str) -> Operator {
    let recorder = recorder.clone();
    let label = name.to_string();
    let message = message.to_string();
    Operator::transform(name, move |_, _| {
        recorder.record(&label);
        anyhow::bail!("{message}")
    })
    .unwrap()
}

/// Fails the first `failures` calls, then succeeds with the attempt number.
///
/// The counter reports how many times the operator ran. Failures carry a
/// [`TransientError`] when `transient` is set.
pub fn flaky(name: &str, failures: u32, transient: bool) -> (Operator, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let op = Operator::transform(name, move |_, _| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            if transient {
                return Err(TransientError(format!("attempt {n} timed out")).into());
            }
            anyhow::bail!("attempt {n} failed");
        }
        Ok(json!({ "attempt": n }))
    })
    .unwrap();
    (op, calls)
}

/// Sleeps for `delay` before recording and returning `value`.
pub fn sleeping(recorder: &Recorder, name: &str, delay: Duration, value: Value) -> Operator {
    let recorder = recorder.clone();
    let label = name.to_string();
    Operator::source(name, move |_, _| {
        std::thread::sleep(delay);
        recorder.record(&label);
        Ok(value.clone())
    })
    .unwrap()
}

/// Panics when called.
pub fn panicking(name: &str) -> Operator {
    Operator::from_fn(name, OperatorKind::Custom, |_, _| -> anyhow::Result<Value> {
        panic!("operator blew up")
    })
    .unwrap()
}

/// Tracks how many gauged operators run at the same time.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// An operator that holds a slot for `hold`.
    pub fn operator(&self, name: &str, hold: Duration) -> Operator {
        let current = self.current.clone();
        let max = self.max.clone();
        Operator::source(name, move |_, _| {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(hold);
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        })
        .unwrap()
    }

    pub fn max_observed(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}
