// src/exec/mod.rs

//! Asset execution layer.
//!
//! - [`executor`] runs one asset and captures its outcome as data.
//! - [`retry`] holds the retry policy and the retry combinators.
//! - [`command`] provides shell-command operators for config-defined
//!   pipelines.

pub mod command;
pub mod executor;
pub mod retry;

pub use command::CommandOperator;
pub use executor::Executor;
pub use retry::{RetryConfig, RetryError, retry, retry_async};
