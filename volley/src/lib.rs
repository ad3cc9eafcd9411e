#![cfg_attr(docsrs, feature(doc_cfg))]
//! Bounded-concurrency benchmark engine for HTTP inference services.
//!
//! A run plans a weighted mixture of request types, executes it with at most `C` requests in
//! flight, and reduces the per-request [`Outcome`]s into [`RunStatistics`].
//!
//! ```no_run
//! use volley::prelude::*;
//! use std::num::NonZeroUsize;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), BenchError> {
//!     let config = BenchConfig::from_file("config.yaml")?;
//!     let report = Benchmark::new(config, "http://localhost:8000")
//!         .concurrency(NonZeroUsize::new(20).unwrap())
//!         .requests(200)
//!         .await?;
//!     println!("{}", report.statistics);
//!     Ok(())
//! }
//! ```

pub mod benchmark;
mod error;
pub mod executor;
pub mod payload;
pub mod planner;
pub(crate) mod scheduler;
pub mod swarm;
#[cfg(test)]
mod testing;
pub mod transport;

pub use benchmark::{Benchmark, BenchmarkReport};
pub use error::BenchError;
pub use swarm::Swarm;
pub use volley_core as core;
pub use volley_core::{Outcome, RequestKind, RunStatistics};

pub mod prelude {
    pub use crate::benchmark::{Benchmark, BenchmarkReport};
    pub use crate::error::BenchError;
    pub use crate::swarm::Swarm;
    pub use crate::transport::{HttpTransport, Transport};
    pub use volley_core::{BenchConfig, Outcome, RequestKind, RunStatistics};
}
