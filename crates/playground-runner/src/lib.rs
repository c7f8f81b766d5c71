//! # Playground runner
//!
//! Runs a [`Manifest`](playground_manifest::Manifest) on the local machine.
//!
//! Container services become a docker compose project named after the
//! session id. Services marked to run on the host are spawned as child
//! processes with their container paths rewritten to the session directory,
//! and lifecycle services run their shell hooks. The runner reserves host
//! ports, pulls missing images, tails every container's log into
//! `logs/<service>.log` and reports the first service death as a
//! session-fatal error.
//!
//! ## Example
//!
//! ```rust,no_run
//! use playground_manifest::{Manifest, Output};
//! use playground_runner::{DockerCli, LocalRunner, RunnerConfig};
//! use std::sync::Arc;
//!
//! # async fn example(manifest: Manifest, output: Output) -> playground_runner::Result<()> {
//! let runner = LocalRunner::prepare(
//!     manifest,
//!     output,
//!     Arc::new(DockerCli::new()),
//!     RunnerConfig::new().with_bind_locally(true),
//! )
//! .await?;
//! runner.start().await?;
//! runner.wait_for_ready().await?;
//! let reason = runner.wait_for_exit().await;
//! println!("session ended: {}", reason);
//! runner.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod compose;
mod config;
mod docker;
mod error;
mod host;
mod lifecycle;
mod ports;
mod pull;
pub mod release;
mod runner;
pub mod runtime;
mod state;
pub mod watchdog;

pub use config::{
    DEFAULT_DEPENDENCY_TIMEOUT, DEFAULT_PULL_PARALLELISM, LINUX_HOST_GATEWAY, RunnerConfig,
};
pub use docker::DockerCli;
pub use error::{Error, Result, TAIL_LINES, failure_report, tail};
pub use ports::{MAX_PORT_ATTEMPTS, PortReserver};
pub use pull::{ImagePuller, PullEvent};
pub use runner::{LocalRunner, teardown};
pub use runtime::{ContainerEvent, ContainerInfo, ContainerRuntime, EventKind};
pub use state::{ExitSignal, HostHandle, StateHandle, TaskState, TaskStatus};
