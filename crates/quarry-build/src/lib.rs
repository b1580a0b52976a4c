//! quarry-build: project-local build orchestration.
//!
//! A build environment registers commands under slash-separated paths and
//! hands them to the CLI driver. Commands declare prerequisites by demanding
//! other command functions at runtime; the executor memoizes, detects cycles
//! and serializes everything. Tools the environment needs are described as
//! [`BinaryTool`]s and installed into a content-addressed cache wired onto
//! `PATH` through relative symlinks.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use quarry_build::{cli, commands, Command, Registry, Toolset};
//!
//! let toolset = Arc::new(Toolset::new());
//! let mut registry = Registry::new();
//! registry
//!     .register(commands::commands(toolset))
//!     .expect("duplicate command path");
//! registry
//!     .register(vec![(
//!         "test".to_string(),
//!         Command::new("Runs tests", |_ctx, _deps| Ok(())),
//!     )])
//!     .expect("duplicate command path");
//! cli::main("myenv", env!("CARGO_PKG_VERSION"), registry)
//! ```

pub mod archive;
pub mod cli;
pub mod commands;
pub mod complete;
pub mod context;
pub mod error;
pub mod executor;
pub mod integrity;
pub mod platform;
pub mod registry;
pub mod store;
pub mod tools;

pub use context::Context;
pub use error::{Error, Result};
pub use executor::{execute, Deps};
pub use platform::{Arch, Os, Platform};
pub use registry::{Command, CommandFn, Registry};
pub use tools::{BinaryTool, Source, Sources, Tool, Toolset};
