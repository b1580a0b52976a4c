//! quarry: the build environment of this repository.
//!
//! Registers the standard command set plus the project's own commands and
//! hands control to the quarry-build CLI driver. Try:
//!
//! ```text
//! quarry              # list commands
//! quarry ci           # lint + test
//! quarry tools/setup  # install the toolset for this host
//! ```

use std::process::{self, Command as Process};
use std::sync::Arc;

use owo_colors::OwoColorize;
use quarry_build::{cli, commands, Command, CommandFn, Registry, Toolset};

fn main() {
    let mut registry = Registry::new();
    if let Err(err) = register_all(&mut registry) {
        eprintln!("{} {err}", "error:".red().bold());
        process::exit(1);
    }

    cli::main("quarry", env!("CARGO_PKG_VERSION"), registry)
}

fn register_all(registry: &mut Registry) -> quarry_build::Result<()> {
    let toolset = Arc::new(Toolset::new());
    registry.register(commands::commands(toolset))?;
    registry.register(project_commands())
}

fn project_commands() -> Vec<(String, Command)> {
    let lint = CommandFn::new(|_ctx, _deps| {
        cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
    });
    let test = CommandFn::new(|_ctx, _deps| cargo(&["test", "--workspace"]));
    let tidy = CommandFn::new(|_ctx, _deps| cargo(&["fmt", "--all"]));
    let ci = {
        let lint = lint.clone();
        let test = test.clone();
        CommandFn::new(move |_ctx, deps| deps.demand(&[lint.clone(), test.clone()]))
    };

    vec![
        (
            "lint".to_string(),
            Command::from_fn("Lints the workspace", lint),
        ),
        ("test".to_string(), Command::from_fn("Runs unit tests", test)),
        (
            "tidy".to_string(),
            Command::from_fn("Formats the source tree", tidy),
        ),
        (
            "ci".to_string(),
            Command::from_fn("Lints and tests the workspace", ci),
        ),
    ]
}

fn cargo(args: &[&str]) -> quarry_build::Result<()> {
    let status = Process::new("cargo").args(args).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(quarry_build::Error::Other(format!(
            "cargo {} failed with {status}",
            args[0]
        )))
    }
}
