//! CLI driver: flag parsing, autocompletion dispatch, command listing and
//! environment setup around the executor.

use std::env;
use std::process;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::complete;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor;
use crate::platform::Platform;
use crate::registry::Registry;
use crate::store;

/// Build environment runner.
#[derive(Parser, Debug)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Command paths to execute
    #[arg(value_name = "PATH")]
    paths: Vec<String>,
}

/// Run the environment named `name` at `version` over `registry` and exit
/// with a status reflecting the outcome.
pub fn main(name: &str, version: &str, registry: Registry) -> ! {
    match run(name, version, &registry) {
        Ok(()) => process::exit(0),
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            process::exit(1);
        }
    }
}

/// The fallible body of [`main`].
pub fn run(name: &str, version: &str, registry: &Registry) -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(prefix) = completion_prefix() {
        let comp_type = env::var("COMP_TYPE").unwrap_or_default();
        for line in complete::complete(registry.paths(), &prefix, &comp_type) {
            println!("{line}");
        }
        return Ok(());
    }

    if cli.paths.is_empty() {
        list_commands(registry);
        return Ok(());
    }

    let mut ctx = Context::new(name, version);
    if let Some(root) = env::var_os("QUARRY_CACHE_DIR") {
        ctx = ctx.with_cache_root(root);
    }

    change_working_dir()?;
    set_path(&ctx)?;

    let paths: Vec<&str> = cli
        .paths
        .iter()
        .map(|path| path.strip_suffix('/').unwrap_or(path))
        .collect();
    executor::execute(&ctx, registry, &paths)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn completion_prefix() -> Option<String> {
    let exe = env::args().next().unwrap_or_default();
    let line = env::var("COMP_LINE").ok()?;
    let point = env::var("COMP_POINT").ok()?;
    complete::prefix(&exe, &line, &point)
}

fn list_commands(registry: &Registry) {
    let width = registry.paths().map(str::len).max().unwrap_or(0);
    println!("\n Available commands:\n");
    for (path, command) in registry.iter() {
        let padded = format!("{path:<width$}");
        println!("   {}  {}", padded.cyan(), command.description);
    }
    println!();
}

/// Move to the project root: the executable lives at
/// `<root>/bin/.cache/<name>`, so the root is three levels above the
/// resolved executable path.
fn change_working_dir() -> Result<()> {
    let exe = env::current_exe()?.canonicalize()?;
    let root = exe
        .ancestors()
        .nth(3)
        .ok_or_else(|| Error::Other(format!("executable path {} is too shallow", exe.display())))?;
    env::set_current_dir(root)?;
    Ok(())
}

/// Put `<project>/bin` and the version-qualified tool bin directory first on
/// `PATH`, dropping any previous occurrences of either.
fn set_path(ctx: &Context) -> Result<()> {
    let project_bin = store::project_bin_dir()?;
    let tool_bin = store::version_dir(ctx, Platform::local())?.join("bin");

    let mut entries = vec![project_bin.clone(), tool_bin.clone()];
    for entry in env::split_paths(&env::var_os("PATH").unwrap_or_default()) {
        if entry.starts_with(&project_bin) || entry.starts_with(&tool_bin) {
            continue;
        }
        entries.push(entry);
    }
    let joined = env::join_paths(entries).map_err(|err| Error::Other(err.to_string()))?;
    env::set_var("PATH", joined);
    Ok(())
}
