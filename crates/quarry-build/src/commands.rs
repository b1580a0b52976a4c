//! Built-in commands useful for every environment.

use std::env;
use std::process;
use std::sync::Arc;

use crate::context::Context;
use crate::error::Result;
use crate::executor::Deps;
use crate::platform::Platform;
use crate::registry::Command;
use crate::store;
use crate::tools::Toolset;

/// The standard command set over `toolset`: tool installation, checksum
/// verification and an interactive environment shell.
pub fn commands(toolset: Arc<Toolset>) -> Vec<(String, Command)> {
    let setup = {
        let toolset = toolset.clone();
        Command::new(
            "Installs all the tools for the host platform",
            move |ctx, _deps| toolset.ensure_all(ctx),
        )
    };
    let verify = Command::new(
        "Verifies the checksums of all the tools",
        move |ctx, _deps| toolset.verify_checksums(ctx),
    );
    let enter = Command::new("Enters the environment shell", enter);

    vec![
        ("enter".to_string(), enter),
        ("tools/setup".to_string(), setup),
        ("tools/verify".to_string(), verify),
    ]
}

/// Spawn an interactive shell with the environment's bin directories first
/// on `PATH` and a prompt naming the environment. The shell's exit status is
/// deliberately ignored; leaving the shell is not a build failure.
fn enter(ctx: &Context, _deps: &Deps) -> Result<()> {
    let project_bin = store::project_bin_dir()?;
    let tool_bin = store::version_dir(ctx, Platform::local())?.join("bin");
    let path = env::var("PATH").unwrap_or_default();

    let mut shell = process::Command::new("bash");
    shell.env("PS1", format!("({}) [\\u@\\h \\W]\\$ ", ctx.name()));
    shell.env(
        "PATH",
        format!("{}:{}:{path}", project_bin.display(), tool_bin.display()),
    );
    shell.status()?;
    Ok(())
}
