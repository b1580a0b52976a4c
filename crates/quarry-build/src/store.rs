//! On-disk layout of the per-environment tool cache.
//!
//! Everything lives under `<user-cache>/<env-name>/`:
//!
//! ```text
//! <env-name>/<platform>/downloads/<tool>-<version>/          unpacked archive
//! <env-name>/<platform>/downloads/<tool>-<version>/_links/   staged, content-addressed links
//! <env-name>/<platform>/<env-version>/<binary>               stable PATH-visible links
//! ./bin/                                                     project-local binaries
//! ```
//!
//! All links written into this tree are relative, so the cache directory can
//! be relocated without breaking them.

use std::fs;
use std::path::PathBuf;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::tools::Tool;

/// Root directory of the environment's cache.
pub fn env_dir(ctx: &Context) -> Result<PathBuf> {
    if let Some(root) = ctx.cache_root() {
        return Ok(root.join(ctx.name()));
    }
    let cache = dirs::cache_dir()
        .ok_or_else(|| Error::Other("user cache directory is not available".into()))?;
    Ok(cache.join(ctx.name()))
}

/// Directory holding platform-specific state.
pub fn platform_dir(ctx: &Context, platform: Platform) -> Result<PathBuf> {
    Ok(env_dir(ctx)?.join(platform.to_string()))
}

/// Directory holding the stable, version-qualified binary links. This is the
/// directory exposed through `PATH`.
pub fn version_dir(ctx: &Context, platform: Platform) -> Result<PathBuf> {
    Ok(platform_dir(ctx, platform)?.join(ctx.version()))
}

fn downloads_dir(ctx: &Context, platform: Platform) -> Result<PathBuf> {
    Ok(platform_dir(ctx, platform)?.join("downloads"))
}

/// Directory a tool's archive is unpacked into.
pub fn tool_download_dir(ctx: &Context, platform: Platform, tool: &dyn Tool) -> Result<PathBuf> {
    Ok(downloads_dir(ctx, platform)?.join(format!("{}-{}", tool.name(), tool.version())))
}

/// Directory holding a tool's staged installation links.
pub fn tool_links_dir(ctx: &Context, platform: Platform, tool: &dyn Tool) -> Result<PathBuf> {
    Ok(tool_download_dir(ctx, platform, tool)?.join("_links"))
}

/// Project-local bin directory, created on first use.
pub fn project_bin_dir() -> Result<PathBuf> {
    fs::create_dir_all("./bin")?;
    Ok(fs::canonicalize("./bin")?)
}

/// Resolve a version-qualified binary to its real path.
pub fn bin(ctx: &Context, binary: &str, platform: Platform) -> Result<PathBuf> {
    Ok(version_dir(ctx, platform)?.join(binary).canonicalize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_the_cache_scheme() {
        let ctx = Context::new("enviro", "0.9.0").with_cache_root("/tmp/cache");
        let platform = Platform::LINUX_AMD64;
        assert_eq!(
            env_dir(&ctx).unwrap(),
            PathBuf::from("/tmp/cache/enviro")
        );
        assert_eq!(
            version_dir(&ctx, platform).unwrap(),
            PathBuf::from("/tmp/cache/enviro/linux.amd64/0.9.0")
        );
    }
}
