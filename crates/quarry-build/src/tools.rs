//! Tool installer: fetch, verify, unpack and link external tool binaries.
//!
//! Installed state is kept honest through a two-level link scheme. Each tool
//! stages content-addressed symlinks under `_links/` inside its download
//! directory: `<dst>:sha256:<hex>` points (relatively) at the unpacked file,
//! and the stable alias `<dst>` points at that content-addressed name. The
//! version directory then links `<dst>` into `_links/`, forming the chain
//! *version link → alias → content-addressed link → real file*. Re-running
//! [`BinaryTool::ensure`] re-derives everything from this chain, so it is
//! idempotent and detects on-disk tampering without re-downloading.

use std::collections::BTreeMap;
use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{self, ErrorKind};
use std::os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::integrity::{checksum_file, HashingReader};
use crate::platform::Platform;
use crate::{archive, store};

/// A tool that can be made available to the build environment.
pub trait Tool: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    /// Whether the tool can be installed for `platform`.
    fn is_compatible(&self, platform: Platform) -> bool;
    /// Download and hash every source without installing; returns one error
    /// per mismatching source.
    fn verify(&self, ctx: &Context) -> Result<Vec<Error>>;
    /// Install the tool for `platform` unless it is already present intact.
    fn ensure(&self, ctx: &Context, platform: Platform) -> Result<()>;
}

/// Where one tool is fetched from for one platform.
#[derive(Debug)]
pub struct Source {
    /// HTTP(S) URL of the archive or raw binary.
    pub url: String,
    /// Declared checksum of the payload, `sha256:<hex>`.
    pub hash: String,
    /// Binaries to expose: destination relative path → source relative path
    /// inside the unpacked archive.
    pub links: BTreeMap<String, String>,
}

/// Per-platform sources of a tool.
pub type Sources = BTreeMap<Platform, Source>;

/// A tool distributed as prebuilt binaries.
#[derive(Debug)]
pub struct BinaryTool {
    pub name: String,
    pub version: String,
    pub sources: Sources,
}

impl Tool for BinaryTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn is_compatible(&self, platform: Platform) -> bool {
        self.sources.contains_key(&platform)
    }

    fn verify(&self, ctx: &Context) -> Result<Vec<Error>> {
        let mut errors = Vec::new();
        for (platform, source) in &self.sources {
            ctx.check_cancelled()?;
            let response = http_get(&source.url)?;
            let reader = HashingReader::new(response, &source.hash)
                .map_err(|err| self.with_context(*platform, err))?;
            if let Err(err) = reader.validate() {
                errors.push(self.with_context(*platform, err));
            }
        }
        Ok(errors)
    }

    fn ensure(&self, ctx: &Context, platform: Platform) -> Result<()> {
        let source = self.source(platform)?;

        let install = source
            .links
            .iter()
            .any(|(dst, src)| should_reinstall(ctx, platform, self, dst, src));
        if install {
            self.install(ctx, platform)?;
        }

        link_files(ctx, platform, self, source.links.keys())
    }
}

impl BinaryTool {
    fn source(&self, platform: Platform) -> Result<&Source> {
        self.sources
            .get(&platform)
            .ok_or_else(|| Error::PlatformUnsupported {
                tool: self.name.clone(),
                platform,
            })
    }

    fn install(&self, ctx: &Context, platform: Platform) -> Result<()> {
        let source = self.source(platform)?;
        info!(
            tool = %self.name,
            version = %self.version,
            url = %source.url,
            %platform,
            "installing binaries"
        );

        let download_dir = store::tool_download_dir(ctx, platform, self)?;
        if download_dir.exists() {
            fs::remove_dir_all(&download_dir)?;
        }

        let result = self.fetch_and_stage(ctx, platform, source, &download_dir);
        if result.is_err() {
            let _ = fs::remove_dir_all(&download_dir);
        }
        result
    }

    fn fetch_and_stage(
        &self,
        ctx: &Context,
        platform: Platform,
        source: &Source,
        download_dir: &Path,
    ) -> Result<()> {
        let response = http_get(&source.url)?;
        let mut reader = HashingReader::new(response, &source.hash)?;

        match archive::inflate(&source.url, &mut reader, download_dir) {
            Ok(()) => {}
            Err(Error::UnknownArchiveFormat(_)) => {
                fs::create_dir_all(download_dir)?;
                let target = download_dir.join(base_name(&source.url));
                let mut file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .mode(0o700)
                    .open(&target)?;
                io::copy(&mut reader, &mut file)?;
            }
            Err(err) => return Err(err),
        }

        reader.validate()?;

        let links_dir = store::tool_links_dir(ctx, platform, self)?;
        for (dst, src) in &source.links {
            let src_path = download_dir.join(src);
            let checksum = checksum_file(&src_path)?;

            let dst_path = links_dir.join(dst);
            let dst_path_checksum = links_dir.join(format!("{dst}:{checksum}"));
            remove_existing(&dst_path)?;
            remove_existing(&dst_path_checksum)?;

            let parent = dst_path
                .parent()
                .ok_or_else(|| Error::Other(format!("link destination {dst} has no parent")))?;
            DirBuilder::new().recursive(true).mode(0o700).create(parent)?;
            fs::set_permissions(&src_path, Permissions::from_mode(0o700))?;

            let target = pathdiff::diff_paths(&src_path, parent).ok_or_else(|| {
                Error::Other(format!(
                    "no relative path from {} to {}",
                    parent.display(),
                    src_path.display()
                ))
            })?;
            symlink(&target, &dst_path_checksum)?;
            let alias_target = dst_path_checksum
                .file_name()
                .ok_or_else(|| Error::Other(format!("link destination {dst} has no file name")))?;
            symlink(alias_target, &dst_path)?;

            info!(path = %dst_path.display(), "binary installed");
        }

        info!(tool = %self.name, "binaries installed");
        Ok(())
    }

    fn with_context(&self, platform: Platform, err: Error) -> Error {
        Error::Tool {
            tool: format!("{}@{} ({})", self.name, self.version, platform),
            source: Box::new(err),
        }
    }
}

/// Whether the staged link for `dst` no longer proves an intact install of
/// `src` and the tool must be reinstalled.
fn should_reinstall(
    ctx: &Context,
    platform: Platform,
    tool: &BinaryTool,
    dst: &str,
    src: &str,
) -> bool {
    let (Ok(download_dir), Ok(links_dir)) = (
        store::tool_download_dir(ctx, platform, tool),
        store::tool_links_dir(ctx, platform, tool),
    ) else {
        return true;
    };

    let Ok(src_real) = download_dir.join(src).canonicalize() else {
        return true;
    };
    let dst_path = links_dir.join(dst);
    let Ok(dst_real) = dst_path.canonicalize() else {
        return true;
    };
    if dst_real != src_real {
        return true;
    }

    let Ok(meta) = fs::metadata(&dst_real) else {
        return true;
    };
    if !meta.is_file() || meta.permissions().mode() & 0o100 == 0 {
        return true;
    }

    // The alias must point at a content-addressed name carrying the digest
    // the file is expected to hash to.
    let Ok(linked) = fs::read_link(&dst_path) else {
        return true;
    };
    let Some(link_name) = linked.file_name().and_then(|name| name.to_str()) else {
        return true;
    };
    let parts: Vec<&str> = link_name.split(':').collect();
    if parts.len() < 3 {
        return true;
    }
    let declared = format!("{}:{}", parts[parts.len() - 2], parts[parts.len() - 1]);

    let Ok(file) = File::open(&dst_real) else {
        return true;
    };
    let Ok(reader) = HashingReader::new(file, &declared) else {
        return true;
    };
    let stale = reader.validate().is_err();
    if stale {
        debug!(tool = %tool.name, dst, "staged binary failed re-verification");
    }
    stale
}

/// Refresh the version-qualified links for `binaries` that do not resolve to
/// the same file as their staged alias.
fn link_files<'a>(
    ctx: &Context,
    platform: Platform,
    tool: &BinaryTool,
    binaries: impl Iterator<Item = &'a String>,
) -> Result<()> {
    let links_dir = store::tool_links_dir(ctx, platform, tool)?;
    let version_dir = store::version_dir(ctx, platform)?;

    for dst in binaries {
        let staged = links_dir.join(dst);
        let staged_real = staged.canonicalize()?;

        let versioned = version_dir.join(dst);
        if let Ok(real) = versioned.canonicalize() {
            if real == staged_real {
                continue;
            }
        }

        remove_existing(&versioned)?;
        let parent = versioned
            .parent()
            .ok_or_else(|| Error::Other(format!("version link {dst} has no parent")))?;
        DirBuilder::new().recursive(true).mode(0o700).create(parent)?;
        let target = pathdiff::diff_paths(&staged, parent).ok_or_else(|| {
            Error::Other(format!(
                "no relative path from {} to {}",
                parent.display(),
                staged.display()
            ))
        })?;
        symlink(&target, &versioned)?;
        debug!(path = %versioned.display(), "version link refreshed");
    }
    Ok(())
}

/// The set of tools an environment can install.
#[derive(Default)]
pub struct Toolset {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Toolset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any previous tool of the same name.
    pub fn add(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }

    /// Install one tool for `platform`.
    pub fn ensure(&self, ctx: &Context, name: &str, platform: Platform) -> Result<()> {
        self.get(name)?.ensure(ctx, platform)
    }

    /// Install every registered tool for the local platform, skipping tools
    /// with no source for it.
    pub fn ensure_all(&self, ctx: &Context) -> Result<()> {
        let platform = Platform::local();
        for tool in self.tools.values() {
            ctx.check_cancelled()?;
            if !tool.is_compatible(platform) {
                debug!(tool = tool.name(), %platform, "skipping incompatible tool");
                continue;
            }
            tool.ensure(ctx, platform)?;
        }
        Ok(())
    }

    /// Download and hash every source of every tool without installing.
    pub fn verify_checksums(&self, ctx: &Context) -> Result<()> {
        let mut errors = Vec::new();
        for tool in self.tools.values() {
            errors.extend(tool.verify(ctx)?);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }
}

fn http_get(url: &str) -> Result<reqwest::blocking::Response> {
    static CLIENT: OnceLock<reqwest::blocking::Client> = OnceLock::new();
    let client = match CLIENT.get() {
        Some(client) => client,
        None => {
            let built = reqwest::blocking::Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .timeout(None::<Duration>)
                .user_agent(concat!("quarry-build/", env!("CARGO_PKG_VERSION")))
                .build()?;
            CLIENT.get_or_init(|| built)
        }
    };
    Ok(client.get(url).send()?.error_for_status()?)
}

fn base_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use sha2::{Digest, Sha256};

    use super::*;

    /// Serve `bytes` for every request on a loopback port, counting hits.
    fn serve(bytes: Vec<u8>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request);
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    bytes.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&bytes);
            }
        });
        (format!("http://{addr}"), hits)
    }

    fn targz(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn sha256_hex(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    #[test]
    fn ensure_installs_links_and_is_idempotent() {
        let platform = Platform::local();
        let payload = targz(&[("pkg/mybin", b"#!/bin/sh\necho mybin\n", 0o755)]);
        let declared = format!("sha256:{}", sha256_hex(&payload));
        let (base, hits) = serve(payload);

        let cache = tempfile::tempdir().unwrap();
        let ctx = Context::new("quarry-test", "1.0.0").with_cache_root(cache.path());

        let mut links = BTreeMap::new();
        links.insert("bin/mybin".to_string(), "pkg/mybin".to_string());
        let mut sources = BTreeMap::new();
        sources.insert(
            platform,
            Source {
                url: format!("{base}/mytool.tar.gz"),
                hash: declared,
                links,
            },
        );
        let tool = BinaryTool {
            name: "mytool".to_string(),
            version: "1.2.3".to_string(),
            sources,
        };

        tool.ensure(&ctx, platform).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let download_dir = store::tool_download_dir(&ctx, platform, &tool).unwrap();
        let unpacked = download_dir.join("pkg/mybin");
        assert!(unpacked.is_file());

        // Staged alias points at the content-addressed name.
        let links_dir = store::tool_links_dir(&ctx, platform, &tool).unwrap();
        let alias = links_dir.join("bin/mybin");
        let bin_checksum = checksum_file(&unpacked).unwrap();
        let addressed = links_dir.join(format!("bin/mybin:{bin_checksum}"));
        assert_eq!(
            fs::read_link(&alias).unwrap(),
            std::path::PathBuf::from(format!("mybin:{bin_checksum}"))
        );
        assert!(addressed.symlink_metadata().unwrap().file_type().is_symlink());

        // The version-qualified link resolves through the whole chain to an
        // executable file with the declared content.
        let versioned = store::version_dir(&ctx, platform).unwrap().join("bin/mybin");
        let real = versioned.canonicalize().unwrap();
        assert_eq!(real, unpacked.canonicalize().unwrap());
        assert_eq!(store::bin(&ctx, "bin/mybin", platform).unwrap(), real);
        let mode = fs::metadata(&real).unwrap().permissions().mode();
        assert_ne!(mode & 0o100, 0);

        // Second ensure performs no network request and keeps the links.
        tool.ensure(&ctx, platform).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(versioned.canonicalize().unwrap(), real);

        // Tampering with the unpacked binary triggers a full reinstall.
        fs::write(&unpacked, b"tampered").unwrap();
        tool.ensure(&ctx, platform).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        let restored = versioned.canonicalize().unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"#!/bin/sh\necho mybin\n");
    }

    #[test]
    fn checksum_mismatch_fails_and_removes_download_dir() {
        let platform = Platform::local();
        let payload = targz(&[("pkg/mybin", b"#!/bin/sh\n", 0o755)]);
        let declared = format!("sha256:{}", sha256_hex(b"different payload"));
        let (base, _hits) = serve(payload);

        let cache = tempfile::tempdir().unwrap();
        let ctx = Context::new("quarry-test", "1.0.0").with_cache_root(cache.path());

        let mut links = BTreeMap::new();
        links.insert("bin/mybin".to_string(), "pkg/mybin".to_string());
        let mut sources = BTreeMap::new();
        sources.insert(
            platform,
            Source {
                url: format!("{base}/mytool.tar.gz"),
                hash: declared,
                links,
            },
        );
        let tool = BinaryTool {
            name: "mytool".to_string(),
            version: "9.9.9".to_string(),
            sources,
        };

        let err = tool.ensure(&ctx, platform).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        let download_dir = store::tool_download_dir(&ctx, platform, &tool).unwrap();
        assert!(!download_dir.exists());
    }

    #[test]
    fn raw_payload_is_stored_under_url_base_name() {
        let platform = Platform::local();
        let payload = b"#!/bin/sh\necho raw\n".to_vec();
        let declared = format!("sha256:{}", sha256_hex(&payload));
        let (base, _hits) = serve(payload.clone());

        let cache = tempfile::tempdir().unwrap();
        let ctx = Context::new("quarry-test", "1.0.0").with_cache_root(cache.path());

        let mut links = BTreeMap::new();
        links.insert("rawtool".to_string(), "rawtool".to_string());
        let mut sources = BTreeMap::new();
        sources.insert(
            platform,
            Source {
                url: format!("{base}/rawtool"),
                hash: declared,
                links,
            },
        );
        let tool = BinaryTool {
            name: "rawtool".to_string(),
            version: "0.1.0".to_string(),
            sources,
        };

        tool.ensure(&ctx, platform).unwrap();
        let stored = store::tool_download_dir(&ctx, platform, &tool)
            .unwrap()
            .join("rawtool");
        assert_eq!(fs::read(&stored).unwrap(), payload);
        let mode = fs::metadata(&stored).unwrap().permissions().mode();
        assert_ne!(mode & 0o100, 0);
    }

    #[test]
    fn ensure_fails_for_unconfigured_platform() {
        let tool = BinaryTool {
            name: "mytool".to_string(),
            version: "1.0.0".to_string(),
            sources: BTreeMap::new(),
        };
        let ctx = Context::new("quarry-test", "1.0.0");
        let err = tool.ensure(&ctx, Platform::DOCKER_ARM64).unwrap_err();
        assert!(matches!(err, Error::PlatformUnsupported { .. }));
    }

    #[test]
    fn ensure_all_skips_incompatible_tools() {
        let incompatible = Platform::DOCKER_ARM64;
        assert_ne!(incompatible, Platform::local());

        let mut sources = BTreeMap::new();
        sources.insert(
            incompatible,
            Source {
                url: "http://127.0.0.1:1/never.tar.gz".to_string(),
                hash: "sha256:00".to_string(),
                links: BTreeMap::new(),
            },
        );
        let mut toolset = Toolset::new();
        toolset.add(BinaryTool {
            name: "elsewhere".to_string(),
            version: "1.0.0".to_string(),
            sources,
        });

        let cache = tempfile::tempdir().unwrap();
        let ctx = Context::new("quarry-test", "1.0.0").with_cache_root(cache.path());
        toolset.ensure_all(&ctx).unwrap();
    }

    #[test]
    fn toolset_lookup_reports_unknown_tool() {
        let toolset = Toolset::new();
        assert!(matches!(
            toolset.get("absent").unwrap_err(),
            Error::ToolNotFound(name) if name == "absent"
        ));
    }
}
