//! Target platforms tools can be installed for.

use std::fmt;

/// Operating system part of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Os {
    Linux,
    Darwin,
    /// Synthetic platform for binaries destined to run inside containers.
    Docker,
}

impl Os {
    pub fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Docker => "docker",
        }
    }
}

/// CPU architecture part of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }
}

/// A platform a tool can be fetched for, displayed as `os.arch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub const LINUX_AMD64: Platform = Platform {
        os: Os::Linux,
        arch: Arch::Amd64,
    };
    pub const DARWIN_AMD64: Platform = Platform {
        os: Os::Darwin,
        arch: Arch::Amd64,
    };
    pub const DARWIN_ARM64: Platform = Platform {
        os: Os::Darwin,
        arch: Arch::Arm64,
    };
    pub const DOCKER_AMD64: Platform = Platform {
        os: Os::Docker,
        arch: Arch::Amd64,
    };
    pub const DOCKER_ARM64: Platform = Platform {
        os: Os::Docker,
        arch: Arch::Arm64,
    };

    /// Platform of the host this binary was built for.
    pub fn local() -> Platform {
        let os = if cfg!(target_os = "macos") {
            Os::Darwin
        } else {
            Os::Linux
        };
        let arch = if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else {
            Arch::Amd64
        };
        Platform { os, arch }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.os.as_str(), self.arch.as_str())
    }
}
