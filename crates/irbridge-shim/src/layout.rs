//! Artifact layout for the staged native library.
//!
//! A built shim lives at `<base>/runtimes/<rid>/native/<file>`, where `rid`
//! is a platform identifier such as `linux-x64` or `osx-arm64`.

use std::path::{Path, PathBuf};

/// Platform identifier for the host, or `None` on an unlisted OS/arch pair.
pub fn runtime_identifier() -> Option<&'static str> {
    runtime_identifier_for(std::env::consts::OS, std::env::consts::ARCH)
}

pub fn runtime_identifier_for(os: &str, arch: &str) -> Option<&'static str> {
    Some(match (os, arch) {
        ("linux", "x86_64") => "linux-x64",
        ("linux", "aarch64") => "linux-arm64",
        ("macos", "x86_64") => "osx-x64",
        ("macos", "aarch64") => "osx-arm64",
        ("windows", "x86_64") => "win-x64",
        ("windows", "aarch64") => "win-arm64",
        _ => return None,
    })
}

/// File name of the shim library for a platform identifier.
pub fn library_file_name(rid: &str) -> &'static str {
    if rid.starts_with("win-") {
        "irbridge_shim.dll"
    } else if rid.starts_with("osx-") {
        "libirbridge_shim.dylib"
    } else {
        "libirbridge_shim.so"
    }
}

pub fn native_library_path(base: &Path, rid: &str) -> PathBuf {
    base.join("runtimes")
        .join(rid)
        .join("native")
        .join(library_file_name(rid))
}

/// Locate the staged library for the host beneath `base`.
pub fn discover(base: &Path) -> Option<PathBuf> {
    let rid = runtime_identifier()?;
    let path = native_library_path(base, rid);
    tracing::debug!(path = %path.display(), "probing for native shim");
    path.is_file().then_some(path)
}
