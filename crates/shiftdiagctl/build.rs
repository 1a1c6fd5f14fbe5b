//! Stamps `shiftdiagctl --version` with the release and the target triple.
//!
//! Fleets mix aarch64 and x86_64 edge hosts, so the triple is part of what
//! identifies the binary a host runs.

use std::env;

fn main() {
    let release = env::var("SHIFTDIAG_RELEASE").unwrap_or_default();
    let version = match release.trim() {
        "" => env!("CARGO_PKG_VERSION").to_string(),
        tag => format!("{}+{}", env!("CARGO_PKG_VERSION"), tag),
    };
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=SHIFTDIAG_VERSION={}", version);
    println!("cargo:rustc-env=SHIFTDIAG_LONG_VERSION={} ({})", version, target);
    println!("cargo:rerun-if-env-changed=SHIFTDIAG_RELEASE");
}
