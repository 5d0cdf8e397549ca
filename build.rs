//! Stamps the build with a version and commit for the startup log line.
//!
//! Packaging scripts may set MRB_VERSION and MRB_GIT_SHA; otherwise the
//! crate version and `git rev-parse` are used.

use std::process::Command;

fn main() {
    let version = std::env::var("MRB_VERSION").unwrap_or_else(|_| {
        std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".into())
    });
    println!("cargo:rustc-env=MRB_VERSION={}", version);

    let git_sha = std::env::var("MRB_GIT_SHA")
        .ok()
        .or_else(|| {
            std::env::var("GITHUB_SHA")
                .ok()
                .map(|sha| sha.chars().take(7).collect())
        })
        .unwrap_or_else(short_head);
    println!("cargo:rustc-env=MRB_GIT_SHA={}", git_sha);

    println!("cargo:rerun-if-env-changed=MRB_VERSION");
    println!("cargo:rerun-if-env-changed=MRB_GIT_SHA");
    println!("cargo:rerun-if-env-changed=GITHUB_SHA");
}

fn short_head() -> String {
    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|sha| sha.trim().to_string())
        .filter(|sha| !sha.is_empty())
        .unwrap_or_else(|| "unknown".into())
}
