use std::path::Path;
use std::process::Command;

fn main() {
    let version = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| std::env::var("CARGO_PKG_VERSION").unwrap_or_default());

    println!("cargo:rustc-env=GIT_VERSION={}", version);
    println!("cargo::rustc-check-cfg=cfg(distribute)");

    // PROFILE only reports "debug" or "release"; custom profiles show up as
    // the target directory name.
    let out_dir = std::env::var("OUT_DIR").unwrap_or_default();
    if Path::new(&out_dir).components().any(|c| c.as_os_str() == "distribute") {
        println!("cargo:rustc-cfg=distribute");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
}
