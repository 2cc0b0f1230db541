use std::process::Command;

fn main() {
    let build_hash = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty());

    println!(
        "cargo:rustc-env=BUILD_HASH={}",
        build_hash.as_deref().unwrap_or("unknown")
    );
}
