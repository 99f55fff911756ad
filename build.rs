use std::process::Command;

/// Short commit hash: `GIT_SHA` wins, then the local checkout
fn commit_hash() -> Option<String> {
    let from_env = std::env::var("GIT_SHA").ok();
    let from_git = || {
        let out = Command::new("git")
            .args(["rev-parse", "--short=8", "HEAD"])
            .output()
            .ok()?;
        out.status
            .success()
            .then(|| String::from_utf8_lossy(&out.stdout).into_owned())
    };
    from_env
        .or_else(from_git)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

fn main() {
    let version = match commit_hash() {
        Some(hash) => format!("{}+{}", env!("CARGO_PKG_VERSION"), hash),
        None => env!("CARGO_PKG_VERSION").to_owned(),
    };
    println!("cargo:rustc-env=APP_VERSION={version}");

    println!("cargo:rerun-if-env-changed=GIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
