use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

const JAVA_SOURCES: &str = "java/src/main/java";

fn main() {
    println!("cargo:rerun-if-changed={}", JAVA_SOURCES);
    println!("cargo:rerun-if-env-changed=JAVA_HOME");
    println!("cargo:rustc-check-cfg=cfg(rust_jni_bridge_handler)");
    let java_home = env::var_os("JAVA_HOME").map(PathBuf::from);
    if env::var_os("CARGO_FEATURE_LIBJVM").is_some() {
        link_libjvm(java_home.as_deref());
    }
    compile_handler(java_home.as_deref());
}

fn is_libjvm(file_name: &OsStr) -> bool {
    matches!(
        file_name.to_str(),
        Some("libjvm.so") | Some("libjvm.dylib") | Some("jvm.lib")
    )
}

fn link_libjvm(java_home: Option<&Path>) {
    let directory = java_home.and_then(|java_home| {
        WalkDir::new(java_home)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_type().is_file() && is_libjvm(entry.file_name()))
            .and_then(|entry| entry.path().parent().map(Path::to_path_buf))
    });
    match directory {
        Some(directory) => {
            println!("cargo:rustc-link-search=native={}", directory.display());
        }
        None => println!(
            "cargo:warning=libjvm not found under JAVA_HOME, relying on the default library path"
        ),
    }
    println!("cargo:rustc-link-lib=dylib=jvm");
}

/// Compile the invocation handler so the runtime can define it when it isn't on the
/// classpath. Without a JDK the class has to be shipped on the classpath instead.
fn compile_handler(java_home: Option<&Path>) {
    let sources: Vec<PathBuf> = WalkDir::new(JAVA_SOURCES)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension() == Some(OsStr::new("java")))
        .map(|entry| entry.path().to_path_buf())
        .collect();
    if sources.is_empty() {
        return;
    }
    let javac = match java_home {
        Some(java_home) => java_home.join("bin").join("javac"),
        None => PathBuf::from("javac"),
    };
    let out_dir = match env::var_os("OUT_DIR") {
        Some(out_dir) => PathBuf::from(out_dir),
        None => return,
    };
    let status = Command::new(&javac)
        .arg("-d")
        .arg(&out_dir)
        .args(&sources)
        .status();
    match status {
        Ok(status) if status.success() => println!("cargo:rustc-cfg=rust_jni_bridge_handler"),
        Ok(status) => println!("cargo:warning={} failed with {}", javac.display(), status),
        Err(error) => println!(
            "cargo:warning=could not run {}: {}",
            javac.display(),
            error
        ),
    }
}
