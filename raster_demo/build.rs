// build.rs
// Compiles the demo's GLSL shaders to SPIR-V in target/shaders

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const SHADER_EXTENSIONS: [&str; 2] = ["vert", "frag"];

/// glslc from the Vulkan SDK, else whatever is on PATH
fn find_glslc() -> Option<PathBuf> {
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");

    if let Ok(sdk) = env::var("VULKAN_SDK") {
        let candidate = if cfg!(target_os = "windows") {
            PathBuf::from(sdk).join("Bin").join("glslc.exe")
        } else {
            PathBuf::from(sdk).join("bin").join("glslc")
        };
        if candidate.exists() {
            return Some(candidate);
        }
    }

    Command::new("glslc")
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|_| PathBuf::from("glslc"))
}

/// `scene.vert` compiles to `scene.vert.spv`
fn output_path(source: &Path, target_dir: &Path) -> Option<PathBuf> {
    let name = source.file_name()?.to_str()?;
    Some(target_dir.join(format!("{name}.spv")))
}

fn needs_compile(source: &Path, output: &Path) -> bool {
    match (
        std::fs::metadata(source).and_then(|m| m.modified()),
        std::fs::metadata(output).and_then(|m| m.modified()),
    ) {
        (Ok(src), Ok(dst)) => src > dst,
        _ => true,
    }
}

fn main() {
    let shader_dir = PathBuf::from("shaders");
    let target_dir = PathBuf::from("../target/shaders");
    println!("cargo:rerun-if-changed=shaders");

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Some(glslc) = find_glslc() else {
        println!("cargo:warning=glslc not found; install the Vulkan SDK or put glslc on PATH to build shaders");
        return;
    };

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        println!("cargo:warning=Failed to create {}: {e}", target_dir.display());
        return;
    }

    let entries = match std::fs::read_dir(&shader_dir) {
        Ok(entries) => entries,
        Err(_) => {
            eprintln!("info: No shader directory found at: {:?}", shader_dir);
            return;
        }
    };

    let mut compiled_count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_shader = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| SHADER_EXTENSIONS.contains(&ext));
        if !is_shader {
            continue;
        }

        let Some(out_file) = output_path(&path, &target_dir) else {
            continue;
        };
        if !needs_compile(&path, &out_file) {
            continue;
        }

        let status = Command::new(&glslc).arg(&path).arg("-o").arg(&out_file).status();
        match status {
            Ok(s) if s.success() => compiled_count += 1,
            Ok(s) => panic!("glslc failed for {:?} with exit code {:?}", path, s.code()),
            Err(e) => panic!("Failed to run glslc for {:?}: {e}", path),
        }
    }

    eprintln!("info: Compiled {compiled_count} shader(s)");
}
