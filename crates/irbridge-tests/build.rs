//! Translate every `data/llvm/*.ll` fixture into `OUT_DIR/<stem>.rs`.
//!
//! A fixture may carry a target profile next to it (`<stem>.json`); other
//! fixtures use the default profile.

use anyhow::{Context, Result};
use irbridge::{transpile, TargetProfile, TranspileOptions};
use std::fs;
use std::path::{Path, PathBuf};

fn options_for(ll: &Path) -> Result<TranspileOptions> {
    let profile_path = ll.with_extension("json");
    let profile = if profile_path.exists() {
        println!("cargo:rerun-if-changed={}", profile_path.display());
        let text = fs::read_to_string(&profile_path)
            .with_context(|| format!("failed to read {}", profile_path.display()))?;
        TargetProfile::from_json(&text)
            .with_context(|| format!("invalid target profile {}", profile_path.display()))?
    } else {
        TargetProfile::default()
    };
    Ok(TranspileOptions {
        profile,
        ..TranspileOptions::default()
    })
}

fn main() -> Result<()> {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").context("OUT_DIR not set")?);
    let data_dir = Path::new("data/llvm");
    println!("cargo:rerun-if-changed={}", data_dir.display());

    let mut fixtures: Vec<PathBuf> = fs::read_dir(data_dir)
        .with_context(|| format!("failed to list {}", data_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "ll"))
        .collect();
    fixtures.sort();

    let mut mod_rs = String::new();
    for ll in &fixtures {
        println!("cargo:rerun-if-changed={}", ll.display());
        let stem = ll
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("bad fixture name {}", ll.display()))?;

        let source = fs::read(ll).with_context(|| format!("failed to read {}", ll.display()))?;
        let rust_code = transpile(&source, &options_for(ll)?)
            .with_context(|| format!("failed to translate {}", ll.display()))?;
        fs::write(out_dir.join(format!("{stem}.rs")), rust_code)
            .with_context(|| format!("failed to write {stem}.rs"))?;

        mod_rs.push_str(&format!(
            "pub mod {stem} {{\n    include!(concat!(env!(\"OUT_DIR\"), \"/{stem}.rs\"));\n}}\n"
        ));
    }

    fs::write(out_dir.join("mod.rs"), mod_rs).context("failed to write mod.rs")?;
    Ok(())
}
