use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::RunConfig;
use crate::models::RunSummary;
use crate::pipeline;

/// Pseudonymizes every `*.xml` bundle under `dir` into `out_dir`, one independent run per file.
/// Outputs mirror the input's relative path; each run gets its own mapping file named
/// `<stem>.<mapping file name>` next to its document.
pub fn process_directory(dir: &Path, out_dir: &Path, config: &RunConfig) -> Result<Vec<(PathBuf, RunSummary)>> {
    println!("Processando diretório: {:?} -> {:?}", dir, out_dir);

    fs::create_dir_all(out_dir).context("Failed to create output directory")?;
    let out_root = out_dir.canonicalize()?;
    if dir.canonicalize()? == out_root {
        bail!("Output directory must differ from the input directory");
    }

    let files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "xml"))
        // Skip outputs of earlier runs when out_dir lives inside dir.
        .filter(|e| !e.path().canonicalize().map_or(false, |p| p.starts_with(&out_root)))
        .collect();

    println!("Encontrados {} arquivos.", files.len());

    let mapping_name = config
        .mapping_output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "psn-cache.tsv".to_string());

    let results: Vec<_> = files
        .par_iter()
        .map(|entry| {
            let path = entry.path();
            (path.to_path_buf(), process_one(path, dir, out_dir, &mapping_name, config))
        })
        .collect();

    let mut done = Vec::new();
    let mut failures = 0;
    for (path, res) in results {
        match res {
            Ok(summary) => {
                println!(
                    "Sucesso: {:?} ({} patients, {} encounters)",
                    path.file_name().unwrap_or_default(),
                    summary.patients,
                    summary.encounters
                );
                done.push((path, summary));
            }
            Err(e) => {
                eprintln!("Erro em {:?}: {:#}", path, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} bundles failed", failures, failures + done.len());
    }
    Ok(done)
}

fn process_one(path: &Path, dir: &Path, out_dir: &Path, mapping_name: &str, config: &RunConfig) -> Result<RunSummary> {
    let target_dir = match path.strip_prefix(dir).ok().and_then(Path::parent) {
        Some(parent) => out_dir.join(parent),
        None => out_dir.to_path_buf(),
    };
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("Failed to create {}", target_dir.display()))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string());
    let output = target_dir.join(format!("{stem}.xml"));
    let run_config = config
        .clone()
        .with_mapping_path(target_dir.join(format!("{stem}.{mapping_name}")));
    Ok(pipeline::process_file(path, &output, &run_config)?)
}
