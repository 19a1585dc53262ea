//! JSON run configuration for the demo binaries.

use crate::error::{Result, TerrainError};
use crate::processor::ProcessorParams;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_out: Option<PathBuf>,
    pub label_dump: Option<PathBuf>,
    pub label_image: Option<PathBuf>,
    /// Pixels per cell in the label image.
    pub image_scale: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RuntimeConfig {
    pub input_path: PathBuf,
    #[serde(default)]
    pub ground_truth: Option<PathBuf>,
    /// Completeness weight of the V-measure.
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub params: ProcessorParams,
}

fn default_beta() -> f64 {
    1.0
}

/// Read a [`RuntimeConfig`]; relative paths inside it resolve against the
/// config file's directory.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let contents = fs::read_to_string(path)?;
    let mut config: RuntimeConfig = serde_json::from_str(&contents)?;
    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    if config.output.image_scale == 0 {
        config.output.image_scale = 8;
    }
    Ok(config)
}

/// `<program> <config.json>`
pub fn parse_cli(program: &str) -> Result<RuntimeConfig> {
    let mut args = std::env::args().skip(1);
    match (args.next(), args.next()) {
        (Some(path), None) => load_config(Path::new(&path)),
        _ => Err(TerrainError::config(format!("usage: {program} <config.json>"))),
    }
}

impl RuntimeConfig {
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.input_path);
        for p in [
            self.ground_truth.as_mut(),
            self.output.json_out.as_mut(),
            self.output.label_dump.as_mut(),
            self.output.label_image.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            resolve(p);
        }
    }
}
