use super::json::ensure_parent_dir;
use crate::error::{Result, TerrainError};
use crate::types::TerrainResult;
use image::{Rgb, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const PALETTE: [[u8; 3]; 10] = [
    [31, 119, 180],
    [255, 127, 14],
    [44, 160, 44],
    [214, 39, 40],
    [148, 103, 189],
    [140, 86, 75],
    [227, 119, 194],
    [127, 127, 127],
    [188, 189, 34],
    [23, 190, 207],
];

/// Colour of unlabelled cells.
pub const UNLABELLED: [u8; 3] = [0, 0, 0];

pub fn label_color(label: Option<usize>) -> [u8; 3] {
    match label {
        Some(l) => PALETTE[l % PALETTE.len()],
        None => UNLABELLED,
    }
}

/// One `row col label` line per labelled cell, row-major.
pub fn write_label_dump(path: &Path, result: &TerrainResult) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(
        out,
        "# rows={} cols={} labels={}",
        result.geometry.rows, result.geometry.cols, result.num_labels
    )?;
    for (idx, label) in result.labelled_cells() {
        writeln!(out, "{} {} {}", idx.row, idx.col, label)?;
    }
    out.flush()?;
    Ok(())
}

/// Render the label map as a palette PNG, `scale` pixels per cell. Row 0 is
/// drawn at the bottom so +y points up.
pub fn save_label_image(path: &Path, result: &TerrainResult, scale: u32) -> Result<()> {
    let g = &result.geometry;
    if scale == 0 || g.rows == 0 || g.cols == 0 {
        return Err(TerrainError::config("label image needs a non-empty grid and scale"));
    }
    ensure_parent_dir(path)?;
    let (w, h) = (g.cols as u32 * scale, g.rows as u32 * scale);
    let img = RgbImage::from_fn(w, h, |x, y| {
        let col = (x / scale) as usize;
        let row = g.rows - 1 - (y / scale) as usize;
        Rgb(label_color(result.label_at(row, col)))
    });
    img.save(path)?;
    Ok(())
}
