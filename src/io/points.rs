use crate::error::{Result, TerrainError};
use nalgebra::Point3;
use std::fs;
use std::path::Path;

/// Read a whitespace separated `x y z` dump. Extra columns (intensity,
/// colour, ...) are ignored; `#` starts a comment.
pub fn read_xyz(path: &Path) -> Result<Vec<Point3<f64>>> {
    let text = fs::read_to_string(path)?;
    parse_xyz(&text)
}

pub fn parse_xyz(text: &str) -> Result<Vec<Point3<f64>>> {
    let mut points = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut coords = [0.0; 3];
        let mut fields = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty());
        for (axis, slot) in ["x", "y", "z"].iter().zip(coords.iter_mut()) {
            let field = fields.next().ok_or_else(|| TerrainError::Parse {
                line: i + 1,
                message: format!("missing {axis} coordinate"),
            })?;
            *slot = field.parse().map_err(|e| TerrainError::Parse {
                line: i + 1,
                message: format!("bad {axis} coordinate {field:?}: {e}"),
            })?;
        }
        points.push(Point3::new(coords[0], coords[1], coords[2]));
    }
    Ok(points)
}
