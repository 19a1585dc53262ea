use crate::error::{Result, TerrainError};
use nalgebra::Point2;
use std::path::Path;

/// Simple polygon in the point-cloud frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<Point2<f64>>,
}

impl Polygon {
    /// Even–odd rule; points on an edge may fall either way.
    pub fn contains(&self, p: Point2<f64>) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (self.vertices[i], self.vertices[j]);
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Ground-truth regions; the class of a polygon is its position in the file.
#[derive(Clone, Debug, Default)]
pub struct GroundTruth {
    pub polygons: Vec<Polygon>,
}

impl GroundTruth {
    /// One `x y` vertex per line, polygons separated by blank lines; `#`
    /// starts a comment.
    pub fn parse(text: &str) -> Result<Self> {
        let mut polygons = Vec::new();
        let mut current: Vec<Point2<f64>> = Vec::new();
        let mut started_at = 0usize;
        for (i, raw) in text.lines().enumerate() {
            let line_no = i + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                // Comment-only lines do not close a polygon.
                if raw.trim().is_empty() {
                    flush_polygon(&mut polygons, &mut current, started_at)?;
                }
                continue;
            }
            if current.is_empty() {
                started_at = line_no;
            }
            current.push(parse_vertex(line, line_no)?);
        }
        flush_polygon(&mut polygons, &mut current, started_at)?;
        Ok(Self { polygons })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Index of the first polygon containing `p`.
    pub fn class_at(&self, p: Point2<f64>) -> Option<usize> {
        self.polygons.iter().position(|poly| poly.contains(p))
    }
}

fn parse_vertex(line: &str, line_no: usize) -> Result<Point2<f64>> {
    let mut fields = line.split_whitespace();
    let mut coord = |name: &str| -> Result<f64> {
        let field = fields.next().ok_or_else(|| TerrainError::Parse {
            line: line_no,
            message: format!("missing {name} coordinate"),
        })?;
        field.parse::<f64>().map_err(|e| TerrainError::Parse {
            line: line_no,
            message: format!("bad {name} coordinate {field:?}: {e}"),
        })
    };
    let x = coord("x")?;
    let y = coord("y")?;
    if fields.next().is_some() {
        return Err(TerrainError::Parse {
            line: line_no,
            message: "expected exactly two coordinates".to_string(),
        });
    }
    Ok(Point2::new(x, y))
}

fn flush_polygon(
    polygons: &mut Vec<Polygon>,
    current: &mut Vec<Point2<f64>>,
    started_at: usize,
) -> Result<()> {
    if current.is_empty() {
        return Ok(());
    }
    if current.len() < 3 {
        return Err(TerrainError::Parse {
            line: started_at,
            message: format!("polygon has {} vertices, need at least 3", current.len()),
        });
    }
    polygons.push(Polygon {
        vertices: std::mem::take(current),
    });
    Ok(())
}
