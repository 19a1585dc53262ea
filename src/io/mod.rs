//! Text, JSON and image helpers used by the demo binaries.
//!
//! - `read_xyz`: load a whitespace separated point dump.
//! - `write_label_dump`: `row col label` text output.
//! - `save_label_image`: palette PNG of the label map.
//! - `write_json_file`: pretty-print a serializable value to disk.

mod json;
mod labels;
mod points;

pub use json::write_json_file;
pub use labels::{label_color, save_label_image, write_label_dump, UNLABELLED};
pub use points::{parse_xyz, read_xyz};
