//! Shard text format
//!
//! One matrix row per line, fields separated by whitespace and/or commas,
//! every field a 32-bit float.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use runtime_core::{Error, Result, ShardOrdinal};
use tracing::debug;

use crate::discovery::shard_file_name;
use crate::Matrix;

/// Read and decode one shard file
pub fn decode_shard(path: &Path) -> Result<Matrix> {
    let text = fs::read_to_string(path).map_err(|e| Error::ShardUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let matrix = parse_matrix(&text, path)?;
    debug!(
        path = %path.display(),
        rows = matrix.rows(),
        cols = matrix.cols(),
        "Decoded shard"
    );
    Ok(matrix)
}

/// Decode shard text; `path` is only used in error reports
///
/// Blank lines are skipped. Every row must have the column count of the
/// first row, and the shard must hold at least one row.
pub fn parse_matrix(text: &str, path: &Path) -> Result<Matrix> {
    let mut cols = None;
    let mut rows = 0;
    let mut data = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let fields = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|field| !field.is_empty());

        let start = data.len();
        for field in fields {
            let value: f32 = field.parse().map_err(|_| Error::DataFormat {
                path: path.to_path_buf(),
                line: line_no,
                message: format!("invalid number {:?}", field),
            })?;
            data.push(value);
        }

        let found = data.len() - start;
        if found == 0 {
            continue;
        }

        match cols {
            None => cols = Some(found),
            Some(expected) if expected != found => {
                return Err(Error::DataFormat {
                    path: path.to_path_buf(),
                    line: line_no,
                    message: format!("expected {} fields, found {}", expected, found),
                });
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let Some(cols) = cols else {
        return Err(Error::DataFormat {
            path: path.to_path_buf(),
            line: 0,
            message: "shard holds no rows".to_string(),
        });
    };

    Matrix::new(rows, cols, data)
}

/// Encode a matrix in the shard text format
///
/// Values use the shortest representation that parses back to the same f32.
pub fn encode_matrix(matrix: &Matrix) -> String {
    let mut out = String::new();
    for row in matrix.iter_rows() {
        for (col, value) in row.iter().enumerate() {
            if col > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}", value);
        }
        out.push('\n');
    }
    out
}

/// Write `matrix` as shard `ordinal` under `dir`
///
/// The file is written under a hidden temporary name and renamed into place,
/// so discovery never sees a partial shard.
pub fn write_shard(dir: &Path, ordinal: ShardOrdinal, matrix: &Matrix) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let name = shard_file_name(ordinal);
    let final_path = dir.join(&name);
    let temp_path = dir.join(format!(".{}.tmp", name));

    fs::write(&temp_path, encode_matrix(matrix))?;
    fs::rename(&temp_path, &final_path)?;

    debug!(path = %final_path.display(), rows = matrix.rows(), "Wrote shard");
    Ok(final_path)
}
