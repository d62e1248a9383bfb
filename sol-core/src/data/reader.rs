//! Dataset readers for the svm, csv and binary encodings.

use crate::data::dataset::DataType;
use crate::error::SolError;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

/// A parsed sample whose label has not yet been mapped to a class index.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub label: i32,
    pub features: Vec<(u32, f32)>,
}

/// Turns a path and declared type into samples.
pub trait DatasetReader: Send + Sync {
    fn read(&self, path: &Path, data_type: DataType) -> Result<Vec<RawSample>, SolError>;
}

/// Reads the three built-in encodings from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileReader;

impl DatasetReader for FileReader {
    fn read(&self, path: &Path, data_type: DataType) -> Result<Vec<RawSample>, SolError> {
        let file = File::open(path).map_err(|e| SolError::dataset(path.display(), e.to_string()))?;
        let reader = BufReader::new(file);
        match data_type {
            DataType::Svm => read_svm(reader, path),
            DataType::Csv => read_csv(reader, path),
            DataType::Binary => read_binary(reader, path),
        }
    }
}

fn parse_label(raw: &str) -> Option<i32> {
    let raw = raw.strip_prefix('+').unwrap_or(raw);
    raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && v.abs() <= i32::MAX as f64)
            .map(|v| v as i32)
    })
}

/// LIBSVM text: `label idx:val idx:val ...`, `#` comments, blank lines skipped.
pub fn read_svm<R: BufRead>(reader: R, path: &Path) -> Result<Vec<RawSample>, SolError> {
    let mut samples = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SolError::dataset(path.display(), e.to_string()))?;
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let fail = |msg: String| {
            SolError::dataset(path.display(), format!("line {}: {msg}", lineno + 1))
        };

        let mut tokens = line.split_whitespace();
        let label_tok = tokens.next().unwrap_or_default();
        let label = parse_label(label_tok).ok_or_else(|| fail(format!("bad label '{label_tok}'")))?;

        let mut features = Vec::new();
        let mut last_index = 0u32;
        for tok in tokens {
            let (idx, val) = tok
                .split_once(':')
                .ok_or_else(|| fail(format!("expected index:value, got '{tok}'")))?;
            let idx: u32 = idx
                .parse()
                .map_err(|_| fail(format!("bad feature index '{idx}'")))?;
            let val: f32 = val
                .parse()
                .map_err(|_| fail(format!("bad feature value '{val}'")))?;
            if idx == 0 || idx <= last_index {
                return Err(fail(format!(
                    "feature indices must be >= 1 and increasing, got {idx} after {last_index}"
                )));
            }
            last_index = idx;
            if val != 0.0 {
                features.push((idx, val));
            }
        }
        samples.push(RawSample { label, features });
    }
    Ok(samples)
}

/// CSV: label in the first column, column `j` becomes feature `j`.
pub fn read_csv<R: BufRead>(reader: R, path: &Path) -> Result<Vec<RawSample>, SolError> {
    let mut samples = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| SolError::dataset(path.display(), e.to_string()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fail = |msg: String| {
            SolError::dataset(path.display(), format!("line {}: {msg}", lineno + 1))
        };

        let mut fields = line.split(',').map(str::trim);
        let label_tok = fields.next().unwrap_or_default();
        let Some(label) = parse_label(label_tok) else {
            if lineno == 0 {
                continue; // header row
            }
            return Err(fail(format!("bad label '{label_tok}'")));
        };

        let mut features = Vec::new();
        for (col, field) in fields.enumerate() {
            let val: f32 = field
                .parse()
                .map_err(|_| fail(format!("bad value '{field}' in column {}", col + 2)))?;
            if val != 0.0 {
                features.push((col as u32 + 1, val));
            }
        }
        samples.push(RawSample { label, features });
    }
    Ok(samples)
}

/// Fill `buf` with the next label. `Ok(false)` only when the input ends before
/// its first byte.
fn read_label<R: Read>(reader: &mut R, buf: &mut [u8; 4]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("truncated after {filled} of {} bytes", buf.len()),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Binary records: `label: i32 LE, nnz: u32 LE, nnz x (index: u32 LE, value: f32 LE)`.
pub fn read_binary<R: Read>(mut reader: R, path: &Path) -> Result<Vec<RawSample>, SolError> {
    let mut samples = Vec::new();
    let mut word = [0u8; 4];
    loop {
        let record = samples.len() + 1;
        match read_label(&mut reader, &mut word) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                return Err(SolError::dataset(
                    path.display(),
                    format!("record {record}: label: {e}"),
                ));
            }
        }
        let label = i32::from_le_bytes(word);

        let mut next_word = |what: &str| -> Result<[u8; 4], SolError> {
            let mut buf = [0u8; 4];
            reader.read_exact(&mut buf).map_err(|e| {
                SolError::dataset(
                    path.display(),
                    format!("record {record}: truncated while reading {what}: {e}"),
                )
            })?;
            Ok(buf)
        };

        let nnz = u32::from_le_bytes(next_word("feature count")?) as usize;
        let mut features = Vec::with_capacity(nnz.min(1 << 16));
        for _ in 0..nnz {
            let idx = u32::from_le_bytes(next_word("feature index")?);
            let val = f32::from_le_bytes(next_word("feature value")?);
            if idx == 0 {
                return Err(SolError::dataset(
                    path.display(),
                    format!("record {record}: feature index 0 is reserved"),
                ));
            }
            if val != 0.0 {
                features.push((idx, val));
            }
        }
        samples.push(RawSample { label, features });
    }
    Ok(samples)
}

/// Encode samples in the binary layout understood by [`read_binary`].
pub fn encode_binary(samples: &[RawSample]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in samples {
        out.extend_from_slice(&s.label.to_le_bytes());
        out.extend_from_slice(&(s.features.len() as u32).to_le_bytes());
        for &(idx, val) in &s.features {
            out.extend_from_slice(&idx.to_le_bytes());
            out.extend_from_slice(&val.to_le_bytes());
        }
    }
    out
}
