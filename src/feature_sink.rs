// feature_sink.rs - Feature artifact storage using zstd-compressed JSONL
//
// One {"domain": ..., "features": [...]} object per line, in merged order. Reading the file
// back yields the identical ordered (domains, vectors) pair; floats round-trip exactly.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::features::{FeatureVector, FEATURE_LEN};

const FLUSH_INTERVAL: usize = 50;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub domain: String,
    pub features: Vec<f64>,
}

/// Accepted domains and their flattened vectors, index-aligned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    pub domains: Vec<String>,
    pub vectors: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn from_accepted(accepted: &[(String, FeatureVector)]) -> Self {
        Self {
            domains: accepted.iter().map(|(d, _)| d.clone()).collect(),
            vectors: accepted.iter().map(|(_, v)| v.to_vec()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

pub struct FeatureSink {
    writer: zstd::stream::write::Encoder<'static, BufWriter<File>>,
    path: PathBuf,
    count: usize,
    unflushed: usize,
}

impl FeatureSink {
    /// Create the artifact at `path`, creating parent directories as needed
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create feature artifact: {}", path.display()))?;
        let encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), ZSTD_LEVEL)
            .context("Failed to create zstd encoder")?;

        Ok(Self {
            writer: encoder,
            path: path.to_path_buf(),
            count: 0,
            unflushed: 0,
        })
    }

    pub fn append(&mut self, domain: &str, features: &[f64]) -> Result<()> {
        let row = FeatureRow {
            domain: domain.to_string(),
            features: features.to_vec(),
        };
        let json = serde_json::to_string(&row).context("Failed to serialize feature row")?;
        self.writer.write_all(json.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.count += 1;
        self.unflushed += 1;

        if self.unflushed >= FLUSH_INTERVAL {
            self.flush()?;
        }

        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush zstd encoder")?;
        self.unflushed = 0;
        Ok(())
    }

    /// Write the end-of-frame marker and return the number of rows written
    pub fn finish(mut self) -> Result<usize> {
        self.flush()?;
        let mut inner = self
            .writer
            .finish()
            .context("Failed to finalize zstd stream")?;
        inner
            .flush()
            .with_context(|| format!("Failed to write feature artifact: {}", self.path.display()))?;
        Ok(self.count)
    }
}

/// Write every accepted row; an empty input still produces a valid, empty artifact
pub fn write_artifact(path: &Path, matrix: &FeatureMatrix) -> Result<usize> {
    let mut sink = FeatureSink::create(path)?;
    for (domain, features) in matrix.domains.iter().zip(&matrix.vectors) {
        sink.append(domain, features)?;
    }
    sink.finish()
}

/// Read an artifact back. Any unreadable or wrong-length row is an error.
pub fn read_artifact(path: &Path) -> Result<FeatureMatrix> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open feature artifact: {}", path.display()))?;
    let decoder = zstd::stream::read::Decoder::new(file).context("Failed to create zstd decoder")?;
    let reader = BufReader::new(decoder);

    let mut matrix = FeatureMatrix::default();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {} at line {}", path.display(), line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        let row: FeatureRow = serde_json::from_str(&line)
            .with_context(|| format!("Corrupt row at line {} in {}", line_num + 1, path.display()))?;
        if row.features.len() != FEATURE_LEN {
            bail!(
                "Row {} in {} has {} features, expected {}",
                line_num + 1,
                path.display(),
                row.features.len(),
                FEATURE_LEN
            );
        }

        matrix.domains.push(row.domain);
        matrix.vectors.push(row.features);
    }

    Ok(matrix)
}
