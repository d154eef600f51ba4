use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::MultiGzDecoder;

use crate::error::CuffError;

/// Finds `name` in `dir`, falling back to a gzip-compressed `name.gz`.
pub fn resolve_input(dir: &Path, name: &str) -> Option<PathBuf> {
    let plain = dir.join(name);
    if plain.is_file() {
        return Some(plain);
    }
    let gz = dir.join(format!("{name}.gz"));
    gz.is_file().then_some(gz)
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>, CuffError> {
    let file = File::open(path).map_err(|err| CuffError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let is_gz = path.extension().map(|ext| ext == "gz").unwrap_or(false);
    if is_gz {
        Ok(Box::new(MultiGzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One data line of a tab-delimited file, addressed by header name.
#[derive(Debug, Clone)]
pub struct Row {
    pub line: u64,
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Row {
    pub fn new(line: u64, columns: Arc<[String]>, values: Vec<String>) -> Self {
        Self {
            line,
            columns,
            values,
        }
    }

    /// Builds a row from `(column, value)` pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let columns: Arc<[String]> = pairs.iter().map(|(column, _)| column.to_string()).collect();
        let values = pairs.iter().map(|(_, value)| value.to_string()).collect();
        Self::new(1, columns, values)
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.values.get(index).map(String::as_str)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .zip(self.values.iter())
            .map(|(column, value)| (column.as_str(), value.as_str()))
    }
}

pub struct TsvReader {
    path: PathBuf,
    headers: Arc<[String]>,
    reader: csv::Reader<Box<dyn Read>>,
}

impl TsvReader {
    pub fn open(path: &Path) -> Result<Self, CuffError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .from_reader(open_maybe_gz(path)?);
        let headers: Arc<[String]> = reader
            .headers()
            .map_err(|err| CuffError::Read {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?
            .iter()
            .map(|name| name.trim().to_string())
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            headers,
            reader,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn require_column(&self, column: &str) -> Result<(), CuffError> {
        if self.headers.iter().any(|name| name == column) {
            Ok(())
        } else {
            Err(CuffError::MissingColumn {
                path: self.path.clone(),
                column: column.to_string(),
            })
        }
    }

    pub fn rows(&mut self) -> impl Iterator<Item = Result<Row, CuffError>> + '_ {
        let headers = Arc::clone(&self.headers);
        let path = self.path.clone();
        // Byte records so a stray Latin-1 cell costs a replacement character
        // rather than the whole file.
        self.reader.byte_records().map(move |record| {
            let record = record.map_err(|err| match err.kind() {
                csv::ErrorKind::Io(io) => CuffError::Read {
                    path: path.clone(),
                    message: io.to_string(),
                },
                _ => CuffError::MalformedRow {
                    path: path.clone(),
                    line: err.position().map(|pos| pos.line()).unwrap_or(0),
                    message: err.to_string(),
                },
            })?;
            let line = record.position().map(|pos| pos.line()).unwrap_or(0);
            let values = record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect();
            Ok(Row::new(line, Arc::clone(&headers), values))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn reads_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let content = "tracking_id\tctrl_FPKM\nXLOC_1\t1.5\nXLOC_2\t-\n";
        std::fs::write(dir.path().join("plain.tsv"), content).unwrap();
        let mut encoder = GzEncoder::new(
            File::create(dir.path().join("packed.tsv.gz")).unwrap(),
            Compression::default(),
        );
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();

        for name in ["plain.tsv", "packed.tsv"] {
            let path = resolve_input(dir.path(), name).unwrap();
            let mut reader = TsvReader::open(&path).unwrap();
            assert_eq!(reader.headers(), ["tracking_id", "ctrl_FPKM"]);
            let rows = reader.rows().collect::<Result<Vec<_>, _>>().unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].get("ctrl_FPKM"), Some("1.5"));
            assert_eq!(rows[1].get("tracking_id"), Some("XLOC_2"));
        }
    }

    #[test]
    fn non_utf8_cells_are_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genes.fpkm_tracking");
        let mut content = b"tracking_id\tgene_short_name\nXLOC_1\tcaf".to_vec();
        content.extend_from_slice(&[0xe9, 0xff]);
        content.extend_from_slice(b"\nXLOC_2\tunc-54\n");
        std::fs::write(&path, content).unwrap();

        let mut reader = TsvReader::open(&path).unwrap();
        let rows = reader.rows().collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("gene_short_name"), Some("caf\u{FFFD}\u{FFFD}"));
        assert_eq!(rows[1].get("gene_short_name"), Some("unc-54"));
        assert_eq!(rows[1].line, 3);
    }

    #[test]
    fn missing_input() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_input(dir.path(), "genes.fpkm_tracking").is_none());
    }
}
