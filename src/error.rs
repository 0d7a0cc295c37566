use std::path::PathBuf;

/// Failures while turning an uploaded file or the area layer into records.
///
/// Every variant aborts the load; nothing is partially shown.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed occurrence file at line {line}")]
    Tsv {
        line: u64,
        source: csv::Error,
    },

    #[error("required column '{column}' not found in occurrence file")]
    MissingColumn { column: &'static str },

    #[error("row {row}: {column} value \"{raw}\" is not a number")]
    BadCoordinate {
        row: usize,
        column: &'static str,
        raw: String,
    },

    #[error("row {row} (gbifID {gbif_id}): eventDate value \"{raw}\" is not a recognised date")]
    BadDate {
        row: usize,
        gbif_id: String,
        raw: String,
    },

    #[error("failed to open area file {path:?}")]
    AreaFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid area file {path:?}: {message}")]
    AreaFormat { path: PathBuf, message: String },

    #[error("unsupported area file format: {extension}")]
    UnsupportedAreaFormat { extension: String },
}

impl IngestError {
    pub(crate) fn tsv(source: csv::Error) -> Self {
        let line = source.position().map_or(0, |p| p.line());
        IngestError::Tsv { line, source }
    }

    pub(crate) fn area_format(path: &std::path::Path, message: impl Into<String>) -> Self {
        IngestError::AreaFormat {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}
