use std::path::Path;

use super::error::DocumentError;

/// Default maximum file size accepted for ingestion: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Plain-text file read from disk.
#[derive(Debug, Clone)]
pub struct LoadedText {
    pub source: String,
    pub content_type: &'static str,
    pub content: String,
}

/// Reads `.txt` and markdown files for ingestion.
#[derive(Debug, Clone)]
pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl TextLoader {
    pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

    /// # Errors
    ///
    /// Returns an error if the file cannot be read, has an unsupported
    /// extension, or exceeds `max_file_size`.
    pub async fn load(&self, path: &Path) -> Result<LoadedText, DocumentError> {
        let path = tokio::fs::canonicalize(path).await?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let content_type = match ext.as_str() {
            "md" | "markdown" => "text/markdown",
            "txt" => "text/plain",
            other => return Err(DocumentError::UnsupportedFormat(other.to_owned())),
        };

        let meta = tokio::fs::metadata(&path).await?;
        if meta.len() > self.max_file_size {
            return Err(DocumentError::FileTooLarge(meta.len()));
        }

        let content = tokio::fs::read_to_string(&path).await?;
        Ok(LoadedText {
            source: path.display().to_string(),
            content_type,
            content,
        })
    }
}
