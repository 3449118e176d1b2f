use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// A document handed to the pipeline: a file on disk or an in-memory upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileInput {
    Path(PathBuf),
    Buffer { name: Option<String>, data: Vec<u8> },
}

impl FileInput {
    #[must_use]
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    #[must_use]
    pub fn buffer(name: Option<String>, data: Vec<u8>) -> Self {
        Self::Buffer { name, data }
    }

    /// Final path component, or the upload name.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Path(p) => p.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Buffer { name, .. } => name.as_deref().map(|n| {
                Path::new(n)
                    .file_name()
                    .map_or_else(|| n.to_owned(), |f| f.to_string_lossy().into_owned())
            }),
        }
    }

    /// Lowercase extension with its leading dot, e.g. `.pdf`.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let path = match self {
            Self::Path(p) => p.as_path(),
            Self::Buffer { name, .. } => Path::new(name.as_deref()?),
        };
        path.extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
    }

    /// Whether a name is available for extension or MIME guessing.
    #[must_use]
    pub fn has_name(&self) -> bool {
        match self {
            Self::Path(_) => true,
            Self::Buffer { name, .. } => name.is_some(),
        }
    }

    /// MIME type guessed from the name alone.
    #[must_use]
    pub fn guess_mimetype(&self) -> Option<String> {
        let guess = match self {
            Self::Path(p) => mime_guess::from_path(p),
            Self::Buffer { name, .. } => mime_guess::from_path(name.as_deref()?),
        };
        guess.first().map(|m| m.essence_str().to_owned())
    }

    /// Human-readable identifier used in logs and errors.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Buffer { name, .. } => name.clone().unwrap_or_else(|| "<buffer>".to_owned()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_bytes(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            Self::Path(p) => std::fs::read(p).map(Cow::Owned),
            Self::Buffer { data, .. } => Ok(Cow::Borrowed(data)),
        }
    }

    /// Size in bytes; stats the file for path inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub fn byte_len(&self) -> std::io::Result<u64> {
        match self {
            Self::Path(p) => std::fs::metadata(p).map(|m| m.len()),
            Self::Buffer { data, .. } => Ok(data.len() as u64),
        }
    }
}

impl From<PathBuf> for FileInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for FileInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}
