use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::error::PipelineError;

/// What to open: a local camera index, a stream URL, or a local file path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceId {
    Device(u32),
    Url(Url),
    Path(PathBuf),
}

impl SourceId {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let trimmed = raw.trim();
        let invalid = |reason: String| PipelineError::InvalidSource {
            source_id: raw.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("source identifier is empty".to_string()));
        }
        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed
                .parse::<u32>()
                .map(SourceId::Device)
                .map_err(|e| invalid(format!("device index out of range: {e}")));
        }
        if trimmed.contains("://") {
            let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
            let has_host = url.host_str().is_some_and(|host| !host.is_empty());
            if !has_host && url.scheme() != "file" {
                return Err(invalid("URL has no host".to_string()));
            }
            return Ok(SourceId::Url(url));
        }
        Ok(SourceId::Path(PathBuf::from(trimmed)))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Device(index) => write!(f, "device {index}"),
            SourceId::Url(url) => write!(f, "{url}"),
            SourceId::Path(path) => write!(f, "{}", path.display()),
        }
    }
}
