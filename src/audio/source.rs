//! Where audio bytes come from
//!
//! A source is either fetched over HTTP, read from disk, or carried inline as
//! a base64 `data:` URI (what the speech synthesis step hands back).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use thiserror::Error;

/// Errors while retrieving the raw bytes of a source
#[derive(Error, Debug)]
pub enum SourceFetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed data URI: {0}")]
    InvalidDataUri(String),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Audio source reference
#[derive(Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// `http://` or `https://` location
    Remote(String),
    /// Local file
    File(PathBuf),
    /// Already-encoded bytes, with the MIME type if one was given
    Inline { bytes: Vec<u8>, mime: Option<String> },
}

/// Bytes plus a format hint for the decoder
#[derive(Debug, Clone)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub hint: Option<String>,
}

impl AudioSource {
    /// Interpret a user- or collaborator-supplied string
    ///
    /// `data:` URIs are decoded immediately; `http(s)://` becomes
    /// [`AudioSource::Remote`]; anything else is treated as a path.
    pub fn parse(reference: &str) -> Result<Self, SourceFetchError> {
        let reference = reference.trim();
        if let Some(rest) = reference.strip_prefix("data:") {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| SourceFetchError::InvalidDataUri("missing ','".to_string()))?;
            let mut parts = header.split(';');
            let mime = parts.next().filter(|m| !m.is_empty()).map(str::to_string);
            if !parts.any(|p| p == "base64") {
                return Err(SourceFetchError::InvalidDataUri(
                    "only base64 payloads are supported".to_string(),
                ));
            }
            let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
            return Ok(Self::Inline { bytes, mime });
        }

        let lower = reference.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(Self::Remote(reference.to_string()))
        } else {
            Ok(Self::File(PathBuf::from(reference)))
        }
    }

    /// Retrieve the bytes. Blocks for remote sources.
    pub fn fetch(&self, timeout: Duration) -> Result<FetchedBytes, SourceFetchError> {
        match self {
            Self::Remote(url) => {
                log::info!("Fetching audio from {}", url);
                let client = reqwest::blocking::Client::builder()
                    .timeout(timeout)
                    .build()?;
                let response = client.get(url).send()?;
                let status = response.status();
                if !status.is_success() {
                    return Err(SourceFetchError::Status {
                        status: status.as_u16(),
                        url: url.clone(),
                    });
                }
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let bytes = response.bytes()?.to_vec();
                log::info!("Fetched {} bytes", bytes.len());

                let hint = content_type
                    .as_deref()
                    .and_then(hint_from_mime)
                    .or_else(|| hint_from_path(url_path(url)));
                Ok(FetchedBytes { bytes, hint })
            }
            Self::File(path) => {
                let bytes = std::fs::read(path).map_err(|source| SourceFetchError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(FetchedBytes {
                    bytes,
                    hint: path.to_str().and_then(hint_from_path),
                })
            }
            Self::Inline { bytes, mime } => Ok(FetchedBytes {
                bytes: bytes.clone(),
                hint: mime.as_deref().and_then(hint_from_mime),
            }),
        }
    }

    /// Short description for logs and the status line
    pub fn label(&self) -> String {
        match self {
            Self::Remote(url) => url.clone(),
            Self::File(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("Unknown")
                .to_string(),
            Self::Inline { bytes, mime } => format!(
                "inline {} ({} bytes)",
                mime.as_deref().unwrap_or("audio"),
                bytes.len()
            ),
        }
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Inline payloads can be megabytes; don't dump them
        match self {
            Self::Remote(url) => f.debug_tuple("Remote").field(url).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Inline { bytes, mime } => f
                .debug_struct("Inline")
                .field("len", &bytes.len())
                .field("mime", mime)
                .finish(),
        }
    }
}

impl From<PathBuf> for AudioSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// Map a MIME type to a symphonia extension hint
pub fn hint_from_mime(mime: &str) -> Option<String> {
    let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    let ext = match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/ogg" | "audio/vorbis" => "ogg",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/mp4" | "audio/aac" | "audio/x-m4a" => "m4a",
        "audio/webm" => "webm",
        _ => return None,
    };
    Some(ext.to_string())
}

fn hint_from_path(path: &str) -> Option<String> {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Path part of a URL, without query or fragment
fn url_path(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_uri_decodes_payload() {
        let uri = "data:audio/mpeg;base64,SGVsbG8=";
        let source = AudioSource::parse(uri).unwrap();
        assert_eq!(
            source,
            AudioSource::Inline {
                bytes: b"Hello".to_vec(),
                mime: Some("audio/mpeg".to_string()),
            }
        );

        let fetched = source.fetch(Duration::from_secs(1)).unwrap();
        assert_eq!(fetched.bytes, b"Hello");
        assert_eq!(fetched.hint.as_deref(), Some("mp3"));
    }

    #[test]
    fn test_parse_rejects_non_base64_data_uri() {
        let result = AudioSource::parse("data:audio/wav,rawbytes");
        assert!(matches!(result, Err(SourceFetchError::InvalidDataUri(_))));
    }

    #[test]
    fn test_parse_rejects_bad_base64() {
        let result = AudioSource::parse("data:audio/wav;base64,!!!not-base64!!!");
        assert!(matches!(result, Err(SourceFetchError::Base64(_))));
    }

    #[test]
    fn test_parse_urls_and_paths() {
        assert_eq!(
            AudioSource::parse("https://example.com/a.mp3").unwrap(),
            AudioSource::Remote("https://example.com/a.mp3".to_string())
        );
        assert_eq!(
            AudioSource::parse("/tmp/loop.ogg").unwrap(),
            AudioSource::File(PathBuf::from("/tmp/loop.ogg"))
        );
    }

    #[test]
    fn test_missing_file_reports_io_error() {
        let source = AudioSource::File(PathBuf::from("/definitely/not/here.wav"));
        let result = source.fetch(Duration::from_secs(1));
        assert!(matches!(result, Err(SourceFetchError::Io { .. })));
    }

    #[test]
    fn test_file_fetch_uses_extension_hint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.WAV");
        std::fs::write(&path, b"abc").unwrap();

        let fetched = AudioSource::File(path).fetch(Duration::from_secs(1)).unwrap();
        assert_eq!(fetched.bytes, b"abc");
        assert_eq!(fetched.hint.as_deref(), Some("wav"));
    }

    #[test]
    fn test_hints() {
        assert_eq!(hint_from_mime("audio/x-wav").as_deref(), Some("wav"));
        assert_eq!(hint_from_mime("audio/ogg; codecs=opus").as_deref(), Some("ogg"));
        assert_eq!(hint_from_mime("text/html"), None);
        assert_eq!(url_path("https://h/x/voice.mp3?token=1#t"), "https://h/x/voice.mp3");
    }
}
