use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Largest file accepted through a JSON upload, after decoding.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Room for the JSON envelope and a data URL prefix around each file.
const JSON_ENVELOPE_BYTES: usize = 64 * 1024;

/// Request body limit for a JSON body carrying up to `files` base64 files
/// of `MAX_UPLOAD_BYTES` each.
pub const fn upload_body_limit(files: usize) -> usize {
    files * (MAX_UPLOAD_BYTES.div_ceil(3) * 4) + JSON_ENVELOPE_BYTES
}

/// A file sent inline in a JSON body, either raw base64 or a data URL
/// (`data:image/png;base64,...`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub file_data: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub extension: &'static str,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("File is empty")]
    Empty,
    #[error("File is not valid base64")]
    Encoding,
    #[error("File exceeds the {0} byte limit")]
    TooLarge(usize),
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
}

impl FileUpload {
    pub fn decode(&self) -> Result<DecodedFile, UploadError> {
        let (declared_type, payload) = match self.file_data.split_once(',') {
            Some((prefix, data)) if prefix.starts_with("data:") => {
                let mime = prefix
                    .trim_start_matches("data:")
                    .split(';')
                    .next()
                    .filter(|m| !m.is_empty())
                    .map(str::to_string);
                (mime, data)
            }
            _ => (None, self.file_data.as_str()),
        };

        let payload = payload.trim();
        if payload.is_empty() {
            return Err(UploadError::Empty);
        }

        let bytes = BASE64.decode(payload).map_err(|_| UploadError::Encoding)?;
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge(MAX_UPLOAD_BYTES));
        }

        let content_type = self.content_type.clone()
            .or(declared_type)
            .unwrap_or_else(|| "image/png".to_string())
            .to_ascii_lowercase();

        let extension = match content_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "application/pdf" => "pdf",
            other => return Err(UploadError::UnsupportedType(other.to_string())),
        };

        Ok(DecodedFile { bytes, content_type, extension })
    }
}

/// Object path inside a bucket: `{owner}/{random}.{ext}`.
pub fn object_path(owner: Uuid, file: &DecodedFile) -> String {
    format!("{}/{}.{}", owner, Uuid::new_v4(), file.extension)
}
