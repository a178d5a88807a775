use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::NaiveDateTime;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const PHOTO_SUBDIR: &str = "photos";

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(JPEG_MAGIC) {
            Some(ImageKind::Jpeg)
        } else if bytes.starts_with(PNG_MAGIC) {
            Some(ImageKind::Png)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
        }
    }
}

/// Decodes a base64 photo, with or without a `data:image/...;base64,` prefix.
pub fn decode_photo(encoded: &str, max_bytes: usize) -> AppResult<(Vec<u8>, ImageKind)> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

    // cheap bound before allocating the decoded buffer
    if payload.len() / 4 * 3 > max_bytes + 3 {
        return Err(AppError::BadRequest(format!(
            "Photo exceeds {max_bytes} bytes"
        )));
    }

    let bytes = STANDARD
        .decode(payload.as_bytes())
        .map_err(|_| AppError::BadRequest("Photo is not valid base64".into()))?;

    if bytes.len() > max_bytes {
        return Err(AppError::BadRequest(format!(
            "Photo exceeds {max_bytes} bytes"
        )));
    }

    let kind = ImageKind::sniff(&bytes)
        .ok_or_else(|| AppError::BadRequest("Photo must be a JPEG or PNG image".into()))?;

    Ok((bytes, kind))
}

fn file_safe(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Writes the photo under `<upload_dir>/photos/` and returns the path
/// relative to `upload_dir`.
pub async fn save_photo(
    upload_dir: &Path,
    employee_code: &str,
    at: NaiveDateTime,
    bytes: &[u8],
    kind: ImageKind,
) -> AppResult<String> {
    let dir = upload_dir.join(PHOTO_SUBDIR);
    tokio::fs::create_dir_all(&dir).await?;

    let name = format!(
        "{}_{}_{}.{}",
        file_safe(employee_code),
        at.format("%Y%m%d%H%M%S"),
        &Uuid::new_v4().to_simple().to_string()[..8],
        kind.extension()
    );
    tokio::fs::write(dir.join(&name), bytes).await?;

    Ok(format!("{PHOTO_SUBDIR}/{name}"))
}

/// Resolves a stored relative path, refusing anything that escapes
/// `upload_dir`.
pub fn resolve_stored(upload_dir: &Path, relative: &str) -> Option<PathBuf> {
    let rel = Path::new(relative);
    if rel
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        Some(upload_dir.join(rel))
    } else {
        None
    }
}

pub async fn remove_photo(upload_dir: &Path, relative: &str) {
    if let Some(path) = resolve_stored(upload_dir, relative) {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(error = %e, path = %path.display(), "Failed to remove photo");
        }
    }
}

#[cfg(test)]
pub(crate) fn tiny_png_base64() -> String {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend_from_slice(&[0u8; 16]);
    STANDARD.encode(bytes)
}
