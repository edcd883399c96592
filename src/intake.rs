use crate::models::{EncodedImage, ImageAsset};
use base64::Engine;
use bytes::Bytes;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Could not read image file: {0}")]
    Encoding(String),
    #[error("Please select an image and enter a prompt.")]
    NoImage,
}

impl ImageAsset {
    /// Selects a file from the local filesystem. Any file is accepted; the
    /// MIME type is guessed from the extension, never verified against the
    /// bytes.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| IntakeError::Encoding(e.to_string()))?;
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            mime_type: guess_mime(path),
            display_name,
            bytes: Bytes::from(bytes),
        })
    }

    /// Selects an uploaded file from bytes the host already holds.
    pub fn from_upload(display_name: String, mime_type: String, bytes: Bytes) -> Self {
        Self {
            bytes,
            mime_type,
            display_name,
        }
    }
}

fn guess_mime(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Short-lived handle the display surface uses to render the selected image
/// before analysis runs. Equivalent of an object URL: released when the asset
/// is replaced or the screen is torn down, whether or not analysis ever ran.
#[derive(Debug)]
pub struct Preview {
    pub id: Uuid,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl Preview {
    fn for_asset(asset: &ImageAsset) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: asset.mime_type.clone(),
            bytes: asset.bytes.clone(),
        }
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        debug!("🗑️ Released preview {}", self.id);
    }
}

/// Image Intake: owns the current asset and its preview for one analysis
/// attempt. Leaf component; no knowledge of the service call.
#[derive(Debug, Default)]
pub struct ImageIntake {
    asset: Option<ImageAsset>,
    preview: Option<Preview>,
}

impl ImageIntake {
    /// Replaces the current selection. The previous preview is released here,
    /// not when the next analysis starts.
    pub fn select(&mut self, asset: ImageAsset) {
        info!(
            "📷 Selected image '{}' ({}, {} bytes)",
            asset.display_name,
            asset.mime_type,
            asset.bytes.len()
        );
        self.preview = Some(Preview::for_asset(&asset));
        self.asset = Some(asset);
    }

    pub fn clear(&mut self) {
        self.asset = None;
        self.preview = None;
    }

    pub fn asset(&self) -> Option<&ImageAsset> {
        self.asset.as_ref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// Base64-encodes the current asset for JSON-safe transport.
    pub fn encode(&self) -> Result<EncodedImage, IntakeError> {
        let asset = self.asset.as_ref().ok_or(IntakeError::NoImage)?;
        Ok(EncodedImage {
            data: base64::engine::general_purpose::STANDARD.encode(&asset.bytes),
            mime_type: asset.mime_type.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn png_asset(bytes: &[u8]) -> ImageAsset {
        ImageAsset::from_upload(
            "photo.png".into(),
            "image/png".into(),
            Bytes::copy_from_slice(bytes),
        )
    }

    #[test]
    fn encode_round_trips_to_original_bytes() {
        let raw = b"\x89PNG\r\n\x1a\nnot really a png but bytes are bytes";
        let mut intake = ImageIntake::default();
        intake.select(png_asset(raw));

        let encoded = intake.encode().unwrap();
        assert_eq!(encoded.mime_type, "image/png");

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&encoded.data)
            .unwrap();
        assert_eq!(decoded, raw.to_vec());
    }

    #[test]
    fn encode_without_selection_is_no_image() {
        let intake = ImageIntake::default();
        assert!(matches!(intake.encode(), Err(IntakeError::NoImage)));
    }

    #[test]
    fn reading_a_missing_file_is_an_encoding_error() {
        let err = ImageAsset::read("/definitely/not/here.png").unwrap_err();
        match err {
            IntakeError::Encoding(msg) => assert!(!msg.is_empty()),
            other => panic!("expected Encoding, got {other:?}"),
        }
    }

    #[test]
    fn mime_is_guessed_from_extension_with_fallback() {
        assert_eq!(guess_mime(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("a.gif")), "image/gif");
        assert_eq!(guess_mime(Path::new("a.raw")), "application/octet-stream");
    }

    #[test]
    fn clearing_releases_selection_and_preview() {
        let mut intake = ImageIntake::default();
        intake.select(png_asset(b"bytes"));
        intake.clear();
        assert!(intake.asset().is_none());
        assert!(intake.preview().is_none());
        assert!(matches!(intake.encode(), Err(IntakeError::NoImage)));
    }

    #[test]
    fn selecting_a_new_file_replaces_the_preview() {
        let mut intake = ImageIntake::default();
        intake.select(png_asset(b"first"));
        let first_id = intake.preview().unwrap().id;

        intake.select(png_asset(b"second"));
        let second = intake.preview().unwrap();
        assert_ne!(second.id, first_id);
        assert_eq!(second.bytes.as_ref(), b"second");
    }
}
