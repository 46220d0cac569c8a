use image::{ColorType, codecs::jpeg::JpegEncoder};
use kornia_image::{Image, allocator::CpuAllocator};
use std::path::{Path, PathBuf};

pub const JPEG_MIME: &str = "image/jpeg";
pub const PNG_MIME: &str = "image/png";
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// File name given to camera captures in the multipart body.
pub const CAPTURE_FILE_NAME: &str = "capture.jpg";

pub const DEFAULT_JPEG_QUALITY: u8 = 92;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to encode frame as jpeg: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the active image came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageOrigin {
    Camera,
    File(PathBuf),
}

/// The image eligible for submission.
#[derive(Clone, Debug)]
pub struct CapturedImage {
    bytes: Vec<u8>,
    origin: ImageOrigin,
    mime_type: &'static str,
}

impl CapturedImage {
    /// Encodes an RGB frame as a JPEG still.
    pub fn from_frame(frame: &Image<u8, 3, CpuAllocator>, quality: u8) -> Result<Self, CaptureError> {
        let size = frame.size();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality).encode(
            frame.as_slice(),
            size.width as u32,
            size.height as u32,
            ColorType::Rgb8,
        )?;

        log::debug!(
            "Encoded {}x{} frame into {} bytes",
            size.width,
            size.height,
            bytes.len()
        );

        Ok(Self {
            bytes,
            origin: ImageOrigin::Camera,
            mime_type: JPEG_MIME,
        })
    }

    /// Takes a user-chosen file as is. Content is not validated here.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CaptureError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self::from_bytes(bytes, path.to_path_buf()))
    }

    pub fn from_bytes(bytes: Vec<u8>, path: PathBuf) -> Self {
        let mime_type = mime_from_extension(&path);
        Self {
            bytes,
            origin: ImageOrigin::File(path),
            mime_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn origin(&self) -> &ImageOrigin {
        &self.origin
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn file_name(&self) -> String {
        match &self.origin {
            ImageOrigin::Camera => CAPTURE_FILE_NAME.to_string(),
            ImageOrigin::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| CAPTURE_FILE_NAME.to_string()),
        }
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => JPEG_MIME,
        Some("png") => PNG_MIME,
        _ => OCTET_STREAM_MIME,
    }
}
