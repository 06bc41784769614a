use log::debug;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("failed to open image: {0}")]
    Image(#[from] image::ImageError),
    #[error("no QR code found in the image")]
    NotFound,
    #[error("failed to decode QR code: {0}")]
    Decode(String),
}

/// extract_totp_uri extracts the `otpauth://` text encoded in the first
/// QR code of an image, as shown by most services when enrolling an
/// authenticator. The text still has to go through `Credential::decode`.
pub fn extract_totp_uri(file_path: impl AsRef<Path>) -> Result<String, QrError> {
    let img = image::open(file_path.as_ref())?;

    let decoder = bardecoder::default_decoder();
    let mut results = decoder.decode(&img).into_iter();
    match results.next() {
        Some(Ok(text)) => {
            debug!("decoded QR code from {}", file_path.as_ref().display());
            Ok(text.trim().to_string())
        }
        Some(Err(e)) => Err(QrError::Decode(e.to_string())),
        None => Err(QrError::NotFound),
    }
}
