use crate::error::AppError;
use base64::Engine;
use image::DynamicImage;

/// Decodes what the webview's `FileReader.readAsDataURL` produces
/// (`data:<mime>;base64,<payload>`). A bare base64 payload is accepted too.
pub fn decode_data_url(data_url: &str) -> Result<DynamicImage, AppError> {
    let payload = match data_url.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| AppError::Decode("Malformed data URL".to_string()))?;

            let mut parts = header.split(';');
            let mime = parts.next().unwrap_or_default();
            if !mime.is_empty() && !mime.starts_with("image/") {
                return Err(AppError::Decode(format!("Unsupported file type: {}", mime)));
            }
            if !parts.any(|p| p == "base64") {
                return Err(AppError::Decode("Data URL is not base64 encoded".to_string()));
            }
            payload
        }
        None => data_url,
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::Decode(format!("Invalid base64 payload: {}", e)))?;

    decode_bytes(&bytes)
}

pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, AppError> {
    if bytes.is_empty() {
        return Err(AppError::Decode("Uploaded file is empty".to_string()));
    }

    let img = image::load_from_memory(bytes)
        .map_err(|e| AppError::Decode(format!("Failed to decode image: {}", e)))?;

    log::debug!("Decoded upload: {}x{} ({} bytes)", img.width(), img.height(), bytes.len());
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([30, 60, 90])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn encode(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn decodes_browser_data_url() {
        let url = format!("data:image/png;base64,{}", encode(&png_bytes(6, 4)));
        let img = decode_data_url(&url).unwrap();
        assert_eq!((img.width(), img.height()), (6, 4));
    }

    #[test]
    fn decodes_bare_payload() {
        let img = decode_data_url(&encode(&png_bytes(3, 3))).unwrap();
        assert_eq!(img.width(), 3);
    }

    #[test]
    fn rejects_non_image_mime() {
        let url = format!("data:text/plain;base64,{}", encode(b"hello"));
        let err = decode_data_url(&url).unwrap_err();
        assert_eq!(err.kind(), "decode");
        assert!(err.to_string().contains("text/plain"));
    }

    #[test]
    fn image_mime_with_garbage_fails_cleanly() {
        let url = format!("data:image/jpeg;base64,{}", encode(b"definitely not a jpeg"));
        let err = decode_data_url(&url).unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn rejects_bad_base64() {
        let err = decode_data_url("data:image/png;base64,@@@").unwrap_err();
        assert!(err.to_string().starts_with("Invalid base64 payload"));
    }

    #[test]
    fn rejects_empty_upload() {
        let err = decode_bytes(&[]).unwrap_err();
        assert_eq!(err.kind(), "decode");
    }
}
