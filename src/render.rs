// Turning a token into something a phone camera can read.
//
// Most backends hand us a finished image URL. Some send the raw payload
// instead, in which case we draw the code ourselves: error correction
// level H, 200px at 1x zoom.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::render::unicode::Dense1x2;
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use thiserror::Error;

pub const BASE_SIZE_PX: u32 = 200;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("payload does not fit in a QR code: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("failed to write PNG: {0}")]
    Image(#[from] image::ImageError),
    #[error("data URL is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Display zoom for the QR image, from 0.5x to 3.0x in 0.2 steps.
/// Stored in tenths so repeated steps never drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ZoomLevel(u8);

impl ZoomLevel {
    const MIN_TENTHS: u8 = 5;
    const MAX_TENTHS: u8 = 30;
    const STEP_TENTHS: u8 = 2;

    pub fn from_factor(factor: f32) -> Self {
        if !factor.is_finite() {
            return ZoomLevel::default();
        }
        let tenths = (factor * 10.0).round();
        let clamped = tenths.clamp(f32::from(Self::MIN_TENTHS), f32::from(Self::MAX_TENTHS));
        ZoomLevel(clamped as u8)
    }

    pub fn zoom_in(self) -> Self {
        ZoomLevel((self.0 + Self::STEP_TENTHS).min(Self::MAX_TENTHS))
    }

    pub fn zoom_out(self) -> Self {
        ZoomLevel(self.0.saturating_sub(Self::STEP_TENTHS).max(Self::MIN_TENTHS))
    }

    pub fn can_zoom_in(self) -> bool {
        self.0 < Self::MAX_TENTHS
    }

    pub fn can_zoom_out(self) -> bool {
        self.0 > Self::MIN_TENTHS
    }

    pub fn factor(self) -> f32 {
        f32::from(self.0) / 10.0
    }

    pub fn size_px(self) -> u32 {
        BASE_SIZE_PX * u32::from(self.0) / 10
    }
}

impl Default for ZoomLevel {
    fn default() -> Self {
        ZoomLevel(10)
    }
}

fn encode(payload: &str) -> Result<QrCode, RenderError> {
    Ok(QrCode::with_error_correction_level(
        payload.as_bytes(),
        EcLevel::H,
    )?)
}

pub fn render_png(payload: &str, zoom: ZoomLevel) -> Result<Vec<u8>, RenderError> {
    let size = zoom.size_px();
    let image = encode(payload)?
        .render::<Luma<u8>>()
        .min_dimensions(size, size)
        .build();

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

// Half-block characters, two modules per line. Colours are inverted so it
// reads on a dark terminal.
pub fn render_terminal(payload: &str) -> Result<String, RenderError> {
    Ok(encode(payload)?
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .build())
}

/// Pulls the image bytes out of a `data:image/...;base64,` URL. `None` means
/// the URL is not an inline image (probably a plain http link).
pub fn decode_data_url(url: &str) -> Option<Result<Vec<u8>, RenderError>> {
    let rest = url.strip_prefix("data:image/")?;
    let (_, encoded) = rest.split_once(";base64,")?;
    Some(STANDARD.decode(encoded.trim()).map_err(RenderError::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn zoom_steps_stay_within_bounds() {
        let mut zoom = ZoomLevel::default();
        assert_eq!(zoom.factor(), 1.0);
        for _ in 0..20 {
            zoom = zoom.zoom_in();
        }
        assert_eq!(zoom.factor(), 3.0);
        assert!(!zoom.can_zoom_in());

        for _ in 0..20 {
            zoom = zoom.zoom_out();
        }
        assert_eq!(zoom.factor(), 0.5);
        assert!(!zoom.can_zoom_out());
        assert_eq!(zoom.size_px(), 100);
    }

    #[test]
    fn zoom_from_factor_clamps() {
        assert_eq!(ZoomLevel::from_factor(12.0).factor(), 3.0);
        assert_eq!(ZoomLevel::from_factor(0.1).factor(), 0.5);
        assert_eq!(ZoomLevel::from_factor(1.4).size_px(), 280);
    }

    #[test]
    fn non_finite_zoom_falls_back_to_default() {
        for factor in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let zoom = ZoomLevel::from_factor(factor);
            assert_eq!(zoom, ZoomLevel::default());
            assert_eq!(zoom.size_px(), BASE_SIZE_PX);
        }
    }

    #[test]
    fn renders_png() {
        let png = render_png("TOK123", ZoomLevel::default()).unwrap();
        assert_eq!(&png[..8], &PNG_MAGIC);
    }

    #[test]
    fn renders_terminal_block() {
        let text = render_terminal("TOK123").unwrap();
        assert!(text.lines().count() > 10);
    }

    #[test]
    fn decodes_inline_images_only() {
        let bytes = decode_data_url("data:image/png;base64,iVBORw0KGgo=")
            .unwrap()
            .unwrap();
        assert_eq!(&bytes[..], &PNG_MAGIC);

        assert!(decode_data_url("https://cdn.example.edu/qr/1.png").is_none());
        assert!(matches!(
            decode_data_url("data:image/png;base64,@@@"),
            Some(Err(RenderError::Base64(_)))
        ));
    }
}
