//! Pairing code rendering for the terminal

use courier_core::{CourierError, CourierResult, PairingRenderer};
use qrcode::render::{svg, unicode};
use qrcode::QrCode;

use crate::cli::QrFormat;

/// Renders pairing payloads as QR codes in the chosen format
#[derive(Debug, Clone, Copy)]
pub struct QrRenderer {
    format: QrFormat,
}

impl QrRenderer {
    pub fn new(format: QrFormat) -> Self {
        Self { format }
    }
}

impl PairingRenderer for QrRenderer {
    fn render(&self, payload: &str) -> CourierResult<String> {
        if self.format == QrFormat::Raw {
            return Ok(payload.to_string());
        }

        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| CourierError::rendering(format!("QR generation failed: {}", e)))?;

        let rendered = match self.format {
            QrFormat::Svg => code
                .render::<svg::Color>()
                .min_dimensions(256, 256)
                .dark_color(svg::Color("#000000"))
                .light_color(svg::Color("#FFFFFF"))
                .build(),
            _ => code
                .render::<unicode::Dense1x2>()
                .dark_color(unicode::Dense1x2::Light)
                .light_color(unicode::Dense1x2::Dark)
                .quiet_zone(true)
                .build(),
        };
        Ok(rendered)
    }
}
