//! QR code rendering for short URLs

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;

/// Renders an embeddable image for a piece of text
pub trait QrRenderer: Send + Sync {
    /// Render the text, the result is a data URL
    fn render(&self, text: &str) -> Result<String, String>;
}

/// SVG renderer, producing `data:image/svg+xml;base64,...` URLs
#[derive(Clone, Copy, Debug, Default)]
pub struct SvgQrRenderer;

impl QrRenderer for SvgQrRenderer {
    fn render(&self, text: &str) -> Result<String, String> {
        let code = QrCode::new(text.as_bytes()).map_err(|err| err.to_string())?;

        let image = code
            .render::<svg::Color>()
            .min_dimensions(200, 200)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build();

        Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_svg_data_url() {
        let data_url = SvgQrRenderer.render("http://localhost:6000/abc1234").unwrap();

        assert!(data_url.starts_with("data:image/svg+xml;base64,"));

        let encoded = data_url.trim_start_matches("data:image/svg+xml;base64,");
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn test_render_too_long_fails() {
        let text = "x".repeat(8_000);

        assert!(SvgQrRenderer.render(&text).is_err());
    }
}
