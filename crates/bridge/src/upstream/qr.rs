// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! QR login payload rendering.

use base64::Engine;
use qrcode::render::svg;
use qrcode::QrCode;

use super::BoxFuture;

/// Turns a raw QR login payload into the data URL shown by the front-end.
pub trait QrRenderer: Send + Sync + 'static {
    fn render<'a>(&'a self, payload: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Encodes the payload as an SVG QR code inside a base64 `data:` URL,
/// ready for an `<img src>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgQrRenderer;

impl SvgQrRenderer {
    fn to_svg(payload: &str) -> anyhow::Result<String> {
        anyhow::ensure!(!payload.is_empty(), "empty QR payload");
        let code = QrCode::new(payload.as_bytes())
            .map_err(|e| anyhow::anyhow!("encode QR payload: {e}"))?;
        Ok(code.render::<svg::Color<'_>>().min_dimensions(256, 256).build())
    }
}

impl QrRenderer for SvgQrRenderer {
    fn render<'a>(&'a self, payload: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let image = Self::to_svg(payload)?;
            let encoded = base64::engine::general_purpose::STANDARD.encode(image);
            Ok(format!("data:image/svg+xml;base64,{encoded}"))
        })
    }
}
