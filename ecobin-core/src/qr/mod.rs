//! QR rendering for redemption links, plus a per-token image cache.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use tracing::debug;

use ecobin_common::error::Error;
use ecobin_common::traits::qr_traits::QrEncoder;

/// Renders QR codes as SVG documents. Rendering is a pure function of the
/// input, so the same URL always produces the same bytes.
#[derive(Debug, Clone)]
pub struct SvgQrEncoder {
    min_dimension: u32,
}

impl Default for SvgQrEncoder {
    fn default() -> Self {
        Self { min_dimension: 240 }
    }
}

impl QrEncoder for SvgQrEncoder {
    fn content_type(&self) -> &'static str {
        "image/svg+xml"
    }

    fn encode(&self, value: &str) -> Result<Vec<u8>, Error> {
        let code = QrCode::with_error_correction_level(value.as_bytes(), EcLevel::M)
            .map_err(|e| Error::Qr(e.to_string()))?;
        let image = code
            .render()
            .min_dimensions(self.min_dimension, self.min_dimension)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build();
        Ok(image.into_bytes())
    }
}

/// Images kept by default; older entries are re-rendered on demand.
pub const DEFAULT_QR_CACHE_CAPACITY: usize = 1024;

/// Least-recently-used cache of rendered images keyed by token string.
/// Rendering is idempotent, so an evicted image comes back byte-identical.
pub struct QrCache {
    encoder: Arc<dyn QrEncoder>,
    images: Mutex<LruCache<String, Arc<Vec<u8>>>>,
}

impl QrCache {
    pub fn new(encoder: Arc<dyn QrEncoder>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            encoder,
            images: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn images(&self) -> MutexGuard<'_, LruCache<String, Arc<Vec<u8>>>> {
        // Entries are whole Arcs; a poisoned map is still consistent.
        self.images.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn content_type(&self) -> &'static str {
        self.encoder.content_type()
    }

    pub fn get_or_render(&self, token: &str, value: &str) -> Result<Arc<Vec<u8>>, Error> {
        let hit = self.images().get(token).cloned();
        if let Some(hit) = hit {
            return Ok(hit);
        }

        // Render without holding the lock.
        let rendered = Arc::new(self.encoder.encode(value)?);
        debug!("Rendered QR for token ({} bytes)", rendered.len());

        let mut images = self.images();
        if let Some(existing) = images.get(token) {
            return Ok(existing.clone());
        }
        images.put(token.to_string(), rendered.clone());
        Ok(rendered)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.images().contains(token)
    }

    pub fn len(&self) -> usize {
        self.images().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svg_rendering_is_deterministic() {
        let enc = SvgQrEncoder::default();
        let a = enc.encode("http://localhost:5000/reward/abc").unwrap();
        let b = enc.encode("http://localhost:5000/reward/abc").unwrap();
        let other = enc.encode("http://localhost:5000/reward/xyz").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
        assert!(String::from_utf8(a).unwrap().contains("<svg"));
    }

    #[test]
    fn cache_renders_once_per_token() {
        let cache = QrCache::new(Arc::new(SvgQrEncoder::default()), DEFAULT_QR_CACHE_CAPACITY);
        assert!(!cache.contains("abc"));
        let first = cache.get_or_render("abc", "http://x/reward/abc").unwrap();
        assert!(cache.contains("abc"));
        let second = cache.get_or_render("abc", "http://x/reward/abc").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.content_type(), "image/svg+xml");
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = QrCache::new(Arc::new(SvgQrEncoder::default()), 2);
        assert!(cache.is_empty());

        let a = cache.get_or_render("a", "http://x/reward/a").unwrap();
        cache.get_or_render("b", "http://x/reward/b").unwrap();
        // Touch "a" so "b" is the oldest.
        cache.get_or_render("a", "http://x/reward/a").unwrap();
        cache.get_or_render("c", "http://x/reward/c").unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("a") && cache.contains("c"));
        assert!(!cache.contains("b"));

        for i in 0..50 {
            let token = format!("t{}", i);
            cache.get_or_render(&token, &format!("http://x/reward/{}", token)).unwrap();
        }
        assert_eq!(cache.len(), 2);

        // An evicted image renders back to the same bytes.
        let again = cache.get_or_render("a", "http://x/reward/a").unwrap();
        assert_eq!(a, again);
    }
}
