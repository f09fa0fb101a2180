//! Text exposition of a registry

use prometheus::{Encoder, Registry, TextEncoder};

/// Content type of the text exposition format
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// Serialize the current registry contents. Read-only with respect to the registry.
pub fn render(registry: &Registry) -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let families = registry.gather();

    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
