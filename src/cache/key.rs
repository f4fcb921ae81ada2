//! Cache key definitions.
//!
//! A key names exactly one cacheable response. Keys for semantically equal
//! requests must collide, so query signatures are normalized (sorted) at
//! construction and construction is the only way to obtain a key.

use std::fmt;

/// Output format of a cached response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// Mapbox vector tile bytes.
    Mvt,
    /// GeoJSON or other JSON feature payloads.
    Json,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Mvt => "mvt",
            OutputFormat::Json => "json",
        }
    }
}

/// What the cached payload answers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// A tile address in the layer's tiling scheme.
    Tile { z: u8, x: u32, y: u32 },
    /// A normalized query-string signature (`k=v` pairs, sorted, joined
    /// with `&`).
    Query { signature: String },
}

/// Composite identity of one cached response: layer, request, format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    layer: String,
    request: RequestKind,
    format: OutputFormat,
}

impl CacheKey {
    pub fn tile(layer: impl Into<String>, z: u8, x: u32, y: u32, format: OutputFormat) -> Self {
        Self {
            layer: layer.into(),
            request: RequestKind::Tile { z, x, y },
            format,
        }
    }

    /// Builds a query key from request parameters in any order.
    pub fn query<K, V>(
        layer: impl Into<String>,
        params: impl IntoIterator<Item = (K, V)>,
        format: OutputFormat,
    ) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        pairs.sort();
        let signature = pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        Self {
            layer: layer.into(),
            request: RequestKind::Query { signature },
            format,
        }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request {
            RequestKind::Tile { z, x, y } => {
                write!(
                    f,
                    "{}/{z}/{x}/{y}.{}",
                    self.layer,
                    self.format.as_str()
                )
            }
            RequestKind::Query { signature } => {
                write!(f, "{}.{}?{signature}", self.layer, self.format.as_str())
            }
        }
    }
}
