use std::env;

/// What a failed compression does to the rest of its batch.
///
/// The upload steps are always isolated per item; this knob only governs
/// the compression stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFailureMode {
    /// Any item failing to compress aborts the whole batch (default).
    Abort,
    /// A failed item is counted and dropped; its siblings proceed.
    Skip,
}

impl CompressionFailureMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "abort" => Some(Self::Abort),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }
}

/// How the gallery snapshot stream is maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryMode {
    /// Completed uploads are prepended to an in-memory list (default).
    Optimistic,
    /// A background worker re-queries the collection and republishes the
    /// full snapshot, so records inserted outside this service appear too.
    Live,
}

impl GalleryMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "optimistic" => Some(Self::Optimistic),
            "live" => Some(Self::Live),
            _ => None,
        }
    }
}

/// Service configuration for the upload pipeline and gallery feed
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Maximum multipart request body size in bytes (default: 256 MB)
    pub max_request_bytes: usize,

    /// Target upper bound for one compressed photo in bytes (default: 512 KB)
    pub photo_max_bytes: usize,

    /// Maximum width or height of a compressed photo in pixels (default: 1280)
    pub photo_max_dimension: u32,

    /// Key prefix for photo blobs in object storage (default: "photos")
    pub storage_key_prefix: String,

    /// Hold time before a batch reports `done`, in milliseconds (default: 800)
    pub success_delay_ms: u64,

    /// Batch behavior when one item fails to compress (default: abort)
    pub compression_failure_mode: CompressionFailureMode,

    /// Gallery feed mode (default: optimistic)
    pub gallery_mode: GalleryMode,

    /// Poll interval of the live gallery worker, in seconds (default: 2)
    pub live_poll_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 256 * 1024 * 1024, // 256 MB
            photo_max_bytes: 512 * 1024,          // 512 KB
            photo_max_dimension: 1280,
            storage_key_prefix: "photos".to_string(),
            success_delay_ms: 800,
            compression_failure_mode: CompressionFailureMode::Abort,
            gallery_mode: GalleryMode::Optimistic,
            live_poll_interval_secs: 2,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_request_bytes: env::var("MAX_REQUEST_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_request_bytes),

            photo_max_bytes: env::var("PHOTO_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.photo_max_bytes),

            photo_max_dimension: env::var("PHOTO_MAX_DIMENSION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.photo_max_dimension),

            storage_key_prefix: env::var("STORAGE_KEY_PREFIX")
                .ok()
                .map(|v| v.trim_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default.storage_key_prefix),

            success_delay_ms: env::var("SUCCESS_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.success_delay_ms),

            compression_failure_mode: env::var("COMPRESSION_FAILURE_MODE")
                .ok()
                .and_then(|v| CompressionFailureMode::parse(&v))
                .unwrap_or(default.compression_failure_mode),

            gallery_mode: env::var("GALLERY_MODE")
                .ok()
                .and_then(|v| GalleryMode::parse(&v))
                .unwrap_or(default.gallery_mode),

            live_poll_interval_secs: env::var("LIVE_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.live_poll_interval_secs),
        }
    }

    /// Create config for development and tests (no success hold)
    pub fn development() -> Self {
        Self {
            success_delay_ms: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.photo_max_bytes, 512 * 1024);
        assert_eq!(config.photo_max_dimension, 1280);
        assert_eq!(config.storage_key_prefix, "photos");
        assert_eq!(config.success_delay_ms, 800);
        assert_eq!(
            config.compression_failure_mode,
            CompressionFailureMode::Abort
        );
        assert_eq!(config.gallery_mode, GalleryMode::Optimistic);
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.success_delay_ms, 0);
        assert_eq!(config.photo_max_dimension, 1280);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            CompressionFailureMode::parse("ABORT"),
            Some(CompressionFailureMode::Abort)
        );
        assert_eq!(
            CompressionFailureMode::parse("skip"),
            Some(CompressionFailureMode::Skip)
        );
        assert_eq!(CompressionFailureMode::parse("other"), None);
        assert_eq!(GalleryMode::parse("live"), Some(GalleryMode::Live));
        assert_eq!(
            GalleryMode::parse("Optimistic"),
            Some(GalleryMode::Optimistic)
        );
        assert_eq!(GalleryMode::parse(""), None);
    }
}
