//! Avatar images: bounded-concurrency loading and a per-node thumbnail cache
//!
//! Loads run on worker threads and report back over a channel that the frame
//! loop drains at the start of each frame, so decoding never blocks a frame.
//! Every tile swap bumps a generation counter; completions from an older
//! generation are discarded on arrival.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::canvas::Canvas;
use crate::error::{SceneError, SceneResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub enabled: bool,
    /// Maximum simultaneous loads
    pub max_concurrent: usize,
    /// Edge length of the square thumbnails
    pub thumbnail_px: u32,
    /// Root directory for [`FileAvatarSource`]
    pub root: Option<PathBuf>,
    /// Avatars are drawn only when a node is at least this many pixels wide
    pub min_draw_px: f32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent: 24,
            thumbnail_px: 64,
            root: None,
            min_draw_px: 6.0,
        }
    }
}

/// Where avatar bytes come from
pub trait AvatarSource: Send + Sync {
    fn fetch(&self, reference: &str) -> SceneResult<Vec<u8>>;
}

/// Reads avatars relative to a root directory.
///
/// Inline `data:` payloads and remote URLs are not supported, and references
/// that would escape the root are rejected.
#[derive(Debug, Clone)]
pub struct FileAvatarSource {
    root: PathBuf,
}

impl FileAvatarSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, reference: &str) -> SceneResult<PathBuf> {
        let trimmed = reference.trim();
        if trimmed.starts_with("data:") {
            return Err(SceneError::Unsupported("inline data: avatars".to_string()));
        }
        if trimmed.contains("://") && !trimmed.starts_with("file://") {
            return Err(SceneError::Unsupported(format!("remote avatar '{trimmed}'")));
        }
        let relative = Path::new(trimmed.trim_start_matches("file://").trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(SceneError::Unsupported(format!("avatar path '{trimmed}' escapes root")));
        }
        Ok(self.root.join(relative))
    }
}

impl AvatarSource for FileAvatarSource {
    fn fetch(&self, reference: &str) -> SceneResult<Vec<u8>> {
        let path = self.resolve(reference)?;
        Ok(std::fs::read(path)?)
    }
}

/// Decode image bytes into a square, circle-masked RGBA thumbnail
pub fn decode_thumbnail(bytes: &[u8], size: u32) -> SceneResult<Canvas> {
    let size = size.max(1);
    let decoded = image::load_from_memory(bytes).map_err(|e| SceneError::Image(e.to_string()))?;
    let mut rgba = decoded.resize_to_fill(size, size, FilterType::Triangle).to_rgba8();
    let r = size as f32 / 2.0;
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        let (dx, dy) = (x as f32 + 0.5 - r, y as f32 + 0.5 - r);
        if dx * dx + dy * dy > r * r {
            pixel.0[3] = 0;
        }
    }
    Canvas::from_rgba(size, size, rgba.into_raw())
}

struct LoadResult {
    generation: u64,
    index: usize,
    outcome: SceneResult<Canvas>,
}

/// Per-node avatar cache with a concurrency cap
pub struct AvatarLoader {
    config: AvatarConfig,
    source: Arc<dyn AvatarSource>,
    cache: HashMap<usize, Arc<Canvas>>,
    loading: HashSet<usize>,
    in_flight: usize,
    generation: u64,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
}

impl std::fmt::Debug for AvatarLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvatarLoader")
            .field("cached", &self.cache.len())
            .field("in_flight", &self.in_flight)
            .field("generation", &self.generation)
            .finish()
    }
}

impl AvatarLoader {
    pub fn new(config: AvatarConfig, source: Arc<dyn AvatarSource>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            config,
            source,
            cache: HashMap::new(),
            loading: HashSet::new(),
            in_flight: 0,
            generation: 0,
            tx,
            rx,
        }
    }

    /// Loader reading from `config.root`, or from the working directory
    pub fn from_config(config: AvatarConfig) -> Self {
        let root = config.root.clone().unwrap_or_else(|| PathBuf::from("."));
        Self::new(config, Arc::new(FileAvatarSource::new(root)))
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_loading(&self, index: usize) -> bool {
        self.loading.contains(&index)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Canvas>> {
        self.cache.get(&index)
    }

    /// Forget everything; in-flight loads from before the reset are ignored
    /// when they complete
    pub fn reset(&mut self) {
        self.generation += 1;
        self.cache.clear();
        self.loading.clear();
        self.in_flight = 0;
    }

    /// Start loading `reference` for node `index` if it is not cached, not
    /// already loading and a slot is free. Returns true when a load started.
    pub fn request(&mut self, index: usize, reference: &str) -> bool {
        if !self.config.enabled
            || reference.is_empty()
            || self.cache.contains_key(&index)
            || self.loading.contains(&index)
            || self.in_flight >= self.config.max_concurrent
        {
            return false;
        }

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let generation = self.generation;
        let size = self.config.thumbnail_px;
        let reference = reference.to_string();
        let spawned = std::thread::Builder::new()
            .name("avatar-loader".to_string())
            .spawn(move || {
                let outcome = source
                    .fetch(&reference)
                    .and_then(|bytes| decode_thumbnail(&bytes, size));
                // The loader may be gone; nothing to report to then
                let _ = tx.send(LoadResult {
                    generation,
                    index,
                    outcome,
                });
            });
        match spawned {
            Ok(_) => {
                self.loading.insert(index);
                self.in_flight += 1;
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to spawn avatar loader thread");
                false
            }
        }
    }

    /// Apply finished loads. Returns the number of newly cached images.
    pub fn drain(&mut self) -> usize {
        let mut added = 0;
        while let Ok(result) = self.rx.try_recv() {
            if result.generation != self.generation {
                continue;
            }
            self.loading.remove(&result.index);
            self.in_flight = self.in_flight.saturating_sub(1);
            match result.outcome {
                Ok(canvas) => {
                    self.cache.insert(result.index, Arc::new(canvas));
                    added += 1;
                }
                Err(e) => {
                    debug!(index = result.index, error = %e, "avatar load failed, keeping flat marker");
                }
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    struct CountingSource {
        active: AtomicUsize,
        peak: AtomicUsize,
        bytes: Vec<u8>,
    }

    impl AvatarSource for CountingSource {
        fn fetch(&self, reference: &str) -> SceneResult<Vec<u8>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            if reference == "broken" {
                return Err(SceneError::Image("broken".into()));
            }
            Ok(self.bytes.clone())
        }
    }

    fn counting() -> Arc<CountingSource> {
        Arc::new(CountingSource {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            bytes: png_bytes(),
        })
    }

    fn drain_until(loader: &mut AvatarLoader, done: impl Fn(&AvatarLoader) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !done(loader) && Instant::now() < deadline {
            loader.drain();
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn hundred_nodes_never_exceed_the_cap() {
        let source = counting();
        let mut loader = AvatarLoader::new(AvatarConfig::default(), source.clone());
        let deadline = Instant::now() + Duration::from_secs(20);
        while loader.cached() < 100 && Instant::now() < deadline {
            for i in 0..100 {
                loader.request(i, "a.png");
                assert!(loader.in_flight() <= 24);
            }
            loader.drain();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(loader.cached(), 100);
        assert!(source.peak.load(Ordering::SeqCst) <= 24);
    }

    #[test]
    fn duplicate_requests_are_ignored() {
        let mut loader = AvatarLoader::new(AvatarConfig::default(), counting());
        assert!(loader.request(3, "a.png"));
        assert!(!loader.request(3, "a.png"));
        assert!(loader.is_loading(3));
        drain_until(&mut loader, |l| l.cached() == 1);
        assert!(!loader.request(3, "a.png"));
        assert_eq!(loader.get(3).map(|c| c.width()), Some(64));
    }

    #[test]
    fn failures_clear_loading_without_caching() {
        let mut loader = AvatarLoader::new(AvatarConfig::default(), counting());
        loader.request(1, "broken");
        drain_until(&mut loader, |l| l.in_flight() == 0);
        assert!(!loader.is_loading(1));
        assert!(loader.get(1).is_none());
    }

    #[test]
    fn reset_drops_stale_completions() {
        let mut loader = AvatarLoader::new(AvatarConfig::default(), counting());
        loader.request(0, "a.png");
        loader.reset();
        assert_eq!(loader.in_flight(), 0);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(loader.drain(), 0);
        assert!(loader.get(0).is_none());
    }

    #[test]
    fn disabled_loader_requests_nothing() {
        let config = AvatarConfig {
            enabled: false,
            ..Default::default()
        };
        let mut loader = AvatarLoader::new(config, counting());
        assert!(!loader.request(0, "a.png"));
    }

    #[test]
    fn thumbnails_are_square_and_circle_masked() {
        let thumb = decode_thumbnail(&png_bytes(), 16).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (16, 16));
        assert_eq!(thumb.pixel(0, 0).map(|p| p[3]), Some(0));
        assert_eq!(thumb.pixel(8, 8).map(|p| p[3]), Some(255));
        assert!(matches!(decode_thumbnail(b"garbage", 16), Err(SceneError::Image(_))));
    }

    #[test]
    fn file_source_reads_under_root_and_rejects_others() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ada.png"), png_bytes()).unwrap();
        let source = FileAvatarSource::new(dir.path());
        assert!(source.fetch("ada.png").is_ok());
        assert!(source.fetch("/ada.png").is_ok());
        assert!(matches!(source.fetch("data:image/png;base64,AAAA"), Err(SceneError::Unsupported(_))));
        assert!(matches!(source.fetch("https://x/y.png"), Err(SceneError::Unsupported(_))));
        assert!(matches!(source.fetch("../secret.png"), Err(SceneError::Unsupported(_))));
        assert!(matches!(source.fetch("missing.png"), Err(SceneError::Io(_))));
    }
}
