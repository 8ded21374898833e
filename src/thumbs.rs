//! Thumbnail fetch/cache engine.
//!
//! For each listing record the engine fetches the image bytes through the
//! shared authenticated transport, decodes them off the async threads, and
//! delivers the outcome over a single event channel. Fetches fan out
//! concurrently (bounded by a semaphore) and complete in any order; the
//! consumer applies each event only to its own record, and only while the
//! listing that requested it is still the active one. Decoded images are
//! kept in a size-bounded LRU cache keyed by path, so a record scrolled
//! offscreen and back does not refetch.

use image::DynamicImage;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};

use crate::client::ServerClient;
use crate::error::Result;
use crate::listing::FileRecord;

/// Per-record display state. `Pending` shows the placeholder; a fetch
/// attempt moves the record to `Loaded` or `Failed` exactly once. Only an
/// explicit rebind or a listing replacement re-enters `Pending`.
#[derive(Clone)]
pub enum ThumbnailState {
    Pending,
    Loaded(Arc<DynamicImage>),
    Failed,
}

impl ThumbnailState {
    pub fn is_pending(&self) -> bool {
        matches!(self, ThumbnailState::Pending)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ThumbnailState::Loaded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ThumbnailState::Failed)
    }
}

impl fmt::Debug for ThumbnailState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThumbnailState::Pending => write!(f, "Pending"),
            ThumbnailState::Loaded(image) => {
                write!(f, "Loaded({}x{})", image.width(), image.height())
            }
            ThumbnailState::Failed => write!(f, "Failed"),
        }
    }
}

/// Outcome of one fetch attempt, tagged with the listing generation that
/// requested it so stale results can be discarded on arrival.
#[derive(Debug, Clone)]
pub struct ThumbnailEvent {
    pub generation: u64,
    pub path: String,
    pub state: ThumbnailState,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent in-flight fetches.
    pub max_in_flight: usize,
    /// Cache budget in entries.
    pub cache_max_entries: usize,
    /// Cache budget in decoded bytes.
    pub cache_max_bytes: u64,
    /// Downscale decoded images so neither side exceeds this, keeping
    /// aspect ratio. `None` keeps the full image.
    pub downscale_to: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            cache_max_entries: 256,
            cache_max_bytes: 64 * 1024 * 1024,
            downscale_to: None,
        }
    }
}

/// Decode image bytes, downscaling when a bound is set. Runs on the
/// blocking pool when called from the engine.
pub fn decode_thumbnail(bytes: &[u8], downscale_to: Option<u32>) -> Result<DynamicImage> {
    let image = image::load_from_memory(bytes)?;
    Ok(match downscale_to {
        Some(max) if image.width() > max || image.height() > max => image.thumbnail(max, max),
        _ => image,
    })
}

// -----------------------------------------------------------------------------
// LRU cache
// -----------------------------------------------------------------------------

struct CacheEntry {
    image: Arc<DynamicImage>,
    bytes: u64,
}

/// Decoded thumbnails keyed by server path, evicting least-recently-used
/// entries once either budget is exceeded.
struct ThumbCache {
    max_entries: usize,
    max_bytes: u64,
    total_bytes: u64,
    entries: HashMap<String, CacheEntry>,
    // front = least recently used
    order: VecDeque<String>,
}

impl ThumbCache {
    fn new(max_entries: usize, max_bytes: u64) -> Self {
        Self {
            max_entries,
            max_bytes,
            total_bytes: 0,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, path: &str) -> Option<Arc<DynamicImage>> {
        if !self.entries.contains_key(path) {
            return None;
        }
        self.order.retain(|p| p != path);
        self.order.push_back(path.to_string());
        self.entries.get(path).map(|entry| entry.image.clone())
    }

    fn insert(&mut self, path: String, image: Arc<DynamicImage>, bytes: u64) {
        if self.max_entries == 0 || bytes > self.max_bytes {
            return;
        }

        if let Some(old) = self.entries.remove(&path) {
            self.total_bytes -= old.bytes;
            self.order.retain(|p| p != &path);
        }

        while self.entries.len() >= self.max_entries || self.total_bytes + bytes > self.max_bytes {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.total_bytes -= evicted.bytes;
                log::debug!("Evicted thumbnail {} from cache", oldest);
            }
        }

        self.total_bytes += bytes;
        self.order.push_back(path.clone());
        self.entries.insert(path, CacheEntry { image, bytes });
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

// -----------------------------------------------------------------------------
// Engine
// -----------------------------------------------------------------------------

pub struct ThumbnailEngine {
    client: Arc<ServerClient>,
    config: EngineConfig,
    semaphore: Arc<Semaphore>,
    cache: Arc<Mutex<ThumbCache>>,
    generation: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<ThumbnailEvent>,
}

impl ThumbnailEngine {
    /// Create an engine and the receiving end of its event channel. The
    /// receiver is the single delivery context: every Loaded/Failed outcome
    /// arrives there, never concurrently for the same record.
    pub fn new(
        client: Arc<ServerClient>,
        config: EngineConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ThumbnailEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let engine = Self {
            semaphore: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            cache: Arc::new(Mutex::new(ThumbCache::new(
                config.cache_max_entries,
                config.cache_max_bytes,
            ))),
            generation: Arc::new(AtomicU64::new(0)),
            client,
            config,
            events,
        };
        (engine, rx)
    }

    /// Start a new listing generation. In-flight fetches for older
    /// generations drop their results instead of delivering them.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Fan out one fetch task per record.
    pub fn fetch_all(&self, generation: u64, records: &[FileRecord]) {
        log::info!("Fetching {} thumbnail(s)", records.len());
        for record in records {
            self.spawn_fetch(generation, record);
        }
    }

    /// Launch the fetch task for one record.
    pub fn spawn_fetch(&self, generation: u64, record: &FileRecord) {
        let path = record.path.clone();
        let client = self.client.clone();
        let cache = self.cache.clone();
        let semaphore = self.semaphore.clone();
        let current = self.generation.clone();
        let events = self.events.clone();
        let downscale_to = self.config.downscale_to;

        tokio::spawn(async move {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }

            // Cache hit: no network, but the result still goes through the
            // channel so the consumer has exactly one delivery context.
            let cached = cache.lock().unwrap().get(&path);
            if let Some(image) = cached {
                log::debug!("Thumbnail cache hit for {}", path);
                let _ = events.send(ThumbnailEvent {
                    generation,
                    path,
                    state: ThumbnailState::Loaded(image),
                });
                return;
            }

            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            // The listing may have been replaced while waiting for a permit
            if current.load(Ordering::SeqCst) != generation {
                log::debug!("Dropping stale thumbnail fetch for {}", path);
                return;
            }

            let state = match client.fetch_bytes(&path).await {
                Ok(bytes) => {
                    let decoded =
                        tokio::task::spawn_blocking(move || decode_thumbnail(&bytes, downscale_to))
                            .await;
                    match decoded {
                        Ok(Ok(image)) => {
                            let image = Arc::new(image);
                            let byte_len = image.as_bytes().len() as u64;
                            cache
                                .lock()
                                .unwrap()
                                .insert(path.clone(), image.clone(), byte_len);
                            ThumbnailState::Loaded(image)
                        }
                        Ok(Err(e)) => {
                            log::warn!("Failed to decode thumbnail {}: {}", path, e);
                            ThumbnailState::Failed
                        }
                        Err(e) => {
                            log::warn!("Decode task for {} did not complete: {}", path, e);
                            ThumbnailState::Failed
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Failed to fetch thumbnail {}: {}", path, e);
                    ThumbnailState::Failed
                }
            };

            // A late result for a replaced listing must not reach the view
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            let _ = events.send(ThumbnailEvent {
                generation,
                path,
                state,
            });
        });
    }
}

// -----------------------------------------------------------------------------
// Consumer-side view state
// -----------------------------------------------------------------------------

/// The single consumer's state: the active listing and one thumbnail slot
/// per record. Events for a replaced listing are rejected here as well, in
/// case they were already in the channel when the generation moved on.
#[derive(Debug, Default)]
pub struct ListingView {
    generation: u64,
    records: Vec<FileRecord>,
    states: HashMap<String, ThumbnailState>,
}

impl ListingView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing. All prior records and their states are
    /// discarded; every new record starts at `Pending`.
    pub fn replace(&mut self, generation: u64, records: Vec<FileRecord>) {
        self.states = records
            .iter()
            .map(|record| (record.path.clone(), ThumbnailState::Pending))
            .collect();
        self.records = records;
        self.generation = generation;
    }

    /// Reset one record to `Pending` ahead of a re-fetch (scroll re-bind).
    pub fn rebind(&mut self, path: &str) -> bool {
        match self.states.get_mut(path) {
            Some(slot) => {
                *slot = ThumbnailState::Pending;
                true
            }
            None => false,
        }
    }

    /// Apply a fetch outcome. Returns false when the event is stale or
    /// names a record this listing does not contain.
    pub fn apply(&mut self, event: ThumbnailEvent) -> bool {
        if event.generation != self.generation {
            log::debug!("Ignoring stale thumbnail event for {}", event.path);
            return false;
        }
        match self.states.get_mut(&event.path) {
            Some(slot) => {
                *slot = event.state;
                true
            }
            None => false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn state(&self, path: &str) -> Option<&ThumbnailState> {
        self.states.get(path)
    }

    pub fn pending_count(&self) -> usize {
        self.states.values().filter(|s| s.is_pending()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.pending_count() == 0
    }
}
