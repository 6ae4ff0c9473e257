/*!
 * Search result caching.
 *
 * Memoizes provider search results by a normalized fingerprint so duplicate
 * events and retries do not hit the provider again. Entries expire purely by
 * TTL, checked when read; an expired entry is never returned.
 */

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use log::debug;

use super::models::{MediaMetadata, SubtitleCandidate};
use crate::language_utils;

/// Normalized search identity: language plus catalog id or title/year,
/// plus season/episode
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchFingerprint {
    pub language: String,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<String>,
    pub title: String,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn normalize_opt(value: Option<&String>) -> Option<String> {
    value.map(|v| normalize(v)).filter(|v| !v.is_empty())
}

impl SearchFingerprint {
    pub fn new(metadata: &MediaMetadata, language: &str) -> Self {
        let language = language_utils::normalize_to_part1(language).unwrap_or_else(|_| normalize(language));
        Self {
            language,
            imdb_id: normalize_opt(metadata.imdb_id.as_ref()),
            tmdb_id: normalize_opt(metadata.tmdb_id.as_ref()),
            title: normalize(&metadata.title),
            year: metadata.year,
            season: metadata.season,
            episode: metadata.episode,
        }
    }

    /// Cache key. Catalog ids win over title/year when present.
    pub fn key(&self) -> String {
        let identity = match (&self.imdb_id, &self.tmdb_id) {
            (Some(imdb), _) => format!("imdb:{}", imdb),
            (None, Some(tmdb)) => format!("tmdb:{}", tmdb),
            (None, None) => match self.year {
                Some(year) => format!("title:{}:{}", self.title, year),
                None => format!("title:{}", self.title),
            },
        };
        let mut key = format!("{}|{}", self.language, identity);
        if let Some(season) = self.season {
            key.push_str(&format!("|s{}", season));
        }
        if let Some(episode) = self.episode {
            key.push_str(&format!("|e{}", episode));
        }
        key
    }
}

impl fmt::Display for SearchFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug)]
struct CacheEntry {
    candidates: Arc<Vec<SubtitleCandidate>>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

/// TTL cache of ranked provider search results
pub struct SearchCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    hits: Arc<AtomicUsize>,
    misses: Arc<AtomicUsize>,
    default_ttl: Duration,
    enabled: bool,
}

impl SearchCache {
    pub fn new(default_ttl: Duration, enabled: bool) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            hits: Arc::new(AtomicUsize::new(0)),
            misses: Arc::new(AtomicUsize::new(0)),
            default_ttl,
            enabled,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a fingerprint; expired entries count as a miss and are dropped
    pub fn get(&self, fingerprint: &SearchFingerprint) -> Option<Vec<SubtitleCandidate>> {
        if !self.enabled {
            return None;
        }

        let key = fingerprint.key();
        let now = Instant::now();
        let expired = {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Search cache hit for {}", key);
                    return Some(entry.candidates.as_ref().clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write();
            // a concurrent put may have refreshed it meanwhile
            if entries.get(&key).is_some_and(|e| e.is_expired(Instant::now())) {
                entries.remove(&key);
                debug!("Search cache entry expired for {}", key);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Search cache miss for {}", key);
        None
    }

    /// Store candidates, replacing any previous entry for the fingerprint
    pub fn put(&self, fingerprint: &SearchFingerprint, candidates: Vec<SubtitleCandidate>, ttl: Duration) {
        if !self.enabled {
            return;
        }
        let key = fingerprint.key();
        let entry = CacheEntry {
            candidates: Arc::new(candidates),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().insert(key.clone(), entry);
        debug!("Cached search results for {} (ttl {}s)", key, ttl.as_secs());
    }

    /// Drop every entry whose key contains `pattern` (case-insensitive).
    /// Returns the number removed.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let pattern = normalize(pattern);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.contains(&pattern));
        let removed = before - entries.len();
        debug!("Invalidated {} search cache entries matching '{}'", removed, pattern);
        removed
    }

    pub fn invalidate_all(&self) {
        self.entries.write().clear();
        debug!("Search cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600), true)
    }
}

impl Clone for SearchCache {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            hits: self.hits.clone(),
            misses: self.misses.clone(),
            default_ttl: self.default_ttl,
            enabled: self.enabled,
        }
    }
}

impl std::fmt::Debug for SearchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchCache")
            .field("entries", &self.len())
            .field("default_ttl", &self.default_ttl)
            .field("enabled", &self.enabled)
            .finish()
    }
}
