// src/gpu/pool.rs — Tiered pool: atomic capacity reservation and result cache

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{GpuPool, GpuTier, GpuValidationResult, ValidationContext, ValidationRequest};
use crate::infra::config::{GpuSection, TierCapacity};
use crate::infra::errors::RaceError;

/// Executes validation jobs (HTTP service, local simulator, test double).
#[async_trait]
pub trait ValidationBackend: Send + Sync {
    async fn run(
        &self,
        requests: &[ValidationRequest],
        context: ValidationContext,
    ) -> Result<Vec<GpuValidationResult>, RaceError>;
}

struct TierSlots {
    capacity: usize,
    in_use: AtomicUsize,
}

impl TierSlots {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: AtomicUsize::new(0),
        }
    }

    fn try_reserve(&self) -> bool {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity).then_some(used + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_sub(1)
            });
    }
}

/// Holds one job slot on a tier until dropped.
struct Reservation<'a> {
    slots: &'a TierSlots,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.slots.release();
    }
}

struct CacheEntry {
    result: GpuValidationResult,
    stored_at: Instant,
}

pub struct TieredGpuPool {
    backend: Arc<dyn ValidationBackend>,
    t4: TierSlots,
    a10g: TierSlots,
    a100: TierSlots,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    stopped: AtomicBool,
}

impl TieredGpuPool {
    pub fn new(backend: Arc<dyn ValidationBackend>, capacity: &TierCapacity, cache_ttl: Duration) -> Self {
        Self {
            backend,
            t4: TierSlots::new(capacity.t4),
            a10g: TierSlots::new(capacity.a10g),
            a100: TierSlots::new(capacity.a100),
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn from_config(backend: Arc<dyn ValidationBackend>, section: &GpuSection) -> Self {
        Self::new(
            backend,
            &section.capacity,
            Duration::from_secs(section.cache_ttl_seconds),
        )
    }

    fn slots(&self, tier: GpuTier) -> &TierSlots {
        match tier {
            GpuTier::T4 => &self.t4,
            GpuTier::A10G => &self.a10g,
            GpuTier::A100 => &self.a100,
        }
    }

    fn reserve(&self, tier: GpuTier) -> Option<Reservation<'_>> {
        let slots = self.slots(tier);
        slots.try_reserve().then_some(Reservation { slots })
    }

    pub fn in_use(&self, tier: GpuTier) -> usize {
        self.slots(tier).in_use.load(Ordering::Acquire)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn cached(&self, key: &str) -> Option<GpuValidationResult> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.cache_ttl => {
                Some(entry.result.clone())
            }
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }
}

/// Cache key over everything that influences a validation result.
pub fn cache_key(request: &ValidationRequest, tier: GpuTier) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.hypothesis_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(request.statement.as_bytes());
    hasher.update([0u8]);
    for (name, value) in &request.parameters {
        hasher.update(name.as_bytes());
        hasher.update(value.to_le_bytes());
    }
    hasher.update(tier.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl GpuPool for TieredGpuPool {
    fn has_capacity(&self, tier: GpuTier) -> bool {
        let slots = self.slots(tier);
        !self.stopped.load(Ordering::Acquire) && slots.in_use.load(Ordering::Acquire) < slots.capacity
    }

    async fn validate(
        &self,
        requests: Vec<ValidationRequest>,
        context: ValidationContext,
    ) -> Result<Vec<GpuValidationResult>, RaceError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(RaceError::Gpu("pool is stopped".into()));
        }

        let keys: Vec<String> = requests.iter().map(|r| cache_key(r, context.tier)).collect();
        let mut results: Vec<Option<GpuValidationResult>> = keys
            .iter()
            .map(|k| {
                self.cached(k).map(|mut hit| {
                    hit.from_cache = true;
                    hit.cost_usd = 0.0;
                    hit.duration_ms = 0;
                    hit
                })
            })
            .collect();

        let misses: Vec<ValidationRequest> = requests
            .iter()
            .zip(&results)
            .filter(|(_, cached)| cached.is_none())
            .map(|(r, _)| r.clone())
            .collect();

        if !misses.is_empty() {
            let _reservation = self.reserve(context.tier).ok_or_else(|| RaceError::GpuCapacity {
                tier: context.tier.to_string(),
            })?;

            let fresh = self.backend.run(&misses, context).await?;
            let mut by_id: HashMap<String, GpuValidationResult> = fresh
                .into_iter()
                .map(|r| (r.hypothesis_id.clone(), r))
                .collect();

            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            for ((request, key), slot) in requests.iter().zip(&keys).zip(results.iter_mut()) {
                if slot.is_some() {
                    continue;
                }
                if let Some(result) = by_id.remove(&request.hypothesis_id) {
                    cache.insert(
                        key.clone(),
                        CacheEntry {
                            result: result.clone(),
                            stored_at: Instant::now(),
                        },
                    );
                    *slot = Some(result);
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    async fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            tracing::debug!("GPU pool stopped");
        }
    }
}
