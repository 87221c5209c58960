use std::collections::HashMap;
use std::sync::Arc;

use geolens_common::{GeoLensError, Result};
use tracing::debug;

use crate::compare::{compare_datasets, ComparisonReport};
use crate::dataset::Dataset;
use crate::qa::{compute_qa, QaBundle};

/// The two dataset slots a session can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSlot {
    Primary,
    Comparison,
}

impl SessionSlot {
    fn label(self) -> &'static str {
        match self {
            SessionSlot::Primary => "primary",
            SessionSlot::Comparison => "comparison",
        }
    }
}

#[derive(Default)]
struct StatCache {
    qa: HashMap<u64, Arc<QaBundle>>,
    comparisons: HashMap<(u64, u64), Arc<ComparisonReport>>,
}

/// Holds the loaded datasets and memoizes derived statistics by source
/// fingerprint. Replacing a slot drops every cached entry that referenced
/// the evicted dataset.
#[derive(Default)]
pub struct SessionState {
    primary: Option<Arc<Dataset>>,
    comparison: Option<Arc<Dataset>>,
    cache: StatCache,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dataset(&self, slot: SessionSlot) -> Option<&Arc<Dataset>> {
        match slot {
            SessionSlot::Primary => self.primary.as_ref(),
            SessionSlot::Comparison => self.comparison.as_ref(),
        }
    }

    pub fn set(&mut self, slot: SessionSlot, dataset: Dataset) {
        debug!(slot = slot.label(), name = %dataset.name, "slot replaced");
        let dataset = Arc::new(dataset);
        match slot {
            SessionSlot::Primary => self.primary = Some(dataset),
            SessionSlot::Comparison => self.comparison = Some(dataset),
        }
        self.evict_stale();
    }

    pub fn clear(&mut self, slot: SessionSlot) {
        match slot {
            SessionSlot::Primary => self.primary = None,
            SessionSlot::Comparison => self.comparison = None,
        }
        self.evict_stale();
    }

    /// QA bundle for a slot, computed at most once per fingerprint.
    pub fn qa(&mut self, slot: SessionSlot) -> Result<Arc<QaBundle>> {
        let dataset = self
            .dataset(slot)
            .cloned()
            .ok_or_else(|| GeoLensError::EmptyInput(format!("no {} dataset loaded", slot.label())))?;
        if let Some(bundle) = self.cache.qa.get(&dataset.fingerprint) {
            return Ok(bundle.clone());
        }
        let bundle = Arc::new(compute_qa(&dataset)?);
        self.cache.qa.insert(dataset.fingerprint, bundle.clone());
        Ok(bundle)
    }

    /// Comparison of the two slots, memoized by the fingerprint pair.
    pub fn comparison(&mut self) -> Result<Arc<ComparisonReport>> {
        let left = self
            .primary
            .clone()
            .ok_or_else(|| GeoLensError::EmptyInput("no primary dataset loaded".to_owned()))?;
        let right = self
            .comparison
            .clone()
            .ok_or_else(|| GeoLensError::EmptyInput("no comparison dataset loaded".to_owned()))?;
        let key = (left.fingerprint, right.fingerprint);
        if let Some(report) = self.cache.comparisons.get(&key) {
            return Ok(report.clone());
        }
        let report = Arc::new(compare_datasets(&left, &right)?);
        self.cache.comparisons.insert(key, report.clone());
        Ok(report)
    }

    fn live_fingerprints(&self) -> Vec<u64> {
        self.primary
            .iter()
            .chain(self.comparison.iter())
            .map(|d| d.fingerprint)
            .collect()
    }

    fn evict_stale(&mut self) {
        let live = self.live_fingerprints();
        self.cache.qa.retain(|fp, _| live.contains(fp));
        self.cache
            .comparisons
            .retain(|(a, b), _| live.contains(a) && live.contains(b));
    }
}
