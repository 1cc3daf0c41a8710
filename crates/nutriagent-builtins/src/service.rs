//! Nutrition lookups: caching facade over a [`FoodDataSource`].

use crate::cache::LookupCache;
use crate::food_data::{FoodDataSource, FoodHit, FoodNutrition};
use crate::matcher;
use nutriagent_core::AgentResult;
use std::sync::Arc;

/// Main entry point for food search and nutrition retrieval.
///
/// Wraps a [`FoodDataSource`] with match ranking and a bounded lookup cache
/// so repeated queries within a process do not hit the upstream again.
pub struct NutritionService {
    source: Arc<dyn FoodDataSource>,
    cache: LookupCache,
}

impl NutritionService {
    /// Build a service over `source` with the default cache capacity.
    pub fn new(source: Arc<dyn FoodDataSource>) -> Self {
        Self {
            source,
            cache: LookupCache::default(),
        }
    }

    /// Build a service with an explicit cache capacity.
    pub fn with_cache_capacity(source: Arc<dyn FoodDataSource>, capacity: usize) -> Self {
        Self {
            source,
            cache: LookupCache::new(capacity),
        }
    }

    /// Search foods matching `query`, ranked best match first.
    ///
    /// Results are re-ranked by the lexical scorer regardless of upstream
    /// order, then cached. Empty result sets are not cached so a food added
    /// upstream becomes visible without a restart.
    pub async fn search(&self, query: &str) -> AgentResult<Vec<FoodHit>> {
        let key = format!("search:{query}");
        if let Some(hits) = self.cache.get::<Vec<FoodHit>>(&key) {
            return Ok(hits);
        }

        let mut hits = self.source.search(query).await?;
        rank(query, &mut hits);
        if !hits.is_empty() {
            self.cache.put(&key, &hits);
        }
        Ok(hits)
    }

    /// Best single match for `query`, if any.
    pub async fn best_match(&self, query: &str) -> AgentResult<Option<FoodHit>> {
        Ok(self.search(query).await?.into_iter().next())
    }

    /// Per-100g nutrition facts for a food id.
    pub async fn nutrition(&self, fdc_id: u64) -> AgentResult<Option<FoodNutrition>> {
        let key = format!("food:{fdc_id}");
        if let Some(facts) = self.cache.get::<FoodNutrition>(&key) {
            return Ok(Some(facts));
        }

        let facts = self.source.nutrition(fdc_id).await?;
        if let Some(ref f) = facts {
            self.cache.put(&key, f);
        }
        Ok(facts)
    }
}

/// Order hits by lexical match score, preserving upstream order on ties.
fn rank(query: &str, hits: &mut Vec<FoodHit>) {
    let mut scored: Vec<(f64, FoodHit)> = hits
        .drain(..)
        .map(|hit| (matcher::match_score(query, &hit.description), hit))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    hits.extend(scored.into_iter().map(|(_, hit)| hit));
}
