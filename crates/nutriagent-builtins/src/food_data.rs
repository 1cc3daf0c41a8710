//! Food database access: the [`FoodDataSource`] trait plus the bundled
//! in-memory table and the USDA FoodData Central HTTP adapter.

use crate::matcher;
use async_trait::async_trait;
use nutriagent_core::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Nutrient keys tracked per food, in label display order.
pub const NUTRIENT_KEYS: [&str; 7] = [
    "calories", "protein", "carbs", "fat", "fiber", "sugars", "sodium",
];

/// Display unit for a nutrient key. Unknown keys fall back to grams.
pub fn nutrient_unit(key: &str) -> &'static str {
    match key {
        "calories" => "kcal",
        "sodium" => "mg",
        _ => "g",
    }
}

/// A single hit from a food search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodHit {
    /// FoodData Central identifier.
    pub fdc_id: u64,
    /// Human-readable food description.
    pub description: String,
    /// Brand owner, when the entry is a branded product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

/// Per-100g nutrient facts for one food.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FoodNutrition {
    /// Food description this record belongs to.
    pub name: String,
    /// Energy in kcal.
    pub calories: f64,
    /// Protein in grams.
    pub protein: f64,
    /// Carbohydrates in grams.
    pub carbs: f64,
    /// Total fat in grams.
    pub fat: f64,
    /// Dietary fiber in grams.
    pub fiber: f64,
    /// Total sugars in grams.
    pub sugars: f64,
    /// Sodium in milligrams.
    pub sodium: f64,
}

impl FoodNutrition {
    /// Look up one nutrient by key. Returns `None` for unknown keys.
    pub fn nutrient(&self, key: &str) -> Option<f64> {
        match key {
            "calories" => Some(self.calories),
            "protein" => Some(self.protein),
            "carbs" => Some(self.carbs),
            "fat" => Some(self.fat),
            "fiber" => Some(self.fiber),
            "sugars" => Some(self.sugars),
            "sodium" => Some(self.sodium),
            _ => None,
        }
    }

    /// Scale every nutrient by `factor`, keeping the name. Used to go from
    /// per-100g facts to an arbitrary gram amount.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            name: self.name.clone(),
            calories: self.calories * factor,
            protein: self.protein * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
            fiber: self.fiber * factor,
            sugars: self.sugars * factor,
            sodium: self.sodium * factor,
        }
    }

    /// Add another record's nutrients into this one.
    pub fn accumulate(&mut self, other: &Self) {
        self.calories += other.calories;
        self.protein += other.protein;
        self.carbs += other.carbs;
        self.fat += other.fat;
        self.fiber += other.fiber;
        self.sugars += other.sugars;
        self.sodium += other.sodium;
    }
}

/// Provider of food search and nutrition lookups.
///
/// Implementations: [`MemoryFoodData`] (seeded table, the runnable default)
/// and [`UsdaFoodData`] (FoodData Central HTTP API).
#[async_trait]
pub trait FoodDataSource: Send + Sync {
    /// Search foods matching `query`, best matches first.
    async fn search(&self, query: &str) -> AgentResult<Vec<FoodHit>>;

    /// Fetch per-100g nutrition facts for a food. `None` when the id is
    /// unknown to the provider.
    async fn nutrition(&self, fdc_id: u64) -> AgentResult<Option<FoodNutrition>>;
}

// --- In-memory source ---

/// In-memory food table seeded with common whole foods.
///
/// Per-100g values follow the USDA SR Legacy entries for each food. This is
/// the default source so the service runs without any upstream credentials.
pub struct MemoryFoodData {
    foods: Vec<(FoodHit, FoodNutrition)>,
}

impl MemoryFoodData {
    /// Build the seeded table.
    pub fn new() -> Self {
        let mut data = Self { foods: Vec::new() };
        for (id, desc, brand, n) in seed_foods() {
            data.insert(
                FoodHit {
                    fdc_id: id,
                    description: desc.to_string(),
                    brand: brand.map(String::from),
                },
                n,
            );
        }
        data
    }

    /// Build an empty table.
    pub fn empty() -> Self {
        Self { foods: Vec::new() }
    }

    /// Add one food entry.
    pub fn insert(&mut self, hit: FoodHit, nutrition: FoodNutrition) {
        self.foods.push((hit, nutrition));
    }

    /// Number of foods in the table.
    pub fn len(&self) -> usize {
        self.foods.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }
}

impl Default for MemoryFoodData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FoodDataSource for MemoryFoodData {
    async fn search(&self, query: &str) -> AgentResult<Vec<FoodHit>> {
        let mut scored: Vec<(f64, &FoodHit)> = self
            .foods
            .iter()
            .map(|(hit, _)| (matcher::match_score(query, &hit.description), hit))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.fdc_id.cmp(&b.1.fdc_id))
        });
        Ok(scored.into_iter().map(|(_, hit)| hit.clone()).collect())
    }

    async fn nutrition(&self, fdc_id: u64) -> AgentResult<Option<FoodNutrition>> {
        Ok(self
            .foods
            .iter()
            .find(|(hit, _)| hit.fdc_id == fdc_id)
            .map(|(_, n)| n.clone()))
    }
}

type SeedRow = (u64, &'static str, Option<&'static str>, FoodNutrition);

fn seed_foods() -> Vec<SeedRow> {
    fn n(name: &str, vals: [f64; 7]) -> FoodNutrition {
        FoodNutrition {
            name: name.to_string(),
            calories: vals[0],
            protein: vals[1],
            carbs: vals[2],
            fat: vals[3],
            fiber: vals[4],
            sugars: vals[5],
            sodium: vals[6],
        }
    }
    vec![
        (
            171688,
            "Apples, raw, with skin",
            None,
            n("Apples, raw, with skin", [52.0, 0.26, 13.8, 0.17, 2.4, 10.4, 1.0]),
        ),
        (
            173944,
            "Bananas, raw",
            None,
            n("Bananas, raw", [89.0, 1.09, 22.8, 0.33, 2.6, 12.2, 1.0]),
        ),
        (
            171077,
            "Chicken, breast, meat only, cooked, roasted",
            None,
            n(
                "Chicken, breast, meat only, cooked, roasted",
                [165.0, 31.0, 0.0, 3.57, 0.0, 0.0, 74.0],
            ),
        ),
        (
            168878,
            "Rice, white, long-grain, regular, cooked",
            None,
            n(
                "Rice, white, long-grain, regular, cooked",
                [130.0, 2.69, 28.2, 0.28, 0.4, 0.05, 1.0],
            ),
        ),
        (
            170379,
            "Broccoli, raw",
            None,
            n("Broccoli, raw", [34.0, 2.82, 6.64, 0.37, 2.6, 1.7, 33.0]),
        ),
        (
            173424,
            "Egg, whole, raw, fresh",
            None,
            n("Egg, whole, raw, fresh", [143.0, 12.6, 0.72, 9.51, 0.0, 0.37, 142.0]),
        ),
        (
            171265,
            "Milk, whole, 3.25% milkfat",
            None,
            n("Milk, whole, 3.25% milkfat", [61.0, 3.15, 4.8, 3.25, 0.0, 5.05, 43.0]),
        ),
        (
            170567,
            "Nuts, almonds",
            None,
            n("Nuts, almonds", [579.0, 21.2, 21.6, 49.9, 12.5, 4.35, 1.0]),
        ),
        (
            175167,
            "Fish, salmon, Atlantic, farmed, cooked, dry heat",
            None,
            n(
                "Fish, salmon, Atlantic, farmed, cooked, dry heat",
                [206.0, 22.1, 0.0, 12.4, 0.0, 0.0, 61.0],
            ),
        ),
        (
            169705,
            "Oats, whole grain, rolled",
            None,
            n("Oats, whole grain, rolled", [389.0, 16.9, 66.3, 6.9, 10.6, 0.99, 2.0]),
        ),
        (
            168462,
            "Spinach, raw",
            None,
            n("Spinach, raw", [23.0, 2.86, 3.63, 0.39, 2.2, 0.42, 79.0]),
        ),
        (
            171705,
            "Avocados, raw, all commercial varieties",
            None,
            n(
                "Avocados, raw, all commercial varieties",
                [160.0, 2.0, 8.53, 14.7, 6.7, 0.66, 7.0],
            ),
        ),
        (
            2344719,
            "Greek yogurt, plain, nonfat",
            Some("Generic"),
            n("Greek yogurt, plain, nonfat", [59.0, 10.2, 3.6, 0.39, 0.0, 3.24, 36.0]),
        ),
    ]
}

// --- USDA FoodData Central adapter ---

const USDA_BASE_URL: &str = "https://api.nal.usda.gov/fdc/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// [`FoodDataSource`] backed by the USDA FoodData Central v1 API.
pub struct UsdaFoodData {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UsdaFoodData {
    /// Create an adapter against the public FDC endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, USDA_BASE_URL)
    }

    /// Create an adapter against a custom endpoint (used by tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn upstream_error(reason: String, transient: bool) -> AgentError {
        AgentError::ToolExecution {
            tool: "usda_food_data".to_string(),
            reason,
            transient,
        }
    }
}

#[async_trait]
impl FoodDataSource for UsdaFoodData {
    async fn search(&self, query: &str) -> AgentResult<Vec<FoodHit>> {
        let url = format!("{}/foods/search", self.base_url);
        debug!(%query, "USDA food search");

        let response = self
            .client
            .post(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| Self::upstream_error(format!("search request failed: {e}"), true))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::upstream_error(
                format!("search returned HTTP {status}"),
                status.is_server_error(),
            ));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Self::upstream_error(format!("malformed search response: {e}"), false))?;

        Ok(body
            .foods
            .into_iter()
            .map(|f| FoodHit {
                fdc_id: f.fdc_id,
                description: f.description,
                brand: f.brand_owner,
            })
            .collect())
    }

    async fn nutrition(&self, fdc_id: u64) -> AgentResult<Option<FoodNutrition>> {
        let url = format!("{}/food/{fdc_id}", self.base_url);
        debug!(fdc_id, "USDA food detail");

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| Self::upstream_error(format!("detail request failed: {e}"), true))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(Self::upstream_error(
                format!("detail returned HTTP {status}"),
                status.is_server_error(),
            ));
        }

        let detail: FoodDetail = response
            .json()
            .await
            .map_err(|e| Self::upstream_error(format!("malformed detail response: {e}"), false))?;

        let mut facts = FoodNutrition {
            name: detail.description,
            ..FoodNutrition::default()
        };
        for entry in detail.food_nutrients {
            apply_nutrient(&mut facts, entry.nutrient.id, entry.amount);
        }
        Ok(Some(facts))
    }
}

/// Fold one FDC nutrient row into the normalized record, keyed by the FDC
/// nutrient id.
fn apply_nutrient(facts: &mut FoodNutrition, id: u64, amount: f64) {
    match id {
        1008 => facts.calories = amount,
        1003 => facts.protein = amount,
        1005 => facts.carbs = amount,
        1004 => facts.fat = amount,
        1079 => facts.fiber = amount,
        2000 => facts.sugars = amount,
        1093 => facts.sodium = amount,
        _ => {}
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<SearchFood>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchFood {
    fdc_id: u64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    brand_owner: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FoodDetail {
    #[serde(default)]
    description: String,
    #[serde(default)]
    food_nutrients: Vec<FoodNutrientEntry>,
}

#[derive(Deserialize)]
struct FoodNutrientEntry {
    #[serde(default)]
    nutrient: NutrientRef,
    #[serde(default)]
    amount: f64,
}

#[derive(Deserialize, Default)]
struct NutrientRef {
    #[serde(default)]
    id: u64,
}
