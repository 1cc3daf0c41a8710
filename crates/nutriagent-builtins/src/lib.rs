//! Built-in nutrition tools, food data sources, and the default reasoning
//! engine for the nutriagent service.
//!
//! Provides the five tools the assistant works with (food search, nutrition
//! lookup, nutrient comparison, recipe totals, label generation), the
//! [`FoodDataSource`] implementations backing them, label rendering, and
//! artifact storage for generated labels.
//!
//! # Main entry points
//!
//! - [`register_builtins()`] — Register the standard tool set.
//! - [`MemoryFoodData`] / [`UsdaFoodData`] — Bundled food data sources.
//! - [`KeywordEngine`] — Deterministic engine so the service runs without
//!   a model credential.

/// Artifact storage for generated labels.
pub mod artifact_store;
/// Bounded lookup cache.
pub mod cache;
/// Nutrient comparison tool.
pub mod compare_nutrients;
/// Food data sources and nutrient types.
pub mod food_data;
/// Label generation tool.
pub mod generate_label;
/// Nutrition lookup tool.
pub mod get_nutrition;
/// Keyword-driven default reasoning engine.
pub mod keyword_engine;
/// Nutrition label rendering.
pub mod labels;
/// Lexical food match scoring.
pub mod matcher;
/// Recipe nutrition tool.
pub mod recipe_nutrition;
/// Food search tool.
pub mod search_foods;
/// Caching nutrition service facade.
pub mod service;

pub use artifact_store::{ArtifactBackend, ArtifactEntry, InMemoryArtifactBackend, LABELS_PREFIX};
pub use cache::{LookupCache, DEFAULT_CACHE_CAPACITY};
pub use compare_nutrients::CompareNutrientsTool;
pub use food_data::{FoodDataSource, FoodHit, FoodNutrition, MemoryFoodData, UsdaFoodData};
pub use generate_label::GenerateLabelTool;
pub use get_nutrition::GetNutritionTool;
pub use keyword_engine::KeywordEngine;
pub use labels::{LabelLayout, LabelRenderer, TextLabelRenderer};
pub use recipe_nutrition::RecipeNutritionTool;
pub use search_foods::SearchFoodsTool;
pub use service::NutritionService;

use nutriagent_core::AgentResult;
use nutriagent_tools::ToolRegistry;
use std::sync::Arc;

/// Register the standard built-in tool set into the given registry.
pub fn register_builtins(
    registry: &mut ToolRegistry,
    service: Arc<NutritionService>,
    artifacts: Arc<dyn ArtifactBackend>,
) -> AgentResult<()> {
    registry.register(Arc::new(SearchFoodsTool::new(service.clone())))?;
    registry.register(Arc::new(GetNutritionTool::new(service.clone())))?;
    registry.register(Arc::new(CompareNutrientsTool::new(service.clone())))?;
    registry.register(Arc::new(RecipeNutritionTool::new(service)))?;
    registry.register(Arc::new(GenerateLabelTool::new(artifacts)))?;
    Ok(())
}
