use crate::food_data::{FoodNutrition, NUTRIENT_KEYS};
use crate::service::NutritionService;
use async_trait::async_trait;
use nutriagent_core::{AgentError, AgentResult, ToolCall, ToolOutcome};
use nutriagent_tools::{Tool, ToolDescriptor};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RecipeArgs {
    ingredients: Vec<IngredientArg>,
    #[serde(default)]
    serving_size_grams: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IngredientArg {
    name: String,
    grams: f64,
}

/// Recipe nutrition tool. Sums grams-scaled nutrient facts over a list of
/// ingredients.
pub struct RecipeNutritionTool {
    descriptor: ToolDescriptor,
    service: Arc<NutritionService>,
}

impl RecipeNutritionTool {
    pub fn new(service: Arc<NutritionService>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "calculate_recipe_nutrition",
                "Calculate combined nutrition for a recipe from its \
                 ingredient list. Each ingredient is matched against the \
                 food database and scaled by its gram amount.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "ingredients": {
                            "type": "array",
                            "description": "Recipe ingredients",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "name": { "type": "string" },
                                    "grams": { "type": "number" }
                                },
                                "required": ["name", "grams"]
                            }
                        },
                        "serving_size_grams": {
                            "type": "number",
                            "description": "Optional serving size for a per-serving breakdown"
                        }
                    },
                    "required": ["ingredients"]
                }),
            )
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "recipe_totals": { "type": "object" },
                    "total_grams": { "type": "number" },
                    "ingredients": { "type": "array" },
                    "per_serving": { "type": "object" }
                }
            })),
            service,
        }
    }
}

#[async_trait]
impl Tool for RecipeNutritionTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> AgentResult<ToolOutcome> {
        let args: RecipeArgs = serde_json::from_value(call.arguments.clone()).map_err(|e| {
            AgentError::InvalidToolArguments {
                tool: call.name.clone(),
                reason: e.to_string(),
            }
        })?;

        if args.ingredients.is_empty() {
            return Ok(ToolOutcome::error(
                &call.id,
                "The ingredient list must not be empty",
            ));
        }

        let mut totals = FoodNutrition::default();
        let mut total_grams = 0.0;
        let mut breakdown = Vec::new();
        let mut matched_any = false;

        for ingredient in &args.ingredients {
            if ingredient.grams.is_nan() || ingredient.grams <= 0.0 {
                return Ok(ToolOutcome::error(
                    &call.id,
                    format!("'{}' needs a gram amount above zero", ingredient.name),
                ));
            }

            let Some(hit) = self.service.best_match(&ingredient.name).await? else {
                breakdown.push(serde_json::json!({
                    "name": ingredient.name,
                    "grams": ingredient.grams,
                    "matched": false,
                }));
                continue;
            };
            let Some(facts) = self.service.nutrition(hit.fdc_id).await? else {
                breakdown.push(serde_json::json!({
                    "name": ingredient.name,
                    "grams": ingredient.grams,
                    "matched": false,
                }));
                continue;
            };

            let scaled = facts.scaled(ingredient.grams / 100.0);
            totals.accumulate(&scaled);
            total_grams += ingredient.grams;
            matched_any = true;

            breakdown.push(serde_json::json!({
                "name": ingredient.name,
                "grams": ingredient.grams,
                "matched": true,
                "food": hit.description,
                "fdc_id": hit.fdc_id,
                "calories": round2(scaled.calories),
                "protein": round2(scaled.protein),
            }));
        }

        if !matched_any {
            return Ok(ToolOutcome::error(
                &call.id,
                "None of the ingredients matched a known food",
            ));
        }

        let mut body = serde_json::json!({
            "recipe_totals": nutrient_totals(&totals, 1.0),
            "total_grams": total_grams,
            "ingredients": breakdown,
        });

        if let Some(serving) = args.serving_size_grams {
            if serving > 0.0 && total_grams > 0.0 {
                body["per_serving"] = nutrient_totals(&totals, serving / total_grams);
                body["serving_size"] = serde_json::json!(format!("{serving}g"));
            }
        }

        info!(
            ingredients = args.ingredients.len(),
            total_grams, "Recipe nutrition calculated"
        );

        Ok(ToolOutcome::success(&call.id, body.to_string()))
    }
}

fn nutrient_totals(totals: &FoodNutrition, scale: f64) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for key in NUTRIENT_KEYS {
        let value = totals.nutrient(key).unwrap_or(0.0) * scale;
        map.insert(key.to_string(), serde_json::json!(round2(value)));
    }
    serde_json::Value::Object(map)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
