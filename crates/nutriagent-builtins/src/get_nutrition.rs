use crate::food_data::FoodNutrition;
use crate::service::NutritionService;
use async_trait::async_trait;
use nutriagent_core::{AgentResult, ToolCall, ToolOutcome};
use nutriagent_tools::{Tool, ToolDescriptor};
use std::sync::Arc;
use tracing::info;

/// Nutrition lookup tool. Fetches per-100g facts for a food by FDC id.
pub struct GetNutritionTool {
    descriptor: ToolDescriptor,
    service: Arc<NutritionService>,
}

impl GetNutritionTool {
    pub fn new(service: Arc<NutritionService>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "get_nutrition",
                "Get detailed nutrition facts for a food by its FDC id \
                 (from search_foods results). Values are per 100g.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "fdc_id": {
                            "type": "integer",
                            "description": "The FDC id from search results (e.g. 171688)"
                        }
                    },
                    "required": ["fdc_id"]
                }),
            )
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "fdc_id": { "type": "integer" },
                    "description": { "type": "string" },
                    "serving_size": { "type": "string" },
                    "nutrients": { "type": "object" }
                }
            })),
            service,
        }
    }
}

/// Nutrient block in the shape the assistant reads: unit-suffixed keys.
pub(crate) fn nutrients_json(facts: &FoodNutrition) -> serde_json::Value {
    serde_json::json!({
        "calories": facts.calories,
        "protein_g": facts.protein,
        "carbs_g": facts.carbs,
        "fat_g": facts.fat,
        "fiber_g": facts.fiber,
        "sugars_g": facts.sugars,
        "sodium_mg": facts.sodium,
    })
}

#[async_trait]
impl Tool for GetNutritionTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> AgentResult<ToolOutcome> {
        let fdc_id = call.arguments["fdc_id"].as_u64().unwrap_or_default();
        if fdc_id == 0 {
            return Ok(ToolOutcome::error(
                &call.id,
                "fdc_id must be a positive integer",
            ));
        }

        let Some(facts) = self.service.nutrition(fdc_id).await? else {
            return Ok(ToolOutcome::error(
                &call.id,
                format!("No nutrition data for FDC id {fdc_id}"),
            ));
        };

        info!(fdc_id, food = %facts.name, "Nutrition lookup");

        Ok(ToolOutcome::success(
            &call.id,
            serde_json::json!({
                "fdc_id": fdc_id,
                "description": facts.name,
                "serving_size": "100g",
                "nutrients": nutrients_json(&facts),
            })
            .to_string(),
        ))
    }
}
