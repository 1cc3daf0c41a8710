use crate::food_data::{nutrient_unit, NUTRIENT_KEYS};
use crate::service::NutritionService;
use async_trait::async_trait;
use nutriagent_core::{AgentResult, ToolCall, ToolOutcome};
use nutriagent_tools::{Tool, ToolDescriptor};
use std::sync::Arc;
use tracing::info;

const MAX_FOODS: usize = 10;

/// Nutrient comparison tool. Ranks one nutrient across several foods.
pub struct CompareNutrientsTool {
    descriptor: ToolDescriptor,
    service: Arc<NutritionService>,
}

impl CompareNutrientsTool {
    pub fn new(service: Arc<NutritionService>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "compare_nutrients",
                "Compare a single nutrient across multiple foods, highest \
                 first. Nutrients: calories, protein, carbs, fat, fiber, \
                 sugars, sodium.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "fdc_ids": {
                            "type": "string",
                            "description": "Comma-separated FDC ids (e.g. \"171688,173944\")"
                        },
                        "nutrient": {
                            "type": "string",
                            "description": "Nutrient to compare (e.g. \"protein\")"
                        }
                    },
                    "required": ["fdc_ids", "nutrient"]
                }),
            )
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "nutrient": { "type": "string" },
                    "unit": { "type": "string" },
                    "comparison": { "type": "array" },
                    "missing": { "type": "array" }
                }
            })),
            service,
        }
    }
}

#[async_trait]
impl Tool for CompareNutrientsTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> AgentResult<ToolOutcome> {
        let raw_ids = call.arguments["fdc_ids"].as_str().unwrap_or_default();
        let nutrient = call.arguments["nutrient"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if !NUTRIENT_KEYS.contains(&nutrient.as_str()) {
            return Ok(ToolOutcome::error(
                &call.id,
                format!(
                    "Unknown nutrient '{nutrient}'. Use one of: {}",
                    NUTRIENT_KEYS.join(", ")
                ),
            ));
        }

        let mut ids = Vec::new();
        for token in raw_ids.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            match token.parse::<u64>() {
                Ok(id) => ids.push(id),
                Err(_) => {
                    return Ok(ToolOutcome::error(
                        &call.id,
                        format!("'{token}' is not a numeric FDC id"),
                    ));
                }
            }
        }

        if ids.len() < 2 {
            return Ok(ToolOutcome::error(
                &call.id,
                "Provide at least two comma-separated FDC ids to compare",
            ));
        }
        ids.truncate(MAX_FOODS);

        let mut rows = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            match self.service.nutrition(id).await? {
                Some(facts) => rows.push(serde_json::json!({
                    "fdc_id": id,
                    "food": facts.name,
                    "value": facts.nutrient(&nutrient).unwrap_or(0.0),
                })),
                None => missing.push(id),
            }
        }

        if rows.is_empty() {
            return Ok(ToolOutcome::error(
                &call.id,
                "None of the given FDC ids had nutrition data",
            ));
        }

        rows.sort_by(|a, b| {
            let av = a["value"].as_f64().unwrap_or(0.0);
            let bv = b["value"].as_f64().unwrap_or(0.0);
            bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal)
        });

        info!(%nutrient, foods = rows.len(), "Nutrient comparison");

        Ok(ToolOutcome::success(
            &call.id,
            serde_json::json!({
                "nutrient": nutrient,
                "unit": nutrient_unit(&nutrient),
                "comparison": rows,
                "missing": missing,
            })
            .to_string(),
        ))
    }
}
