use crate::service::NutritionService;
use async_trait::async_trait;
use nutriagent_core::{AgentResult, ToolCall, ToolOutcome};
use nutriagent_tools::{Tool, ToolDescriptor};
use std::sync::Arc;
use tracing::info;

const MAX_RESULTS: usize = 5;

/// Food search tool. Finds foods by name and returns their FDC ids.
pub struct SearchFoodsTool {
    descriptor: ToolDescriptor,
    service: Arc<NutritionService>,
}

impl SearchFoodsTool {
    pub fn new(service: Arc<NutritionService>) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "search_foods",
                "Search the food database by name. Returns matching foods \
                 with their FDC ids, best match first.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Food name to search for (e.g. \"avocado\", \"chicken breast\")"
                        }
                    },
                    "required": ["query"]
                }),
            )
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "count": { "type": "integer" },
                    "results": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "fdc_id": { "type": "integer" },
                                "description": { "type": "string" },
                                "brand": { "type": "string" }
                            }
                        }
                    }
                }
            })),
            service,
        }
    }
}

#[async_trait]
impl Tool for SearchFoodsTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> AgentResult<ToolOutcome> {
        let query = call.arguments["query"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string();

        if query.is_empty() {
            return Ok(ToolOutcome::error(&call.id, "Query must not be empty"));
        }

        let hits = self.service.search(&query).await?;
        info!(%query, count = hits.len(), "Food search");

        let results = hits
            .iter()
            .take(MAX_RESULTS)
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ToolOutcome::success(
            &call.id,
            serde_json::json!({
                "query": query,
                "count": results.len(),
                "results": results,
            })
            .to_string(),
        ))
    }
}
