use crate::artifact_store::ArtifactBackend;
use crate::food_data::FoodNutrition;
use crate::labels::{LabelLayout, LabelRenderer, TextLabelRenderer};
use async_trait::async_trait;
use nutriagent_core::{AgentError, AgentResult, ToolCall, ToolOutcome};
use nutriagent_tools::{Tool, ToolDescriptor};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const MAX_NAME_CHARS: usize = 30;

#[derive(Debug, Deserialize)]
struct LabelArgs {
    food_name: String,
    nutrition: NutritionArgs,
    #[serde(default)]
    serving_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NutritionArgs {
    #[serde(default)]
    calories: f64,
    #[serde(default)]
    protein: f64,
    #[serde(default)]
    carbs: f64,
    #[serde(default)]
    fat: f64,
    #[serde(default)]
    fiber: f64,
    #[serde(default)]
    sugars: f64,
    #[serde(default)]
    sodium: f64,
}

/// Label generation tool. Renders a nutrition-facts label and stores it as
/// an artifact reachable under `/labels/{name}`.
pub struct GenerateLabelTool {
    descriptor: ToolDescriptor,
    renderer: Arc<dyn LabelRenderer>,
    artifacts: Arc<dyn ArtifactBackend>,
}

impl GenerateLabelTool {
    pub fn new(artifacts: Arc<dyn ArtifactBackend>) -> Self {
        Self::with_renderer(artifacts, Arc::new(TextLabelRenderer))
    }

    pub fn with_renderer(
        artifacts: Arc<dyn ArtifactBackend>,
        renderer: Arc<dyn LabelRenderer>,
    ) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "generate_label",
                "Generate a nutrition-facts label for a food. Returns the \
                 rendered label and the path it is served under.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "food_name": {
                            "type": "string",
                            "description": "Name shown on the label"
                        },
                        "nutrition": {
                            "type": "object",
                            "description": "Per-serving nutrient values",
                            "properties": {
                                "calories": { "type": "number" },
                                "protein": { "type": "number" },
                                "carbs": { "type": "number" },
                                "fat": { "type": "number" },
                                "fiber": { "type": "number" },
                                "sugars": { "type": "number" },
                                "sodium": { "type": "number" }
                            }
                        },
                        "serving_size": {
                            "type": "string",
                            "description": "Serving size line (default \"100g\")"
                        }
                    },
                    "required": ["food_name", "nutrition"]
                }),
            )
            .with_output_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "label": { "type": "string" }
                }
            })),
            renderer,
            artifacts,
        }
    }
}

#[async_trait]
impl Tool for GenerateLabelTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> AgentResult<ToolOutcome> {
        let args: LabelArgs = serde_json::from_value(call.arguments.clone()).map_err(|e| {
            AgentError::InvalidToolArguments {
                tool: call.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let food_name = args.food_name.trim();
        if food_name.is_empty() {
            return Ok(ToolOutcome::error(&call.id, "food_name must not be empty"));
        }

        let facts = FoodNutrition {
            name: food_name.to_string(),
            calories: args.nutrition.calories,
            protein: args.nutrition.protein,
            carbs: args.nutrition.carbs,
            fat: args.nutrition.fat,
            fiber: args.nutrition.fiber,
            sugars: args.nutrition.sugars,
            sodium: args.nutrition.sodium,
        };

        let layout = match args.serving_size {
            Some(serving) => LabelLayout::with_serving(serving, 1),
            None => LabelLayout::default(),
        };

        let label = self.renderer.render(food_name, &facts, &layout);
        let artifact_name = format!(
            "{}_{}.{}",
            safe_name(food_name),
            Uuid::new_v4().simple(),
            self.renderer.extension()
        );
        let locator = self
            .artifacts
            .store(&artifact_name, &label, "label")
            .await?;

        info!(food = %food_name, %locator, "Label generated");

        Ok(ToolOutcome::success(
            &call.id,
            serde_json::json!({
                "path": locator,
                "label": label,
            })
            .to_string(),
        )
        .with_artifact(&locator))
    }
}

/// Collapse a food name into a filename-safe prefix.
fn safe_name(name: &str) -> String {
    name.chars()
        .take(MAX_NAME_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
