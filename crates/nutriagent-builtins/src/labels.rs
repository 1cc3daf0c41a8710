//! Nutrition-facts label rendering.

use crate::food_data::FoodNutrition;

const LABEL_WIDTH: usize = 40;

/// One row of the label's nutrient table.
struct NutrientRow {
    key: &'static str,
    label: &'static str,
    unit: &'static str,
    /// FDA daily value for the percentage column. `None` hides the column.
    daily_value: Option<f64>,
    indent: bool,
}

/// FDA nutrient table, top to bottom.
const NUTRIENT_ROWS: [NutrientRow; 6] = [
    NutrientRow {
        key: "fat",
        label: "Total Fat",
        unit: "g",
        daily_value: Some(78.0),
        indent: false,
    },
    NutrientRow {
        key: "sodium",
        label: "Sodium",
        unit: "mg",
        daily_value: Some(2300.0),
        indent: false,
    },
    NutrientRow {
        key: "carbs",
        label: "Total Carbohydrate",
        unit: "g",
        daily_value: Some(275.0),
        indent: false,
    },
    NutrientRow {
        key: "fiber",
        label: "Dietary Fiber",
        unit: "g",
        daily_value: Some(28.0),
        indent: true,
    },
    NutrientRow {
        key: "sugars",
        label: "Total Sugars",
        unit: "g",
        daily_value: None,
        indent: true,
    },
    NutrientRow {
        key: "protein",
        label: "Protein",
        unit: "g",
        daily_value: Some(50.0),
        indent: false,
    },
];

/// Appearance settings for a rendered label.
#[derive(Debug, Clone)]
pub struct LabelLayout {
    /// Serving size line, e.g. "100g".
    pub serving_size: String,
    /// Servings-per-container line.
    pub servings_per_container: u32,
    /// Whether to print the % daily value column.
    pub show_daily_values: bool,
    /// Heading at the top of the label.
    pub title: String,
}

impl Default for LabelLayout {
    fn default() -> Self {
        Self {
            serving_size: "100g".to_string(),
            servings_per_container: 1,
            show_daily_values: true,
            title: "Nutrition Facts".to_string(),
        }
    }
}

impl LabelLayout {
    /// Layout with a custom serving size.
    pub fn with_serving(serving_size: impl Into<String>, servings: u32) -> Self {
        Self {
            serving_size: serving_size.into(),
            servings_per_container: servings,
            ..Self::default()
        }
    }
}

/// Renders nutrition facts into a label document.
pub trait LabelRenderer: Send + Sync {
    /// Render a label for `food_name` from per-serving `facts`.
    fn render(&self, food_name: &str, facts: &FoodNutrition, layout: &LabelLayout) -> String;

    /// File extension for artifacts produced by this renderer.
    fn extension(&self) -> &'static str {
        "txt"
    }
}

/// Monospace text label in the FDA nutrition-facts layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLabelRenderer;

impl LabelRenderer for TextLabelRenderer {
    fn render(&self, food_name: &str, facts: &FoodNutrition, layout: &LabelLayout) -> String {
        let heavy = "═".repeat(LABEL_WIDTH);
        let light = "─".repeat(LABEL_WIDTH);

        let mut lines = vec![
            heavy.clone(),
            format!("  {}", layout.title),
            format!("  {food_name}"),
            heavy.clone(),
            String::new(),
            format!("Serving Size: {}", layout.serving_size),
            format!("Servings Per Container: {}", layout.servings_per_container),
            light,
            String::new(),
            format!("Calories ............. {:.0}", facts.calories),
            String::new(),
        ];

        for row in &NUTRIENT_ROWS {
            let value = facts.nutrient(row.key).unwrap_or(0.0);
            let indent = if row.indent { "  " } else { "" };
            let dv = match row.daily_value {
                Some(dv) if layout.show_daily_values => {
                    format!("  {:.0}%", value / dv * 100.0)
                }
                _ => String::new(),
            };
            let dots = ".".repeat(20usize.saturating_sub(row.label.len() + indent.len()));
            lines.push(format!(
                "{indent}{} {dots} {value:.1}{}{dv}",
                row.label, row.unit
            ));
        }

        lines.push(String::new());
        if layout.show_daily_values {
            lines.push("* Percent Daily Values based on a 2,000 calorie diet.".to_string());
        }
        lines.push(heavy);

        lines.join("\n")
    }
}
