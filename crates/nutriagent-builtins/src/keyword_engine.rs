//! Deterministic keyword-driven reasoning engine.
//!
//! Routes user messages to the built-in nutrition tools by keyword and
//! phrases canned answers from the folded tool results. It lets the whole
//! service run end to end without a model credential; a real model client
//! is a drop-in [`ReasoningEngine`] replacement.

use async_trait::async_trait;
use nutriagent_agent::{Reasoning, ReasoningEngine};
use nutriagent_core::{AgentResult, Message, Role, ToolCall};
use nutriagent_tools::ToolDescriptor;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

const STREAM_BUFFER: usize = 16;

/// Keyword-matching [`ReasoningEngine`].
///
/// Chains tool calls across reasoning steps: a label request becomes
/// `search_foods`, then `get_nutrition`, then `generate_label`, each step
/// driven by the tool results already folded into the history.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordEngine;

impl KeywordEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }

    fn plan(&self, history: &[Message]) -> Reasoning {
        let Some(user_index) = history.iter().rposition(|m| m.role == Role::User) else {
            return final_text(HELP_TEXT);
        };
        let intent = Intent::from_text(&history[user_index].content);

        // Tool results folded in since the user spoke drive the next hop.
        let last_record = history[user_index + 1..]
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| ToolRecord::parse(&m.content))
            .last();

        match last_record {
            Some(record) => self.continue_chain(&intent, &record),
            None => self.start_chain(&intent),
        }
    }

    fn start_chain(&self, intent: &Intent) -> Reasoning {
        if intent.wants_compare {
            if intent.fdc_ids.len() >= 2 {
                let ids = intent
                    .fdc_ids
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                return tool_request(
                    "compare_nutrients",
                    serde_json::json!({
                        "fdc_ids": ids,
                        "nutrient": intent.nutrient.unwrap_or("calories"),
                    }),
                );
            }
            return final_text(
                "To compare foods I need their FDC ids. Search each food first \
                 (for example \"search chicken breast\") and then ask me to \
                 compare the ids.",
            );
        }

        if !intent.ingredients.is_empty()
            && (intent.mentions_recipe || intent.ingredients.len() >= 2)
        {
            let ingredients: Vec<Value> = intent
                .ingredients
                .iter()
                .map(|(name, grams)| serde_json::json!({ "name": name, "grams": grams }))
                .collect();
            return tool_request(
                "calculate_recipe_nutrition",
                serde_json::json!({ "ingredients": ingredients }),
            );
        }

        if let [id] = intent.fdc_ids[..] {
            return tool_request("get_nutrition", serde_json::json!({ "fdc_id": id }));
        }

        if intent.subject.is_empty() {
            return final_text(HELP_TEXT);
        }
        tool_request(
            "search_foods",
            serde_json::json!({ "query": intent.subject }),
        )
    }

    fn continue_chain(&self, intent: &Intent, record: &ToolRecord) -> Reasoning {
        match record.tool.as_str() {
            "search_foods" => self.after_search(intent, record),
            "get_nutrition" => self.after_nutrition(intent, record),
            "generate_label" => self.after_label(record),
            "compare_nutrients" => self.after_compare(record),
            "calculate_recipe_nutrition" => self.after_recipe(record),
            _ => final_text(&record.result_text()),
        }
    }

    fn after_search(&self, intent: &Intent, record: &ToolRecord) -> Reasoning {
        let results = record.result["results"].as_array().cloned().unwrap_or_default();
        if record.is_error || results.is_empty() {
            return final_text(format!(
                "I couldn't find any foods matching \"{}\". Try a simpler \
                 name, like \"oats\" or \"chicken breast\".",
                record.result["query"].as_str().unwrap_or(&intent.subject)
            ));
        }

        if intent.wants_label || intent.wants_facts {
            if let Some(id) = results[0]["fdc_id"].as_u64() {
                return tool_request("get_nutrition", serde_json::json!({ "fdc_id": id }));
            }
        }

        let listing = results
            .iter()
            .take(3)
            .filter_map(|r| {
                let desc = r["description"].as_str()?;
                let id = r["fdc_id"].as_u64()?;
                Some(format!("{desc} (FDC {id})"))
            })
            .collect::<Vec<_>>()
            .join("; ");
        final_text(format!(
            "I found these foods: {listing}. Ask for nutrition facts or a \
             label for any of them."
        ))
    }

    fn after_nutrition(&self, intent: &Intent, record: &ToolRecord) -> Reasoning {
        if record.is_error {
            return final_text(
                "I couldn't retrieve nutrition data for that food. Double-check \
                 the FDC id from the search results.",
            );
        }

        let name = record.result["description"].as_str().unwrap_or("that food");
        let nutrients = &record.result["nutrients"];

        if intent.wants_label {
            return tool_request(
                "generate_label",
                serde_json::json!({
                    "food_name": name,
                    "nutrition": {
                        "calories": nutrients["calories"].as_f64().unwrap_or(0.0),
                        "protein": nutrients["protein_g"].as_f64().unwrap_or(0.0),
                        "carbs": nutrients["carbs_g"].as_f64().unwrap_or(0.0),
                        "fat": nutrients["fat_g"].as_f64().unwrap_or(0.0),
                        "fiber": nutrients["fiber_g"].as_f64().unwrap_or(0.0),
                        "sugars": nutrients["sugars_g"].as_f64().unwrap_or(0.0),
                        "sodium": nutrients["sodium_mg"].as_f64().unwrap_or(0.0),
                    },
                }),
            );
        }

        final_text(format!(
            "{name} has {:.0} kcal, {:.1} g protein, {:.1} g carbs and \
             {:.1} g fat per 100g.",
            nutrients["calories"].as_f64().unwrap_or(0.0),
            nutrients["protein_g"].as_f64().unwrap_or(0.0),
            nutrients["carbs_g"].as_f64().unwrap_or(0.0),
            nutrients["fat_g"].as_f64().unwrap_or(0.0),
        ))
    }

    fn after_label(&self, record: &ToolRecord) -> Reasoning {
        if record.is_error {
            return final_text("Label generation failed. Please try again.");
        }
        let path = record.result["path"].as_str().unwrap_or_default();
        let label = record.result["label"].as_str().unwrap_or_default();
        final_text(format!(
            "Here is the nutrition label:\n\n{label}\n\nSaved at {path}."
        ))
    }

    fn after_compare(&self, record: &ToolRecord) -> Reasoning {
        if record.is_error {
            return final_text(format!("I couldn't run that comparison: {}", record.result_text()));
        }
        let nutrient = record.result["nutrient"].as_str().unwrap_or("nutrient");
        let unit = record.result["unit"].as_str().unwrap_or("");
        let rows = record.result["comparison"].as_array().cloned().unwrap_or_default();
        let ranking = rows
            .iter()
            .filter_map(|r| {
                let food = r["food"].as_str()?;
                let value = r["value"].as_f64()?;
                Some(format!("{food}: {value:.1}{unit}"))
            })
            .collect::<Vec<_>>()
            .join("; ");
        final_text(format!("Per 100g, ranked by {nutrient}: {ranking}."))
    }

    fn after_recipe(&self, record: &ToolRecord) -> Reasoning {
        if record.is_error {
            return final_text(format!(
                "I couldn't total that recipe: {}",
                record.result_text()
            ));
        }
        let totals = &record.result["recipe_totals"];
        final_text(format!(
            "Your recipe totals {:.0} kcal, {:.1} g protein, {:.1} g carbs \
             and {:.1} g fat.",
            totals["calories"].as_f64().unwrap_or(0.0),
            totals["protein"].as_f64().unwrap_or(0.0),
            totals["carbs"].as_f64().unwrap_or(0.0),
            totals["fat"].as_f64().unwrap_or(0.0),
        ))
    }
}

#[async_trait]
impl ReasoningEngine for KeywordEngine {
    async fn reason(
        &self,
        _system_prompt: Option<&str>,
        history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<Reasoning> {
        Ok(self.plan(history))
    }

    async fn reason_stream(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> AgentResult<(mpsc::Receiver<String>, JoinHandle<AgentResult<Reasoning>>)> {
        let reasoning = self.reason(system_prompt, history, tools).await?;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let handle = tokio::spawn(async move {
            if let Reasoning::Final { text } = &reasoning {
                let chunks: Vec<String> = text.split_inclusive(' ').map(String::from).collect();
                for chunk in chunks {
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }
            }
            Ok(reasoning)
        });
        Ok((rx, handle))
    }
}

const HELP_TEXT: &str = "I can search foods, report nutrition facts, compare \
nutrients, total a recipe, and generate nutrition labels. Try \"nutrition \
for oats\" or \"make a label for greek yogurt\".";

fn final_text(text: impl Into<String>) -> Reasoning {
    Reasoning::Final { text: text.into() }
}

fn tool_request(name: &str, arguments: Value) -> Reasoning {
    Reasoning::ToolRequests(vec![ToolCall {
        id: format!("call_{}", Uuid::new_v4().simple()),
        name: name.to_string(),
        arguments,
    }])
}

/// A folded tool message, parsed back out of the history.
struct ToolRecord {
    tool: String,
    result: Value,
    is_error: bool,
}

impl ToolRecord {
    fn parse(content: &str) -> Option<Self> {
        let folded: Value = serde_json::from_str(content).ok()?;
        let tool = folded["tool"].as_str()?.to_string();
        let raw = folded["result"].as_str().unwrap_or_default();
        let result = serde_json::from_str(raw).unwrap_or(Value::String(raw.to_string()));
        Some(Self {
            tool,
            result,
            is_error: folded["is_error"].as_bool().unwrap_or(false),
        })
    }

    fn result_text(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// What the user appears to be asking for.
struct Intent {
    wants_label: bool,
    wants_compare: bool,
    wants_facts: bool,
    mentions_recipe: bool,
    nutrient: Option<&'static str>,
    fdc_ids: Vec<u64>,
    ingredients: Vec<(String, f64)>,
    subject: String,
}

impl Intent {
    fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        let tokens = tokenize(&lower);

        let wants_label = lower.contains("label");
        let wants_compare =
            lower.contains("compare") || lower.contains(" vs ") || lower.contains("versus");
        let mentions_recipe = lower.contains("recipe");
        let wants_facts = FACT_WORDS.iter().any(|w| lower.contains(w));

        let nutrient = NUTRIENT_STEMS
            .iter()
            .find(|(stem, _)| lower.contains(stem))
            .map(|(_, key)| *key);

        let ingredients = parse_ingredients(&tokens);
        let fdc_ids = extract_ids(&tokens);
        let subject = subject_of(&tokens);

        Self {
            wants_label,
            wants_compare,
            wants_facts,
            mentions_recipe,
            nutrient,
            fdc_ids,
            ingredients,
            subject,
        }
    }
}

const FACT_WORDS: [&str; 8] = [
    "nutrition", "nutrient", "calorie", "macro", "protein", "carb", "fiber", "sodium",
];

/// Stem → nutrient key, checked in order. Stems cover plural forms.
const NUTRIENT_STEMS: [(&str, &str); 7] = [
    ("calorie", "calories"),
    ("protein", "protein"),
    ("carb", "carbs"),
    ("fiber", "fiber"),
    ("sugar", "sugars"),
    ("sodium", "sodium"),
    ("fat", "fat"),
];

fn tokenize(lower: &str) -> Vec<String> {
    lower
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Pull `<grams>g <name>` style ingredients out of the token stream, e.g.
/// "200g rice and 100 g chicken breast".
fn parse_ingredients(tokens: &[String]) -> Vec<(String, f64)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let (grams, mut next) = match gram_amount(tokens, i) {
            Some(parsed) => parsed,
            None => {
                i += 1;
                continue;
            }
        };

        let mut name_words = Vec::new();
        while next < tokens.len() {
            let word = &tokens[next];
            if word == "of" && name_words.is_empty() {
                next += 1;
                continue;
            }
            if INGREDIENT_BREAKS.contains(&word.as_str())
                || word.chars().next().is_some_and(|c| c.is_ascii_digit())
            {
                break;
            }
            name_words.push(word.clone());
            next += 1;
        }

        if !name_words.is_empty() {
            out.push((name_words.join(" "), grams));
        }
        i = next.max(i + 1);
    }
    out
}

const INGREDIENT_BREAKS: [&str; 4] = ["and", "plus", "with", "then"];

/// `("200g", i)` or `("200", "g", i)` → `(200.0, index after the unit)`.
fn gram_amount(tokens: &[String], i: usize) -> Option<(f64, usize)> {
    let token = &tokens[i];
    if let Some(number) = token.strip_suffix("grams").or_else(|| token.strip_suffix('g')) {
        if !number.is_empty() {
            if let Ok(grams) = number.parse::<f64>() {
                return Some((grams, i + 1));
            }
        }
    }
    if token.parse::<f64>().is_ok()
        && matches!(tokens.get(i + 1).map(String::as_str), Some("g" | "gram" | "grams"))
    {
        if let Ok(grams) = token.parse::<f64>() {
            return Some((grams, i + 2));
        }
    }
    None
}

/// Bare numbers of FDC-id length that are not gram amounts.
fn extract_ids(tokens: &[String]) -> Vec<u64> {
    let mut ids = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.len() < 4 || !token.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if matches!(tokens.get(i + 1).map(String::as_str), Some("g" | "gram" | "grams")) {
            continue;
        }
        if let Ok(id) = token.parse::<u64>() {
            ids.push(id);
        }
    }
    ids
}

/// Strip question scaffolding and intent words, keeping the food name.
fn subject_of(tokens: &[String]) -> String {
    tokens
        .iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| gram_token(t.as_str()).is_none())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

fn gram_token(token: &str) -> Option<f64> {
    let number = token.strip_suffix("grams").or_else(|| token.strip_suffix('g'))?;
    number.parse::<f64>().ok()
}

const STOPWORDS: [&str; 48] = [
    "what", "whats", "what's", "is", "are", "the", "a", "an", "in", "of", "for", "me", "i",
    "how", "many", "much", "does", "do", "have", "has", "about", "tell", "show", "find",
    "search", "please", "help", "hello", "can", "you", "give", "get", "look", "up", "nutrition",
    "nutritional", "nutrients", "nutrient", "facts", "info", "calories", "calorie", "label",
    "generate", "make", "create", "my", "recipe",
];
