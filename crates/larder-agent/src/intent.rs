// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword-based intent classification.

use async_trait::async_trait;
use larder_core::{Intent, IntentClassifier, LarderError, SessionContext};
use serde_json::{Value, json};

struct IntentRule {
    intent_type: &'static str,
    terms: &'static [&'static str],
}

/// Checked in order; the first rule with a matching term wins.
const RULES: &[IntentRule] = &[
    IntentRule {
        intent_type: "shopping",
        terms: &[
            "shopping list",
            "lista zakupów",
            "listę zakupów",
            "zakupy",
            "kupić",
            "buy ",
        ],
    },
    IntentRule {
        intent_type: "recipe",
        terms: &[
            "recipe",
            "przepis",
            "ugotować",
            "upiec",
            "how do i cook",
            "how to cook",
            "what can i cook",
            "co mogę zrobić",
        ],
    },
    IntentRule {
        intent_type: "pantry",
        terms: &[
            "pantry",
            "spiżarnia",
            "spiżarni",
            "lodówce",
            "fridge",
            "expire",
            "expiring",
            "termin ważności",
            "produkty",
        ],
    },
    IntentRule {
        intent_type: "weather",
        terms: &["weather", "pogoda", "pogody", "forecast", "prognoza"],
    },
];

/// Default intent type when no rule matches.
pub const GENERAL_INTENT: &str = "general";

/// Maps food-domain keywords to intent types.
///
/// Matched terms are returned as the `keywords` entity. A short follow-up
/// ("and for four people?") inherits the intent of the previous turn.
#[derive(Debug, Clone, Default)]
pub struct KeywordIntentClassifier;

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classifies `text` without session context.
    pub fn classify_text(&self, text: &str) -> Intent {
        let folded: String = text.chars().flat_map(char::to_lowercase).collect();
        for rule in RULES {
            let matched: Vec<Value> = rule
                .terms
                .iter()
                .filter(|term| folded.contains(*term))
                .map(|term| json!(term.trim()))
                .collect();
            if !matched.is_empty() {
                let mut intent = Intent::new(rule.intent_type);
                intent.entities.insert("keywords".to_string(), Value::Array(matched));
                return intent;
            }
        }
        Intent::new(GENERAL_INTENT)
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, text: &str, context: &SessionContext) -> Result<Intent, LarderError> {
        let intent = self.classify_text(text);
        if intent.intent_type == GENERAL_INTENT && is_follow_up(text) {
            if let Some(last) = context.last_turn() {
                let mut inherited = Intent::new(last.intent.clone());
                inherited.entities.insert("follow_up".to_string(), json!(true));
                return Ok(inherited);
            }
        }
        Ok(intent)
    }
}

fn is_follow_up(text: &str) -> bool {
    let text = text.trim_start().to_lowercase();
    text.split_whitespace().count() <= 5
        && ["and ", "a ", "i ", "what about", "a co z"]
            .iter()
            .any(|lead| text.starts_with(lead))
}
