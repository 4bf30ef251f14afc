// SPDX-FileCopyrightText: 2026 Larder Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic request complexity classification.
//!
//! Scores a request from its length, keyword groups, and structural
//! patterns. No model call, no I/O.
//!
//! Every signal only ever adds to the score, and matching is done on
//! substrings of a per-character lowercase fold. Appending text to a query
//! can therefore never lower its level.

use larder_core::{ChatMessage, ComplexityLevel, Role};

/// Result of scoring one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityAssessment {
    pub level: ComplexityLevel,
    /// Normalized score in `[0, 1]`.
    pub score: f32,
    /// Length bucket plus every keyword group and pattern that fired.
    pub matched_features: Vec<String>,
    /// Characters in the scored query.
    pub query_length: usize,
}

/// A keyword group and the fixed amount it contributes when any member matches.
struct KeywordGroup {
    name: &'static str,
    weight: f32,
    terms: &'static [&'static str],
}

const KEYWORD_GROUPS: [KeywordGroup; 4] = [
    KeywordGroup {
        name: "simple",
        weight: 0.05,
        terms: &[
            "hello",
            "thanks",
            "thank you",
            "good morning",
            "what time",
            "cześć",
            "dzięki",
            "dziękuję",
            "dzień dobry",
        ],
    },
    KeywordGroup {
        name: "standard",
        weight: 0.15,
        terms: &[
            "recipe",
            "shopping list",
            "pantry",
            "how much",
            "how many",
            "suggest",
            "recommend",
            "przepis",
            "lista zakupów",
            "spiżarni",
            "poleć",
        ],
    },
    KeywordGroup {
        name: "complex",
        weight: 0.3,
        terms: &[
            "analyze",
            "analyse",
            "compare",
            "explain",
            "design",
            "implement",
            "step by step",
            "in depth",
            "trade-off",
            "optimize",
            "algorithm",
            "meal plan",
            "wyjaśnij",
            "porównaj",
            "przeanalizuj",
            "uzasadnij",
            "zaplanuj",
            "krok po kroku",
        ],
    },
    KeywordGroup {
        name: "critical",
        weight: 0.5,
        terms: &[
            "urgent",
            "critical",
            "emergency",
            "allergy",
            "allergic",
            "anaphylaxis",
            "food poisoning",
            "pilne",
            "krytyczn",
            "alergi",
            "zatrucie",
        ],
    },
];

const CODE_MARKERS: &[&str] = &["```", "fn ", "def ", "{", "};", "=>"];

/// Inclusive lower score bounds for Standard, Complex, and Critical.
const DEFAULT_THRESHOLDS: [f32; 3] = [0.25, 0.5, 0.75];

/// Maps requests to a [`ComplexityLevel`].
#[derive(Debug, Clone)]
pub struct ComplexityClassifier {
    thresholds: [f32; 3],
}

impl ComplexityClassifier {
    pub fn new() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS,
        }
    }

    /// Classifier with custom lower bounds for Standard, Complex, and
    /// Critical. Bounds are sorted so the level mapping stays monotonic.
    pub fn with_thresholds(mut thresholds: [f32; 3]) -> Self {
        thresholds.sort_by(f32::total_cmp);
        Self { thresholds }
    }

    /// Scores the latest user message of an assembled conversation.
    ///
    /// System prompts longer than 500 characters add a 0.1 bonus.
    pub fn assess(&self, messages: &[ChatMessage]) -> ComplexityAssessment {
        let query = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let system_len: usize = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.chars().count())
            .sum();

        let mut assessment = self.assess_text(query);
        if system_len > 500 {
            assessment.matched_features.push("long_system_prompt".to_string());
            assessment.score = (assessment.score + 0.1).min(1.0);
            assessment.level = self.level_for(assessment.score);
        }
        assessment
    }

    /// Scores a bare query text.
    pub fn assess_text(&self, query: &str) -> ComplexityAssessment {
        let folded: String = query.chars().flat_map(char::to_lowercase).collect();
        let query_length = query.chars().count();
        let mut features = Vec::new();
        let mut raw = 0.0_f32;

        let (bucket, length_weight) = match query_length {
            0..40 => ("length:short", 0.05),
            40..160 => ("length:medium", 0.2),
            _ => ("length:long", 0.35),
        };
        features.push(bucket.to_string());
        raw += length_weight;

        for group in &KEYWORD_GROUPS {
            let hits: Vec<&str> = group
                .terms
                .iter()
                .copied()
                .filter(|term| folded.contains(term))
                .collect();
            if !hits.is_empty() {
                features.push(format!("keywords:{}({})", group.name, hits.join(", ")));
                raw += group.weight;
            }
        }

        if CODE_MARKERS.iter().any(|marker| folded.contains(marker)) {
            features.push("code_syntax".to_string());
            raw += 0.1;
        }
        if folded.matches('\n').count() > 3 {
            features.push("multi_line".to_string());
            raw += 0.1;
        }
        if has_decimal_number(&folded) {
            features.push("technical_numbers".to_string());
            raw += 0.05;
        }

        let score = raw.min(1.0);
        ComplexityAssessment {
            level: self.level_for(score),
            score,
            matched_features: features,
            query_length,
        }
    }

    fn level_for(&self, score: f32) -> ComplexityLevel {
        let [standard, complex, critical] = self.thresholds;
        if score >= critical {
            ComplexityLevel::Critical
        } else if score >= complex {
            ComplexityLevel::Complex
        } else if score >= standard {
            ComplexityLevel::Standard
        } else {
            ComplexityLevel::Simple
        }
    }
}

impl Default for ComplexityClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// A digit, a `.` or `,`, then another digit ("2.5 kg", "0,75 l").
fn has_decimal_number(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(3).any(|w| {
        w[0].is_ascii_digit() && (w[1] == '.' || w[1] == ',') && w[2].is_ascii_digit()
    })
}
