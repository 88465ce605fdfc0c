//! Response reconciliation
//!
//! Turns raw model output into a [`StructuredAnswer`]. Parsing tries an ordered
//! list of strategies; the first one that applies decides the outcome. A strategy
//! that applies but cannot produce a JSON object degrades to the raw text, never
//! to an error. Parsed suggestions are then enriched with image URLs from the
//! retrieved menu documents.

use super::retriever::RetrievedDocument;
use crate::metrics;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

fn fenced_json_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)[ \t]*\r?\n(.*?)\r?\n[ \t]*```")
            .expect("fenced json pattern is valid")
    })
}

/// A dish the assistant recommends
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,

    #[serde(
        default,
        rename = "imageUrl",
        alias = "image_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<String>,

    /// Fields the model produced that we do not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Suggestion {
    fn from_object(mut object: Map<String, Value>) -> Self {
        let name = take_string(&mut object, &["name"]).unwrap_or_default();
        let description = take_string(&mut object, &["description"]);
        let price = match object.remove("price") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Null) | None => None,
            Some(other) => {
                object.insert("price".to_string(), other);
                None
            }
        };
        let image_url = take_string(&mut object, &["imageUrl", "image_url"]);
        Self {
            name,
            description,
            price,
            image_url,
            extra: object,
        }
    }

    fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Canonical answer shape returned to clients and persisted as message content
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<Suggestion>>,

    #[serde(
        default,
        rename = "followUp",
        alias = "follow_up",
        skip_serializing_if = "Option::is_none"
    )]
    pub follow_up: Option<String>,

    /// Fields the model produced that we do not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StructuredAnswer {
    /// An answer carrying only free text
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Lenient conversion from a parsed JSON object.
    ///
    /// Unknown fields are kept in `extra`; a `suggestions` value that is not a
    /// list is kept there verbatim too.
    pub fn from_object(mut object: Map<String, Value>) -> Self {
        let message = match object.remove("message") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let suggestions = match object.remove("suggestions") {
            Some(Value::Array(items)) => Some(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(map) => Some(Suggestion::from_object(map)),
                        other => {
                            debug!(entry = %other, "Dropping non-object suggestion");
                            None
                        }
                    })
                    .collect(),
            ),
            Some(Value::Null) | None => None,
            Some(other) => {
                object.insert("suggestions".to_string(), other);
                None
            }
        };
        let follow_up = take_string(&mut object, &["followUp", "follow_up"]);
        Self {
            message,
            suggestions,
            follow_up,
            extra: object,
        }
    }
}

fn take_string(object: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        match object.remove(*key) {
            Some(Value::String(s)) => return Some(s),
            Some(Value::Null) | None => continue,
            Some(other) => {
                object.insert(key.to_string(), other);
            }
        }
    }
    None
}

/// Result of applying one parse strategy
#[derive(Debug)]
pub enum ParseAttempt {
    /// The strategy does not recognise this output
    NotApplicable,
    /// Output recognised and parsed into a JSON object
    Parsed(Map<String, Value>),
    /// Output recognised but not a valid JSON object
    Failed(String),
}

/// How the raw model output was interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    FencedJson,
    BareObject,
    PlainText,
}

impl ParseStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStrategy::FencedJson => "fenced_json",
            ParseStrategy::BareObject => "bare_object",
            ParseStrategy::PlainText => "plain_text",
        }
    }

    /// Strategies in the order they are tried
    pub fn ordered() -> [ParseStrategy; 3] {
        [
            ParseStrategy::FencedJson,
            ParseStrategy::BareObject,
            ParseStrategy::PlainText,
        ]
    }

    pub fn attempt(&self, raw: &str) -> ParseAttempt {
        match self {
            ParseStrategy::FencedJson => match fenced_json_pattern().captures(raw) {
                Some(caps) => parse_object(&caps[1]),
                None => ParseAttempt::NotApplicable,
            },
            ParseStrategy::BareObject => {
                let trimmed = raw.trim();
                if trimmed.starts_with('{') && trimmed.ends_with('}') {
                    parse_object(trimmed)
                } else {
                    ParseAttempt::NotApplicable
                }
            }
            ParseStrategy::PlainText => ParseAttempt::NotApplicable,
        }
    }
}

fn parse_object(text: &str) -> ParseAttempt {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => ParseAttempt::Parsed(map),
        Ok(other) => ParseAttempt::Failed(format!("expected a JSON object, got {}", kind_of(&other))),
        Err(e) => ParseAttempt::Failed(e.to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Reconciled answer plus the strategy that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub answer: StructuredAnswer,
    pub strategy: ParseStrategy,
    pub enriched: usize,
}

/// Parses model output and enriches suggestions from retrieved documents
#[derive(Debug, Clone)]
pub struct ResponseReconciler {
    strategies: Vec<ParseStrategy>,
}

impl Default for ResponseReconciler {
    fn default() -> Self {
        Self {
            strategies: ParseStrategy::ordered().to_vec(),
        }
    }
}

impl ResponseReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret raw text without enrichment
    pub fn parse(&self, raw: &str) -> (StructuredAnswer, ParseStrategy) {
        for strategy in &self.strategies {
            match strategy.attempt(raw) {
                ParseAttempt::NotApplicable => continue,
                ParseAttempt::Parsed(object) => {
                    return (StructuredAnswer::from_object(object), *strategy);
                }
                ParseAttempt::Failed(reason) => {
                    warn!(
                        strategy = strategy.as_str(),
                        error = %reason,
                        "Model output looked like JSON but did not parse, returning raw text"
                    );
                    return (StructuredAnswer::plain(raw), ParseStrategy::PlainText);
                }
            }
        }
        (StructuredAnswer::plain(raw), ParseStrategy::PlainText)
    }

    /// Parse then enrich; never fails
    pub fn reconcile(&self, raw: &str, documents: &[RetrievedDocument]) -> Reconciled {
        let (mut answer, strategy) = self.parse(raw);
        let enriched = enrich_suggestions(&mut answer, documents);

        metrics::record_parse(strategy.as_str());
        metrics::record_enrichment(enriched);
        debug!(
            strategy = strategy.as_str(),
            suggestions = answer.suggestions.as_ref().map_or(0, Vec::len),
            enriched,
            "Response reconciled"
        );

        Reconciled {
            answer,
            strategy,
            enriched,
        }
    }
}

/// Fill missing suggestion images from documents whose dish name matches.
///
/// Names compare case-insensitively and exactly; the first matching document
/// decides. Suggestions that already carry an image are left alone, so applying
/// this twice changes nothing. Returns how many suggestions gained an image.
pub fn enrich_suggestions(answer: &mut StructuredAnswer, documents: &[RetrievedDocument]) -> usize {
    let Some(suggestions) = answer.suggestions.as_mut() else {
        return 0;
    };

    let mut enriched = 0;
    for suggestion in suggestions.iter_mut() {
        if suggestion.has_image() || suggestion.name.is_empty() {
            continue;
        }
        let wanted = suggestion.name.to_lowercase();
        let matched = documents
            .iter()
            .find(|doc| doc.dish_name().is_some_and(|name| name.to_lowercase() == wanted));

        if let Some(url) = matched.and_then(RetrievedDocument::image_url) {
            suggestion.image_url = Some(url.to_string());
            enriched += 1;
        }
    }
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(dish: &str, image: Option<&str>) -> RetrievedDocument {
        let mut metadata = Map::new();
        metadata.insert("dish_name".into(), json!(dish));
        if let Some(url) = image {
            metadata.insert("image_url".into(), json!(url));
        }
        RetrievedDocument {
            content: format!("{} description", dish),
            metadata,
        }
    }

    #[test]
    fn test_fenced_json_is_parsed() {
        let raw = "Here you go:\n```json\n{\"message\": \"Try these\", \"suggestions\": [{\"name\": \"Paneer Tikka\"}]}\n```\nEnjoy!";
        let (answer, strategy) = ResponseReconciler::new().parse(raw);
        assert_eq!(strategy, ParseStrategy::FencedJson);
        assert_eq!(answer.message, "Try these");
        assert_eq!(answer.suggestions.unwrap()[0].name, "Paneer Tikka");
    }

    #[test]
    fn test_bare_object_is_parsed() {
        let raw = "  {\"message\": \"Hi\", \"followUp\": \"Anything else?\"}  ";
        let (answer, strategy) = ResponseReconciler::new().parse(raw);
        assert_eq!(strategy, ParseStrategy::BareObject);
        assert_eq!(answer.follow_up.as_deref(), Some("Anything else?"));
    }

    #[test]
    fn test_plain_text_passes_through() {
        let raw = "We are open until 10pm.";
        let (answer, strategy) = ResponseReconciler::new().parse(raw);
        assert_eq!(strategy, ParseStrategy::PlainText);
        assert_eq!(answer, StructuredAnswer::plain(raw));
    }

    #[test]
    fn test_invalid_json_falls_back_to_raw_text() {
        for raw in ["```json\n{\"message\": \n```", "{not json}", "```json\n[1, 2]\n```"] {
            let (answer, strategy) = ResponseReconciler::new().parse(raw);
            assert_eq!(strategy, ParseStrategy::PlainText);
            assert_eq!(answer.message, raw);
            assert!(answer.suggestions.is_none());
        }
    }

    #[test]
    fn test_extra_fields_preserved() {
        let raw = r#"{"message": "ok", "mood": "cheerful", "suggestions": [{"name": "Dal", "spice": 2, "price": 9.5}]}"#;
        let (answer, _) = ResponseReconciler::new().parse(raw);
        assert_eq!(answer.extra["mood"], "cheerful");
        let suggestion = &answer.suggestions.as_ref().unwrap()[0];
        assert_eq!(suggestion.extra["spice"], 2);
        assert_eq!(suggestion.price.as_deref(), Some("9.5"));

        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["mood"], "cheerful");
        assert_eq!(json["suggestions"][0]["spice"], 2);
    }

    #[test]
    fn test_non_list_suggestions_kept_verbatim() {
        let raw = r#"{"message": "ok", "suggestions": "none today"}"#;
        let (answer, _) = ResponseReconciler::new().parse(raw);
        assert!(answer.suggestions.is_none());
        assert_eq!(answer.extra["suggestions"], "none today");
    }

    #[test]
    fn test_enrichment_matches_case_insensitively() {
        let raw = r#"{"message": "Try", "suggestions": [{"name": "paneer tikka"}, {"name": "Naan"}]}"#;
        let docs = vec![
            doc("Butter Chicken", Some("https://img/bc.jpg")),
            doc("Paneer Tikka", Some("https://img/pt.jpg")),
        ];
        let reconciled = ResponseReconciler::new().reconcile(raw, &docs);
        let suggestions = reconciled.answer.suggestions.unwrap();
        assert_eq!(suggestions[0].image_url.as_deref(), Some("https://img/pt.jpg"));
        assert_eq!(suggestions[1].image_url, None);
        assert_eq!(reconciled.enriched, 1);
    }

    #[test]
    fn test_enrichment_requires_exact_name() {
        let mut answer = StructuredAnswer {
            suggestions: Some(vec![Suggestion {
                name: "Paneer".into(),
                ..Suggestion::default()
            }]),
            ..StructuredAnswer::plain("x")
        };
        let enriched = enrich_suggestions(&mut answer, &[doc("Paneer Tikka", Some("u"))]);
        assert_eq!(enriched, 0);
        assert!(answer.suggestions.unwrap()[0].image_url.is_none());
    }

    #[test]
    fn test_enrichment_keeps_existing_image_and_is_idempotent() {
        let docs = vec![doc("Dal", Some("https://img/dal-new.jpg")), doc("Rice", Some("https://img/rice.jpg"))];
        let mut answer = StructuredAnswer {
            suggestions: Some(vec![
                Suggestion {
                    name: "Dal".into(),
                    image_url: Some("https://img/dal-old.jpg".into()),
                    ..Suggestion::default()
                },
                Suggestion {
                    name: "RICE".into(),
                    ..Suggestion::default()
                },
            ]),
            ..StructuredAnswer::plain("x")
        };

        assert_eq!(enrich_suggestions(&mut answer, &docs), 1);
        let once = answer.clone();
        assert_eq!(enrich_suggestions(&mut answer, &docs), 0);
        assert_eq!(answer, once);

        let suggestions = answer.suggestions.unwrap();
        assert_eq!(suggestions[0].image_url.as_deref(), Some("https://img/dal-old.jpg"));
        assert_eq!(suggestions[1].image_url.as_deref(), Some("https://img/rice.jpg"));
    }

    #[test]
    fn test_first_matching_document_wins() {
        let mut answer = StructuredAnswer {
            suggestions: Some(vec![Suggestion {
                name: "Dal".into(),
                ..Suggestion::default()
            }]),
            ..StructuredAnswer::plain("x")
        };
        enrich_suggestions(&mut answer, &[doc("dal", None), doc("Dal", Some("second"))]);
        assert!(answer.suggestions.unwrap()[0].image_url.is_none());
    }

    #[test]
    fn test_image_url_accepts_both_spellings() {
        let suggestion: Suggestion =
            serde_json::from_value(json!({"name": "Dal", "image_url": "u"})).unwrap();
        assert_eq!(suggestion.image_url.as_deref(), Some("u"));
        assert_eq!(serde_json::to_value(&suggestion).unwrap()["imageUrl"], "u");
    }
}
