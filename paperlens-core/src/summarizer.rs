//! Structured per-paper summaries.
//!
//! The model is asked for a flat JSON object with a fixed set of string
//! fields. Its answer is normalized, parsed strictly, and checked against
//! the schema before it becomes a [`PaperRecord`].

use crate::brain::Brain;
use crate::config::SummaryConfig;
use crate::error::SummaryError;
use crate::normalize::normalize;
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Value used when the model reports no data for a field.
pub const NOT_AVAILABLE: &str = "N/A";

/// One successfully summarized paper.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRecord {
    /// Source file name, unique within a run.
    pub paper_name: String,
    /// Analytical fields in schema order.
    pub fields: IndexMap<String, String>,
}

impl PaperRecord {
    pub fn new(paper_name: impl Into<String>, fields: IndexMap<String, String>) -> Self {
        Self {
            paper_name: paper_name.into(),
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Serializes as one flat object: the fields in order, then `paper_name`.
impl Serialize for PaperRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("paper_name", &self.paper_name)?;
        map.end()
    }
}

/// Produces [`PaperRecord`]s from extracted paper text.
pub struct Summarizer {
    brain: Arc<Brain>,
    config: SummaryConfig,
}

impl Summarizer {
    pub fn new(brain: Arc<Brain>, config: SummaryConfig) -> Self {
        Self { brain, config }
    }

    /// Summarize one paper. Every failure mode is reported as a [`SummaryError`].
    pub async fn summarize(
        &self,
        text: &str,
        paper_name: &str,
    ) -> Result<PaperRecord, SummaryError> {
        let body = match self.config.max_input_chars {
            Some(max) if text.len() > max => {
                debug!(
                    paper = %paper_name,
                    original = text.len(),
                    kept = max,
                    "Truncating paper text"
                );
                truncate_str(text, max)
            }
            _ => text,
        };

        let prompt = build_summary_prompt(
            body,
            &self.config.fields,
            self.config.bullet_field.as_deref(),
        );
        let response = self
            .brain
            .complete_text(&prompt, self.config.temperature)
            .await?;

        let fields = parse_summary(
            &response,
            &self.config.fields,
            self.config.bullet_field.as_deref(),
        )
        .inspect_err(|e| {
            warn!(
                paper = %paper_name,
                error = %e,
                raw = %response,
                "Error parsing model JSON"
            );
        })?;

        info!(paper = %paper_name, fields = fields.len(), "Summarized paper");
        Ok(PaperRecord::new(paper_name, fields))
    }
}

/// Build the summary prompt for `text` with the given schema.
pub fn build_summary_prompt(text: &str, fields: &[String], bullet_field: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are an expert academic research analyst. Summarize the following paper in JSON.\n\
         Use full sentences and provide clear, complete explanations. Return JSON strictly as:\n\n{\n",
    );

    let schema: Vec<String> = fields
        .iter()
        .map(|f| format!("    \"{}\": \"...\"", f))
        .collect();
    prompt.push_str(&schema.join(",\n"));
    prompt.push_str("\n}\n\nRules:\n");
    prompt.push_str("- Return only the JSON object, with no markdown code fences or commentary.\n");
    prompt.push_str("- Every value must be a string.\n");
    if let Some(bullet) = bullet_field {
        prompt.push_str(&format!(
            "- Write \"{}\" as short sentences, each starting with \"• \", separated by newlines.\n",
            bullet
        ));
    }
    prompt.push_str(&format!(
        "- Use \"{}\" when the paper does not provide the information.\n",
        NOT_AVAILABLE
    ));

    prompt.push_str("\nPaper text:\n\"\"\"\n");
    prompt.push_str(text);
    prompt.push_str("\n\"\"\"\n");
    prompt
}

/// Parse and validate a model response against `fields`.
///
/// The response is parsed as strict JSON, first after normalization and
/// then, if that fails, as sent. The result must be an object carrying every
/// schema field; unknown keys are dropped. Strings are normalized, other
/// scalars are stringified and `null` becomes `"N/A"`. Only the bullet field
/// may be an array, which is joined one entry per line.
pub fn parse_summary(
    raw: &str,
    fields: &[String],
    bullet_field: Option<&str>,
) -> Result<IndexMap<String, String>, SummaryError> {
    let object = match parse_json(raw)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| (normalize(&key), value))
            .collect::<serde_json::Map<String, Value>>(),
        other => {
            return Err(SummaryError::NotAnObject {
                found: json_kind(&other).to_string(),
            });
        }
    };

    let missing: Vec<String> = fields
        .iter()
        .filter(|f| !object.contains_key(f.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(SummaryError::MissingFields { fields: missing });
    }

    for key in object.keys() {
        if !fields.iter().any(|f| f == key) {
            debug!(key = %key, "Dropping unknown summary key");
        }
    }

    let mut record = IndexMap::with_capacity(fields.len());
    for field in fields {
        let value = &object[field.as_str()];
        let is_bullet = bullet_field == Some(field.as_str());
        record.insert(field.clone(), field_value(field, value, is_bullet)?);
    }
    Ok(record)
}

/// Normalizing first repairs curly-quoted delimiters, but it also turns
/// curly quotes inside string values into bare `"`. Those responses parse
/// fine untouched.
fn parse_json(raw: &str) -> Result<Value, SummaryError> {
    let cleaned = normalize(raw);
    serde_json::from_str(cleaned.trim()).or_else(|first| {
        serde_json::from_str(raw.trim()).map_err(|_| SummaryError::Parse {
            message: first.to_string(),
            raw: raw.to_string(),
        })
    })
}

fn field_value(field: &str, value: &Value, is_bullet: bool) -> Result<String, SummaryError> {
    match value {
        Value::String(s) => Ok(normalize(s)),
        Value::Null => Ok(NOT_AVAILABLE.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(items) if is_bullet => join_bullets(field, items),
        other => Err(SummaryError::InvalidField {
            field: field.to_string(),
            reason: format!("expected a string, found {}", json_kind(other)),
        }),
    }
}

/// Join array entries one per line, stripping bullet markers.
fn join_bullets(field: &str, items: &[Value]) -> Result<String, SummaryError> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let text = match item {
            Value::String(s) => normalize(s),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            other => {
                return Err(SummaryError::InvalidField {
                    field: field.to_string(),
                    reason: format!("array entries must be scalars, found {}", json_kind(other)),
                });
            }
        };
        let stripped = strip_bullet(&text);
        if !stripped.is_empty() {
            lines.push(stripped.to_string());
        }
    }
    Ok(lines.join("\n"))
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '•' | '-' | '*' | '–' | '—'))
        .trim_end()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truncate a string to at most `max` bytes on a char boundary.
fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::config::RetryConfig;
    use crate::error::LlmError;
    use serde_json::json;

    fn schema(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn default_fields() -> Vec<String> {
        SummaryConfig::default().fields
    }

    /// A complete default-schema response with `other_details` set to `bullets`.
    fn full_response(bullets: Value) -> String {
        let mut obj = serde_json::Map::new();
        for field in default_fields() {
            obj.insert(field.clone(), json!(format!("{} text", field)));
        }
        obj.insert("other_details".into(), bullets);
        Value::Object(obj).to_string()
    }

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_bullet_string_kept_verbatim() {
        let raw = full_response(json!("• First.\n• Second."));
        let record = parse_summary(&raw, &default_fields(), Some("other_details")).unwrap();
        assert_eq!(record["other_details"], "• First.\n• Second.");
        assert_eq!(record["year"], "year text");
    }

    #[test]
    fn test_bullet_array_joined_and_stripped() {
        let raw = full_response(json!(["- First.", "Second."]));
        let record = parse_summary(&raw, &default_fields(), Some("other_details")).unwrap();
        assert_eq!(record["other_details"], "First.\nSecond.");
    }

    #[test]
    fn test_bullet_array_strips_bullet_glyphs() {
        let raw = full_response(json!(["• One.", "  * Two.", "", null]));
        let record = parse_summary(&raw, &default_fields(), Some("other_details")).unwrap();
        assert_eq!(record["other_details"], "One.\nTwo.");
    }

    #[test]
    fn test_record_preserves_schema_order() {
        let raw = full_response(json!("x"));
        let record = parse_summary(&raw, &default_fields(), Some("other_details")).unwrap();
        let keys: Vec<String> = record.keys().cloned().collect();
        assert_eq!(keys, default_fields());
    }

    #[test]
    fn test_smart_quotes_are_normalized_before_parsing() {
        let raw = "{\u{201C}title\u{201D}: \u{201C}A \u{2018}new\u{2019} model\u{201D}}";
        let record = parse_summary(raw, &schema(&["title"]), None).unwrap();
        assert_eq!(record["title"], "A 'new' model");
    }

    #[test]
    fn test_curly_quotes_inside_values_survive() {
        let raw = "{\"topics\": \"The \u{201C}market\u{201D} effect\"}";
        let record = parse_summary(raw, &schema(&["topics"]), None).unwrap();
        assert_eq!(record["topics"], "The \"market\" effect");
    }

    #[test]
    fn test_curly_quotes_inside_bullet_array_are_normalized() {
        let raw = "{\"other_details\": [\"\u{2022} Uses \u{201C}nudges\u{201D}.\", \"It\u{2019}s robust.\"]}";
        let record =
            parse_summary(raw, &schema(&["other_details"]), Some("other_details")).unwrap();
        assert_eq!(record["other_details"], "Uses \"nudges\".\nIt's robust.");
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let record = parse_summary("\n  {\"a\": \"b\"}  \n", &schema(&["a"]), None).unwrap();
        assert_eq!(record["a"], "b");
    }

    #[test]
    fn test_markdown_fence_is_a_parse_error() {
        let raw = "```json\n{\"a\": \"b\"}\n```";
        let err = parse_summary(raw, &schema(&["a"]), None).unwrap_err();
        match err {
            SummaryError::Parse { raw: kept, .. } => assert_eq!(kept, raw),
            other => panic!("Expected Parse, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_rejected() {
        let err = parse_summary("[1, 2]", &schema(&["a"]), None).unwrap_err();
        assert!(matches!(err, SummaryError::NotAnObject { found } if found == "array"));
    }

    #[test]
    fn test_missing_fields_listed() {
        let err = parse_summary("{\"a\": \"x\"}", &schema(&["a", "b", "c"]), None).unwrap_err();
        match err {
            SummaryError::MissingFields { fields } => assert_eq!(fields, vec!["b", "c"]),
            other => panic!("Expected MissingFields, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let record =
            parse_summary("{\"a\": \"x\", \"extra\": \"y\"}", &schema(&["a"]), None).unwrap();
        assert_eq!(record.len(), 1);
        assert!(!record.contains_key("extra"));
    }

    #[test]
    fn test_scalars_stringified_and_null_is_na() {
        let record = parse_summary(
            "{\"year\": 2021, \"empirical\": true, \"sample_size\": null}",
            &schema(&["year", "empirical", "sample_size"]),
            None,
        )
        .unwrap();
        assert_eq!(record["year"], "2021");
        assert_eq!(record["empirical"], "true");
        assert_eq!(record["sample_size"], "N/A");
    }

    #[test]
    fn test_nested_object_rejected() {
        let err = parse_summary("{\"methods\": {\"a\": 1}}", &schema(&["methods"]), None)
            .unwrap_err();
        assert!(matches!(err, SummaryError::InvalidField { field, .. } if field == "methods"));
    }

    #[test]
    fn test_array_outside_bullet_field_rejected() {
        let err = parse_summary(
            "{\"topics\": [\"a\"], \"other_details\": \"x\"}",
            &schema(&["topics", "other_details"]),
            Some("other_details"),
        )
        .unwrap_err();
        assert!(matches!(err, SummaryError::InvalidField { field, .. } if field == "topics"));
    }

    #[test]
    fn test_nested_array_in_bullet_field_rejected() {
        let err = parse_summary(
            "{\"other_details\": [[\"a\"]]}",
            &schema(&["other_details"]),
            Some("other_details"),
        )
        .unwrap_err();
        assert!(matches!(err, SummaryError::InvalidField { .. }));
    }

    #[test]
    fn test_prompt_lists_schema_and_text() {
        let prompt = build_summary_prompt(
            "PAPER BODY",
            &schema(&["authors", "other_details"]),
            Some("other_details"),
        );
        assert!(prompt.contains("\"authors\": \"...\""));
        assert!(prompt.contains("\"other_details\": \"...\""));
        assert!(prompt.contains("\"• \""));
        assert!(prompt.contains("\"N/A\""));
        assert!(prompt.contains("\"\"\"\nPAPER BODY\n\"\"\""));
    }

    #[test]
    fn test_truncate_str_respects_char_boundary() {
        assert_eq!(truncate_str("héllo", 2), "h");
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn test_paper_record_serializes_fields_then_name() {
        let mut fields = IndexMap::new();
        fields.insert("year".to_string(), "2020".to_string());
        fields.insert("authors".to_string(), "Smith".to_string());
        let record = PaperRecord::new("a.pdf", fields);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            "{\"year\":\"2020\",\"authors\":\"Smith\",\"paper_name\":\"a.pdf\"}"
        );
    }

    #[tokio::test]
    async fn test_summarize_builds_record() {
        let mock = Arc::new(MockLlmProvider::with_response(&full_response(json!(
            "• Point."
        ))));
        let brain = Arc::new(Brain::new(mock.clone(), no_retry()));
        let summarizer = Summarizer::new(brain, SummaryConfig::default());

        let record = summarizer.summarize("body", "paper.pdf").await.unwrap();
        assert_eq!(record.paper_name, "paper.pdf");
        assert_eq!(record.get("other_details"), Some("• Point."));
        assert_eq!(mock.requests()[0].temperature, 0.3);
    }

    #[tokio::test]
    async fn test_summarize_truncates_input() {
        let mock = Arc::new(MockLlmProvider::with_response("{\"a\": \"b\"}"));
        let brain = Arc::new(Brain::new(mock.clone(), no_retry()));
        let config = SummaryConfig {
            fields: schema(&["a"]),
            bullet_field: None,
            max_input_chars: Some(4),
            ..Default::default()
        };
        Summarizer::new(brain, config)
            .summarize("abcdefgh", "p.pdf")
            .await
            .unwrap();
        let prompt = mock.requests()[0].prompt_text();
        assert!(prompt.contains("\"\"\"\nabcd\n\"\"\""));
    }

    #[tokio::test]
    async fn test_summarize_transport_error() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::AuthFailed {
            provider: "test".into(),
        });
        let brain = Arc::new(Brain::new(mock, no_retry()));
        let err = Summarizer::new(brain, SummaryConfig::default())
            .summarize("body", "p.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, SummaryError::Llm(LlmError::AuthFailed { .. })));
    }
}
