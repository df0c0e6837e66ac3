use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};
use tracing::{debug, warn};

use crate::schema::SchemaDescriptor;

use super::{ExtractionContext, ExtractionResult, Extractor, anchor_evidence};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Claude-backed extractor for production use. One model call per attempt;
/// validation failures re-prompt with the errors, transport failures count
/// against the same retry budget.
pub struct ClaudeExtractor {
    http: Client,
    api_key: String,
    model: String,
    base: String,
    max_retries: usize,
}

impl ClaudeExtractor {
    pub fn new(api_key: String, model: String, base: Option<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("client");
        Self {
            http,
            api_key,
            model,
            base: base.unwrap_or_else(|| "https://api.anthropic.com".into()),
            max_retries: 2,
        }
    }

    async fn call_model(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "system": system,
            "messages": [
                { "role": "user", "content": user }
            ],
        });

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("request to Anthropic API failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                warn!(%status, "transient Anthropic API failure");
            }
            return Err(anyhow!("Anthropic API error {status}: {body}"));
        }

        let payload: Value = resp
            .json()
            .await
            .context("error decoding Anthropic API response")?;
        payload
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Anthropic response carried no text content"))
    }

    fn build_system_prompt(&self, schema: &SchemaDescriptor, ctx: &ExtractionContext) -> String {
        let json_schema =
            serde_json::to_string_pretty(&schema.json_schema()).unwrap_or_default();
        format!(
            "Du bist ein praeziser Daten-Extraktions-Assistent fuer die interne \
             Wissensplattform.\n\n\
             Deine Aufgabe ist es, strukturierte Informationen aus Dokumenten zu \
             extrahieren.\n\n\
             KONTEXT:\n\
             - Abteilung: {department}\n\
             - Dokumenttyp: {doc_type}\n\
             - Datei: {filename}\n\n\
             SCHEMA ZU EXTRAHIEREN:\n{description}\n\n\
             JSON SCHEMA:\n{json_schema}\n\n\
             WICHTIGE REGELN:\n\
             1. Extrahiere NUR Informationen, die explizit im Text vorhanden sind\n\
             2. Erfinde KEINE Daten - wenn eine Information fehlt, lasse das Feld leer oder null\n\
             3. Zitiere relevante Textpassagen als Beleg (evidence)\n\
             4. Antworte NUR mit validem JSON im angegebenen Format\n\
             5. Bei Listen: Extrahiere alle relevanten Eintraege\n\
             6. Bei fehlenden Pflichtfeldern: Setze sie auf leere Strings oder leere Listen\n\n\
             AUSGABEFORMAT:\n\
             Antworte mit einem JSON-Objekt, das zwei Schluessel hat:\n\
             - \"data\": Die extrahierten Daten gemaess Schema\n\
             - \"evidence\": Eine Liste von Objekten mit \"field\" und \"excerpt\" fuer jeden belegten Wert",
            department = ctx.department.as_str(),
            doc_type = ctx.doc_type.as_str(),
            filename = ctx.filename,
            description = schema.describe(),
        )
    }

    fn build_user_prompt(&self, text: &str) -> String {
        format!(
            "Extrahiere die strukturierten Daten aus folgendem Text:\n\n---\n{text}\n---\n\n\
             Antworte nur mit dem JSON-Objekt."
        )
    }

    fn build_retry_prompt(&self, text: &str, errors: &[String], previous: &str) -> String {
        let error_list = errors
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Die vorherige Extraktion hatte Validierungsfehler:\n\n{error_list}\n\n\
             Deine vorherige Antwort war:\n{previous}\n\n\
             Bitte korrigiere die Extraktion. Hier nochmal der Originaltext:\n\n\
             ---\n{text}\n---\n\n\
             Antworte nur mit dem korrigierten JSON-Objekt."
        )
    }
}

#[async_trait]
impl Extractor for ClaudeExtractor {
    async fn extract(
        &self,
        text: &str,
        schema: &'static SchemaDescriptor,
        ctx: &ExtractionContext,
    ) -> Result<ExtractionResult> {
        let system_prompt = self.build_system_prompt(schema, ctx);
        let mut user_prompt = self.build_user_prompt(text);

        let mut errors: Vec<String> = Vec::new();
        let mut last_response: Option<String> = None;
        let mut delay = Duration::from_millis(300);

        for attempt in 1..=self.max_retries + 1 {
            if attempt > 1 {
                sleep(delay + Duration::from_millis(fastrand::u64(0..250))).await;
                delay = Duration::from_millis((delay.as_millis() as f64 * 1.8) as u64);
            }

            let response = match self.call_model(&system_prompt, &user_prompt).await {
                Ok(response) => response,
                Err(err) => {
                    errors.push(format!("attempt {attempt}: API error - {err:#}"));
                    continue;
                }
            };
            last_response = Some(response.clone());

            let Some(data) = parse_json_response(&response) else {
                errors.push(format!(
                    "attempt {attempt}: could not extract JSON from response"
                ));
                continue;
            };

            let validation_errors = schema.validate(&data);
            if validation_errors.is_empty() {
                debug!(schema = schema.name, attempt, "extraction validated");
                let evidence = anchor_evidence(&data, text, ctx.chunk_index);
                return Ok(ExtractionResult {
                    data: Some(data),
                    records: Vec::new(),
                    valid: true,
                    errors: Vec::new(),
                    evidence,
                    confidence: 0.9,
                    needs_review: false,
                    raw_response: last_response,
                });
            }

            errors.extend(
                validation_errors
                    .iter()
                    .map(|e| format!("attempt {attempt}: {e}")),
            );
            user_prompt = self.build_retry_prompt(text, &validation_errors, &response);
        }

        Ok(ExtractionResult {
            data: None,
            records: Vec::new(),
            valid: false,
            errors,
            evidence: Vec::new(),
            confidence: 0.0,
            needs_review: true,
            raw_response: last_response,
        })
    }
}

/// Recover a JSON object from a model response: the whole body, a fenced
/// code block, or the outermost `{…}` substring, in that order. A `data`
/// envelope is unwrapped.
pub(crate) fn parse_json_response(response: &str) -> Option<Value> {
    static FENCED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").unwrap());
    static OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

    let candidates = [
        serde_json::from_str::<Value>(response).ok(),
        FENCED
            .captures(response)
            .and_then(|caps| serde_json::from_str(&caps[1]).ok()),
        OBJECT
            .find(response)
            .and_then(|m| serde_json::from_str(m.as_str()).ok()),
    ];

    let parsed = candidates.into_iter().flatten().next()?;
    match parsed {
        Value::Object(ref map) if map.contains_key("data") => Some(map["data"].clone()),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json() {
        let parsed = parse_json_response(r#"{"question": "Wie?", "answer": "So."}"#).unwrap();
        assert_eq!(parsed["question"], "Wie?");
    }

    #[test]
    fn parses_fenced_code_block() {
        let response = "Hier ist das Ergebnis:\n```json\n{\"name\": \"Secura\"}\n```\nFertig.";
        let parsed = parse_json_response(response).unwrap();
        assert_eq!(parsed["name"], "Secura");
    }

    #[test]
    fn parses_embedded_object() {
        let response = "Vorwort {\"id\": \"OBJ-1\"} Nachwort";
        let parsed = parse_json_response(response).unwrap();
        assert_eq!(parsed["id"], "OBJ-1");
    }

    #[test]
    fn unwraps_data_envelope() {
        let response = json!({
            "data": { "question": "Wie?", "answer": "So." },
            "evidence": [{ "field": "question", "excerpt": "Wie?" }],
        })
        .to_string();
        let parsed = parse_json_response(&response).unwrap();
        assert_eq!(parsed["answer"], "So.");
        assert!(parsed.get("evidence").is_none());
    }

    #[test]
    fn garbage_yields_none() {
        assert!(parse_json_response("kein json weit und breit").is_none());
    }
}
