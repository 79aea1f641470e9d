use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{SummaryError, SummaryRequest, Summarizer};
use crate::network::{ApiRequest, Transport};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GEMINI_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_DETAIL_LIMIT: usize = 200;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_TEMPERATURE: f32 = 0.1;

/// Summarizer backed by the Gemini `generateContent` endpoint.
///
/// Goes through the shared transport so tests can script responses.
pub struct GeminiSummarizer {
    transport: Arc<dyn Transport>,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiSummarizer {
    /// Accepts provider-prefixed model names (`gemini/gemini-2.5-flash`)
    /// and strips the prefix; an empty model falls back to the default.
    pub fn new(
        transport: Arc<dyn Transport>,
        api_key: impl Into<String>,
        model: &str,
        temperature: f32,
    ) -> Self {
        let model = model
            .trim()
            .rsplit('/')
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_GEMINI_MODEL)
            .to_string();

        Self {
            transport,
            api_key: api_key.into(),
            model,
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Summarizer for GeminiSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError> {
        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": request.prompt() }] }],
            "generationConfig": { "temperature": self.temperature },
        });

        debug!(model = %self.model, stage = %request.stage, "requesting summary");
        let api_request = ApiRequest::post(url)
            .with_header("x-goog-api-key", &self.api_key)
            .with_json(body)
            .with_timeout(GEMINI_TIMEOUT);

        let response = self.transport.execute(api_request).await?;
        if !response.is_success() {
            return Err(SummaryError::Http {
                status: response.status,
                detail: truncate(&response.body),
            });
        }

        let data = response
            .json()
            .map_err(|e| SummaryError::Parse(e.to_string()))?;
        extract_text(&data)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn extract_text(data: &Value) -> Result<String, SummaryError> {
    let parts = data["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(SummaryError::Empty)?;

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    let text = text.trim().to_string();
    if text.is_empty() {
        Err(SummaryError::Empty)
    } else {
        Ok(text)
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= ERROR_DETAIL_LIMIT {
        body.to_string()
    } else {
        let cut = body
            .char_indices()
            .take_while(|(i, _)| *i < ERROR_DETAIL_LIMIT)
            .last()
            .map_or(0, |(i, c)| i + c.len_utf8());
        format!("{}...", &body[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::FakeTransport;
    use crate::pipeline::Stage;

    fn make_summarizer(transport: &Arc<FakeTransport>, model: &str) -> GeminiSummarizer {
        GeminiSummarizer::new(
            transport.clone(),
            "gm-key",
            model,
            DEFAULT_GEMINI_TEMPERATURE,
        )
    }

    fn make_request() -> SummaryRequest {
        SummaryRequest::new(Stage::Enriching, "Assess.", "NPI: verified")
    }

    fn candidate_body(text: &str) -> Value {
        json!({
            "candidates": [
                { "content": { "parts": [{ "text": text }] } }
            ]
        })
    }

    #[test]
    fn provider_prefix_is_stripped() {
        let transport = Arc::new(FakeTransport::new());
        let summarizer = make_summarizer(&transport, "gemini/gemini-2.5-flash-exp");
        assert_eq!(summarizer.model(), "gemini-2.5-flash-exp");

        let summarizer = make_summarizer(&transport, "gemini-2.5-flash");
        assert_eq!(summarizer.model(), "gemini-2.5-flash");

        let summarizer = make_summarizer(&transport, "  ");
        assert_eq!(summarizer.model(), DEFAULT_GEMINI_MODEL);
    }

    #[tokio::test]
    async fn request_targets_model_with_key_header() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_json(200, &candidate_body("All good."));
        let summarizer = make_summarizer(&transport, "gemini-2.5-flash");

        let text = summarizer.summarize(&make_request()).await.unwrap();
        assert_eq!(text, "All good.");

        let requests = transport.requests();
        assert!(requests[0].url.ends_with("gemini-2.5-flash:generateContent"));
        assert!(requests[0]
            .headers
            .contains(&("x-goog-api-key".to_string(), "gm-key".to_string())));
        let body = requests[0].json_body.as_ref().unwrap();
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[tokio::test]
    async fn multi_part_responses_are_joined() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_json(
            200,
            &json!({
                "candidates": [
                    { "content": { "parts": [{ "text": "First. " }, { "text": "Second." }] } }
                ]
            }),
        );
        let summarizer = make_summarizer(&transport, "gemini-2.5-flash");

        let text = summarizer.summarize(&make_request()).await.unwrap();
        assert_eq!(text, "First. Second.");
    }

    #[tokio::test]
    async fn missing_candidates_is_empty_error() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_json(200, &json!({ "candidates": [] }));
        let summarizer = make_summarizer(&transport, "gemini-2.5-flash");

        let result = summarizer.summarize(&make_request()).await;
        assert!(matches!(result, Err(SummaryError::Empty)));
    }

    #[tokio::test]
    async fn http_errors_carry_status_and_detail() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_response(400, "API key not valid");
        let summarizer = make_summarizer(&transport, "gemini-2.5-flash");

        let result = summarizer.summarize(&make_request()).await;
        match result {
            Err(SummaryError::Http { status, detail }) => {
                assert_eq!(status, 400);
                assert!(detail.contains("API key not valid"));
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }
}
