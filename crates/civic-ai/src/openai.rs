//! OpenAI-compatible chat-completions client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use civic_core::{BridgeConfig, FeedbackKind, ReadingStats, Taxonomy};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{
    AnalysisClient, DocumentAnalysis, DocumentParams, FeedbackAnalysis, ImpactSummary,
    ServiceError,
};
use crate::prompts;
use crate::retry::{Resilient, RetryPolicy};

/// Demographic attribute whose values are the impact-analysis groups.
const GROUP_ATTRIBUTE: &str = "role";

/// One request per call; wrap in [`Resilient`] for retries.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: civic_core::ApiKey,
    base_url: String,
    model: String,
    timeout: Duration,
    groups: Vec<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &BridgeConfig) -> Result<Self, ServiceError> {
        if config.api_key.is_empty() {
            return Err(ServiceError::NotConfigured(
                "no API key (set OPENAI_API_KEY or api_key in the config file)".to_string(),
            ));
        }
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout,
            groups: impact_groups(&config.taxonomy),
        })
    }

    /// The client wrapped with the configured retry policy.
    pub fn resilient(config: &BridgeConfig) -> Result<Resilient<Self>, ServiceError> {
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            attempt_timeout: Duration::from_secs(config.request_timeout_secs),
            ..RetryPolicy::default()
        };
        Ok(Resilient::new(Self::new(config)?, policy))
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Send one prompt and return the assistant's message content.
    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: prompts::SYSTEM_PROMPT,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        debug!(url = %url, model = %self.model, prompt_chars = prompt.len(), "sending chat completion");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Auth(body),
                StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited { retry_after },
                _ => ServiceError::Server {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(format!("chat response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ServiceError::Malformed("empty completion".to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout(self.timeout)
        } else {
            ServiceError::Http(e.to_string())
        }
    }

    async fn simplify(&self, text: &str, params: &DocumentParams) -> Result<String, ServiceError> {
        let content = self.complete(&prompts::simplify(text, params)).await?;
        prompts::parse_simplified(&prompts::parse_json(&content)?)
    }

    async fn impact(
        &self,
        text: &str,
    ) -> Result<(BTreeMap<String, ImpactSummary>, Vec<String>), ServiceError> {
        let groups: Vec<&str> = self.groups.iter().map(String::as_str).collect();
        let content = self.complete(&prompts::impact(text, &groups)).await?;
        prompts::parse_impact(&prompts::parse_json(&content)?)
    }
}

/// Values of the `role` attribute, or the stock roles when it is open.
fn impact_groups(taxonomy: &Taxonomy) -> Vec<String> {
    match taxonomy.demographic_attributes.get(GROUP_ATTRIBUTE) {
        Some(values) if !values.is_empty() => values.clone(),
        _ => Taxonomy::default()
            .demographic_attributes
            .remove(GROUP_ATTRIBUTE)
            .unwrap_or_default(),
    }
}

#[async_trait]
impl AnalysisClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn analyze_document(
        &self,
        text: &str,
        params: &DocumentParams,
    ) -> Result<DocumentAnalysis, ServiceError> {
        let (simplified_text, (demographic_impact, key_provisions)) =
            futures::try_join!(self.simplify(text, params), self.impact(text))?;

        let before = ReadingStats::compute(text).grade_level;
        let after = ReadingStats::compute(&simplified_text).grade_level;
        let readability_delta = ((before - after) * 10.0).round() / 10.0;
        info!(
            model = %self.model,
            groups = demographic_impact.len(),
            provisions = key_provisions.len(),
            readability_delta,
            "document analysed"
        );

        Ok(DocumentAnalysis {
            simplified_text,
            demographic_impact,
            key_provisions,
            readability_delta,
        })
    }

    async fn analyze_feedback(
        &self,
        text: &str,
        kind: Option<FeedbackKind>,
    ) -> Result<FeedbackAnalysis, ServiceError> {
        let content = self.complete(&prompts::feedback(text, kind)).await?;
        let analysis = prompts::parse_feedback(&prompts::parse_json(&content)?)?;
        debug!(sentiment = %analysis.sentiment, tags = analysis.category_tags.len(), "feedback analysed");
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{ApiKey, SentimentLabel};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> BridgeConfig {
        BridgeConfig {
            api_key: ApiKey::new("sk-test"),
            base_url: format!("{base_url}/"),
            request_timeout_secs: 5,
            ..BridgeConfig::default()
        }
    }

    fn completion(content: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content.to_string()}}]
        }))
    }

    #[test]
    fn missing_key_is_not_configured() {
        let config = BridgeConfig::default();
        assert!(matches!(
            OpenAiClient::new(&config),
            Err(ServiceError::NotConfigured(_))
        ));
    }

    #[test]
    fn groups_default_to_roles() {
        let client = OpenAiClient::new(&config("http://localhost")).unwrap();
        assert_eq!(client.groups().len(), 8);
        assert_eq!(client.base_url, "http://localhost");
    }

    #[tokio::test]
    async fn feedback_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(completion(json!({
                "sentiment": "negative",
                "categories": ["Cost"],
                "key_points": ["Fees too high"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server.uri())).unwrap();
        let analysis = client
            .analyze_feedback("The fees are too high", Some(FeedbackKind::Concern))
            .await
            .unwrap();
        assert_eq!(analysis.sentiment, SentimentLabel::Negative);
        assert!(analysis.category_tags.contains("Cost"));
        assert_eq!(analysis.key_points, vec!["Fees too high".to_string()]);
    }

    #[tokio::test]
    async fn document_runs_both_prompts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("simplified_text"))
            .respond_with(completion(json!({"simplified_text": "Farms get help. It starts soon."})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("key_provisions"))
            .respond_with(completion(json!({
                "Farmer": {"impact": "Lower costs", "concerns": "Paperwork", "benefits": "Subsidy"},
                "key_provisions": ["A subsidy of twenty percent for eligible agricultural enterprises"]
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server.uri())).unwrap();
        let text = "Eligible agricultural enterprises shall receive a proportional subsidy \
                    notwithstanding any administrative determination previously communicated.";
        let analysis = client
            .analyze_document(text, &DocumentParams::default())
            .await
            .unwrap();
        assert_eq!(analysis.simplified_text, "Farms get help. It starts soon.");
        assert_eq!(analysis.demographic_impact["Farmer"].concerns, "Paperwork");
        assert_eq!(analysis.key_provisions.len(), 1);
        assert!(analysis.readability_delta > 0.0);
    }

    #[tokio::test]
    async fn status_codes_map_to_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("unauthorised"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("throttled"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("broken"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server.uri())).unwrap();
        assert!(matches!(
            client.analyze_feedback("unauthorised", None).await,
            Err(ServiceError::Auth(body)) if body == "bad key"
        ));
        assert!(matches!(
            client.analyze_feedback("throttled", None).await,
            Err(ServiceError::RateLimited { retry_after: Some(d) }) if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            client.analyze_feedback("broken", None).await,
            Err(ServiceError::Server { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn unknown_sentiment_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(json!({"sentiment": "ambivalent"})))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server.uri())).unwrap();
        assert!(matches!(
            client.analyze_feedback("hmm", None).await,
            Err(ServiceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn resilient_client_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let mut config = config(&server.uri());
        config.max_retries = 2;
        let client = Resilient::new(
            OpenAiClient::new(&config).unwrap(),
            RetryPolicy {
                max_retries: config.max_retries,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                attempt_timeout: Duration::from_secs(5),
            },
        );
        let err = client.analyze_feedback("anything", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Exhausted { attempts: 3, .. }));
    }
}
