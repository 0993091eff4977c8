//! AI text analysis: turns a rough task description into a cleaned one.
//!
//! The service is slow and sometimes unavailable, so every call runs under a
//! hard timeout and failures come back as a distinct [`AnalysisError`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("no analyzer URL is configured")]
    NotConfigured,

    #[error("nothing to analyze")]
    EmptyInput,

    #[error("analyzer request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("analyzer returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("analyzer rejected the text: {0}")]
    Rejected(String),

    #[error("analyzer returned an empty description")]
    EmptyResult,

    #[error("analyzer did not answer within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    /// Return a cleaned description for `raw`.
    async fn analyze(&self, raw: &str) -> Result<String, AnalysisError>;
}

/// Envelope the analysis endpoint answers with.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<AnalysisData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalysisData {
    #[serde(default)]
    description: String,
}

fn interpret(envelope: Envelope) -> Result<String, AnalysisError> {
    if !envelope.success {
        return Err(AnalysisError::Rejected(envelope.error.unwrap_or_else(|| "unknown error".into())));
    }
    let description = envelope.data.map(|d| d.description).unwrap_or_default();
    let description = description.trim();
    if description.is_empty() {
        return Err(AnalysisError::EmptyResult);
    }
    Ok(description.to_string())
}

/// Analyzer reached with `GET <url>?action=analyzeTaskWithAI&description=<text>`.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpAnalyzer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        HttpAnalyzer { client: reqwest::Client::new(), url: url.into(), timeout }
    }

    async fn call(&self, raw: &str) -> Result<String, AnalysisError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("action", "analyzeTaskWithAI"), ("description", raw)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AnalysisError::Status { status: status.as_u16(), body });
        }
        interpret(response.json::<Envelope>().await?)
    }
}

#[async_trait]
impl TextAnalyzer for HttpAnalyzer {
    async fn analyze(&self, raw: &str) -> Result<String, AnalysisError> {
        if raw.trim().is_empty() {
            return Err(AnalysisError::EmptyInput);
        }
        tracing::debug!(chars = raw.chars().count(), "sending text for analysis");
        match tokio::time::timeout(self.timeout, self.call(raw)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(self.timeout)),
        }
    }
}

/// Stand-in used when no analyzer URL is configured.
pub struct Unconfigured;

#[async_trait]
impl TextAnalyzer for Unconfigured {
    async fn analyze(&self, _raw: &str) -> Result<String, AnalysisError> {
        Err(AnalysisError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn envelope(json: &str) -> Envelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn success_envelope_yields_trimmed_description() {
        let got = interpret(envelope(r#"{"success": true, "data": {"description": "  Audit bed rails on ward 7. "}}"#));
        assert_eq!(got.unwrap(), "Audit bed rails on ward 7.");
    }

    #[test]
    fn failures_are_distinct() {
        assert_matches!(
            interpret(envelope(r#"{"success": false, "error": "quota exceeded"}"#)),
            Err(AnalysisError::Rejected(msg)) if msg == "quota exceeded"
        );
        assert_matches!(
            interpret(envelope(r#"{"success": true, "data": {"description": ""}}"#)),
            Err(AnalysisError::EmptyResult)
        );
    }

    #[tokio::test]
    async fn blank_input_is_refused_without_a_request() {
        let analyzer = HttpAnalyzer::new("http://127.0.0.1:1/never", Duration::from_secs(1));
        assert_matches!(analyzer.analyze("   ").await, Err(AnalysisError::EmptyInput));
    }

    #[tokio::test]
    async fn unconfigured_analyzer_fails() {
        assert_matches!(Unconfigured.analyze("text").await, Err(AnalysisError::NotConfigured));
    }
}
