use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Analyzer, AnalyzerError};
use crate::models::EnrichmentResult;

/// Analyzer backed by a morphological analysis microservice over HTTP.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct AnalyzeReq<'a> {
    word: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResp {
    #[serde(default)]
    word: String,
    lemma: String,
    #[serde(default)]
    part_of_speech: Option<String>,
    #[serde(default)]
    features: Option<HashMap<String, Option<String>>>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Deserialize)]
struct HealthResp {
    #[serde(default)]
    status: String,
    #[serde(default)]
    ready: bool,
}

impl HttpAnalyzer {
    /// `timeout` bounds the whole request. Callers apply their own deadline too.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AnalyzerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lexicache/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, word: &str) -> Result<EnrichmentResult, AnalyzerError> {
        if word.trim().is_empty() {
            return Err(AnalyzerError::Malformed("empty word".to_string()));
        }

        let resp = self
            .client
            .post(format!("{}/analyze", self.base_url))
            .json(&AnalyzeReq { word })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AnalyzerError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        let r: AnalyzeResp =
            serde_json::from_slice(&body).map_err(|e| AnalyzerError::Schema(e.to_string()))?;

        to_result(r)
    }

    async fn is_ready(&self) -> bool {
        let resp = match self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                log::warn!("analyzer health check {}: status {}", self.base_url, r.status());
                return false;
            }
            Err(e) => {
                log::warn!("analyzer health check {}: {}", self.base_url, e);
                return false;
            }
        };

        match resp.json::<HealthResp>().await {
            Ok(h) => h.ready || h.status == "healthy",
            Err(_) => false,
        }
    }
}

/// Validate a service response. Features with empty or null values are
/// dropped: an absent feature means "not applicable".
fn to_result(r: AnalyzeResp) -> Result<EnrichmentResult, AnalyzerError> {
    let lemma = r.lemma.trim().to_string();
    if lemma.is_empty() {
        return Err(AnalyzerError::Schema(format!(
            "empty lemma for '{}'",
            r.word
        )));
    }

    let confidence = r.confidence.unwrap_or(1.0);
    if !(0.0..=1.0).contains(&confidence) {
        return Err(AnalyzerError::Schema(format!(
            "confidence out of range: {}",
            confidence
        )));
    }

    let features = r
        .features
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| {
            let k = k.trim().to_string();
            let v = v?.trim().to_string();
            (!k.is_empty() && !v.is_empty()).then_some((k, v))
        })
        .collect();

    Ok(EnrichmentResult {
        lemma,
        part_of_speech: r.part_of_speech.unwrap_or_default().trim().to_string(),
        features,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::{http::StatusCode, response::IntoResponse, routing::get, routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;

    async fn analyze(Json(req): Json<Value>) -> axum::response::Response {
        let word = req["word"].as_str().unwrap_or_default().to_string();
        match word.as_str() {
            "puella" => Json(json!({
                "word": "puella",
                "lemma": "puella",
                "partOfSpeech": "noun",
                "features": {"Case": "Nominative", "Number": "Singular", "Tense": null, "Mood": ""},
            }))
            .into_response(),
            "broken" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            "nolemma" => Json(json!({"word": "nolemma", "lemma": " "})).into_response(),
            "overconfident" => {
                Json(json!({"word": "x", "lemma": "x", "confidence": 1.5})).into_response()
            }
            "garbage" => "not json".into_response(),
            "slow" => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"word": "slow", "lemma": "slow"})).into_response()
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn serve() -> SocketAddr {
        let app = Router::new()
            .route("/analyze", post(analyze))
            .route(
                "/health",
                get(|| async { Json(json!({"status": "healthy", "ready": true})) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_analyze() {
        let addr = serve().await;
        let a = HttpAnalyzer::new(&format!("http://{}/", addr), Duration::from_secs(2)).unwrap();

        assert!(a.is_ready().await);

        let r = a.analyze("puella").await.unwrap();
        assert_eq!(r.lemma, "puella");
        assert_eq!(r.part_of_speech, "noun");
        assert_eq!(r.confidence, 1.0);
        assert_eq!(r.features.len(), 2);
        assert_eq!(r.features.get("Number").map(String::as_str), Some("Singular"));
        assert!(!r.features.contains_key("Tense"));
        assert!(!r.features.contains_key("Mood"));
    }

    #[tokio::test]
    async fn test_analyze_failures() {
        let addr = serve().await;
        let a = HttpAnalyzer::new(&format!("http://{}", addr), Duration::from_millis(200)).unwrap();

        assert!(matches!(
            a.analyze("broken").await,
            Err(AnalyzerError::Status(500))
        ));
        assert!(matches!(
            a.analyze("unknown").await,
            Err(AnalyzerError::Status(404))
        ));
        assert!(matches!(
            a.analyze("nolemma").await,
            Err(AnalyzerError::Schema(_))
        ));
        assert!(matches!(
            a.analyze("overconfident").await,
            Err(AnalyzerError::Schema(_))
        ));
        assert!(matches!(
            a.analyze("garbage").await,
            Err(AnalyzerError::Schema(_))
        ));
        assert!(matches!(a.analyze("slow").await, Err(AnalyzerError::Http(_))));
        assert!(matches!(a.analyze("").await, Err(AnalyzerError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Bind and drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let a = HttpAnalyzer::new(&format!("http://{}", addr), Duration::from_secs(1)).unwrap();
        assert!(!a.is_ready().await);
        assert!(matches!(a.analyze("puella").await, Err(AnalyzerError::Http(_))));
    }
}
