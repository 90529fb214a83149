use crate::{LabelScores, ProviderError, TagClassifier};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct HttpClassifierConfig {
    /// Endpoint accepting `POST { sample_rate, samples }`.
    pub url: String,
    pub api_key: Option<String>,
}

/// Talks to an audio tagging service (e.g. a PANNs or YAMNet sidecar).
#[derive(Clone)]
pub struct HttpTagClassifier {
    client: Client,
    cfg: Arc<HttpClassifierConfig>,
}

impl HttpTagClassifier {
    pub fn new(cfg: HttpClassifierConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }
}

#[derive(Serialize)]
struct TagRequest<'a> {
    sample_rate: u32,
    samples: &'a [f32],
}

#[derive(Deserialize)]
struct ScoredLabel {
    label: String,
    score: f32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagApiResponse {
    Map(LabelScores),
    List(Vec<ScoredLabel>),
    Wrapped { labels: Vec<ScoredLabel> },
}

impl TagApiResponse {
    fn into_scores(self) -> LabelScores {
        match self {
            TagApiResponse::Map(m) => m,
            TagApiResponse::List(list) | TagApiResponse::Wrapped { labels: list } => {
                let mut out = LabelScores::new();
                for l in list {
                    *out.entry(l.label).or_insert(0.0) += l.score;
                }
                out
            }
        }
    }
}

fn parse_response(body: &str) -> Result<LabelScores, ProviderError> {
    let parsed: TagApiResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    Ok(parsed.into_scores())
}

#[async_trait::async_trait]
impl TagClassifier for HttpTagClassifier {
    async fn classify(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<LabelScores, ProviderError> {
        let body = TagRequest {
            sample_rate,
            samples,
        };
        let mut req = self.client.post(&self.cfg.url).json(&body);
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(ProviderError::RequestFailed(format!("{}: {}", status, text)));
        }
        tracing::debug!("tagger responded with {} bytes", text.len());
        parse_response(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_label_map() {
        let scores = parse_response(r#"{"Music": 0.8, "Speech": 0.1}"#).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["Music"], 0.8);
    }

    #[test]
    fn accepts_scored_list_and_wrapped_list() {
        let scores = parse_response(r#"[{"label": "Rain", "score": 0.5}]"#).unwrap();
        assert_eq!(scores["Rain"], 0.5);
        let scores =
            parse_response(r#"{"labels": [{"label": "Bird", "score": 0.25}]}"#).unwrap();
        assert_eq!(scores["Bird"], 0.25);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_response("not json"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
