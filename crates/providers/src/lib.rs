//! Provider abstractions for audio content tagging.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod http;

/// Confidence per label for one sample window.
pub type LabelScores = HashMap<String, f32>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

/// Content tagger for a fixed-length mono window of PCM samples.
#[async_trait::async_trait]
pub trait TagClassifier: Send + Sync {
    async fn classify(&self, samples: &[f32], sample_rate: u32)
        -> Result<LabelScores, ProviderError>;
}

#[derive(Default, Clone)]
pub struct ProviderRegistry {
    classifiers: HashMap<String, Arc<dyn TagClassifier>>,
    pub preferred_classifier: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(mut self, name: &str, provider: Arc<dyn TagClassifier>) -> Self {
        self.classifiers.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_classifier(mut self, name: &str) -> Self {
        self.preferred_classifier = Some(name.to_string());
        self
    }

    pub fn classifier(&self, name: Option<&str>) -> Result<Arc<dyn TagClassifier>, ProviderError> {
        let key = name
            .map(str::to_string)
            .or_else(|| self.preferred_classifier.clone())
            .ok_or_else(|| {
                ProviderError::UnknownProvider("no classifier provider configured".into())
            })?;
        self.classifiers
            .get(&key)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownProvider(key))
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant;

    #[async_trait::async_trait]
    impl TagClassifier for Constant {
        async fn classify(&self, _: &[f32], _: u32) -> Result<LabelScores, ProviderError> {
            Ok(LabelScores::from([("Speech".to_string(), 1.0)]))
        }
    }

    #[tokio::test]
    async fn registry_resolves_preferred_classifier() {
        let reg = ProviderRegistry::new()
            .with_classifier("constant", Arc::new(Constant))
            .set_preferred_classifier("constant");
        let c = reg.classifier(None).unwrap();
        let scores = c.classify(&[0.0; 4], 16_000).await.unwrap();
        assert_eq!(scores.get("Speech"), Some(&1.0));
    }

    #[test]
    fn registry_reports_unknown_names() {
        let reg = ProviderRegistry::new();
        assert!(reg.is_empty());
        assert!(matches!(
            reg.classifier(Some("panns")),
            Err(ProviderError::UnknownProvider(name)) if name == "panns"
        ));
        assert!(reg.classifier(None).is_err());
    }
}
