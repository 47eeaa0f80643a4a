#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::openai::OpenAiProvider;
use crate::provider::{LlmProvider, Message};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given closure for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::OpenAi($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl LlmProvider for AnyProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, crate::LlmError> {
        delegate_provider!(self, |p| p.chat(messages).await)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, crate::LlmError> {
        delegate_provider!(self, |p| p.embed_batch(texts).await)
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_variant_reports_name() {
        let provider = AnyProvider::OpenAi(OpenAiProvider::new(
            "key".into(),
            "http://localhost".into(),
            "gpt-4o-mini".into(),
            "text-embedding-3-small".into(),
            100,
        ));
        assert_eq!(provider.name(), "openai");
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn embed_batch_delegates_to_inner_provider() {
        let mock = MockProvider::default().with_dimensions(8);
        let provider = AnyProvider::Mock(mock.clone());
        let vectors = provider
            .embed_batch(&["ward round notes".to_owned()])
            .await
            .unwrap();
        assert_eq!(vectors[0].len(), 8);
        assert_eq!(mock.embed_calls(), 1);
    }
}
