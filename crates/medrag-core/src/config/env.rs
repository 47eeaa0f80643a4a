use super::{Config, ProviderKind, StoreBackend};
use crate::secret::Secret;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_rag();
        self.apply_env_overrides_service();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("MEDRAG_LLM_PROVIDER") {
            match v.to_ascii_lowercase().as_str() {
                "openai" => self.llm.provider = ProviderKind::OpenAi,
                "mock" => self.llm.provider = ProviderKind::Mock,
                _ => tracing::warn!("ignoring invalid MEDRAG_LLM_PROVIDER value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("MEDRAG_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("MEDRAG_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("MEDRAG_COMPLETION_MODEL") {
            self.llm.completion_model = v;
        }
        // the dedicated variable wins over the conventional one
        if let Some(key) = Secret::from_env(&["MEDRAG_OPENAI_API_KEY", "OPENAI_API_KEY"]) {
            self.secrets.openai_api_key = Some(key);
        }
    }

    fn apply_env_overrides_rag(&mut self) {
        if let Ok(v) = std::env::var("MEDRAG_CHUNK_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.rag.chunk_size = size;
        }
        if let Ok(v) = std::env::var("MEDRAG_CHUNK_OVERLAP")
            && let Ok(overlap) = v.parse::<usize>()
        {
            self.rag.chunk_overlap = overlap;
        }
        if let Ok(v) = std::env::var("MEDRAG_SIMILARITY_THRESHOLD")
            && let Ok(threshold) = v.parse::<f32>()
        {
            self.rag.similarity_threshold = threshold;
        }
        if let Ok(v) = std::env::var("MEDRAG_MAX_RESULTS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.rag.max_results = n;
        }
        if let Ok(v) = std::env::var("MEDRAG_MAX_CONTEXT_TOKENS")
            && let Ok(tokens) = v.parse::<usize>()
        {
            self.rag.max_context_tokens = tokens;
        }
    }

    fn apply_env_overrides_service(&mut self) {
        if let Ok(v) = std::env::var("MEDRAG_STORE_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "postgres" => self.store.backend = StoreBackend::Postgres,
                "memory" => self.store.backend = StoreBackend::Memory,
                _ => tracing::warn!("ignoring invalid MEDRAG_STORE_BACKEND value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.store.database_url = v;
        }
        if let Ok(v) = std::env::var("MEDRAG_GATEWAY_BIND") {
            self.gateway.bind = v;
        }
        if let Ok(v) = std::env::var("MEDRAG_GATEWAY_PORT")
            && let Ok(port) = v.parse::<u16>()
        {
            self.gateway.port = port;
        }
        if let Ok(v) = std::env::var("MEDRAG_GATEWAY_TOKEN") {
            self.gateway.auth_token = Some(v);
        }
    }
}
