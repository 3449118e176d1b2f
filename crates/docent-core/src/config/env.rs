use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DOCENT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("DOCENT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("DOCENT_CHUNK_SIZE") {
            if let Ok(size) = v.parse::<usize>() {
                self.ingest.chunk_size = size;
            } else {
                tracing::warn!("ignoring invalid DOCENT_CHUNK_SIZE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCENT_CHUNK_OVERLAP") {
            if let Ok(overlap) = v.parse::<usize>() {
                self.ingest.chunk_overlap = overlap;
            } else {
                tracing::warn!("ignoring invalid DOCENT_CHUNK_OVERLAP value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCENT_PRESERVE_STRUCTURE") {
            if let Ok(preserve) = v.parse::<bool>() {
                self.ingest.preserve_structure = preserve;
            } else {
                tracing::warn!("ignoring invalid DOCENT_PRESERVE_STRUCTURE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCENT_TOP_K") {
            if let Ok(top_k) = v.parse::<usize>() {
                self.retrieval.top_k = top_k;
            } else {
                tracing::warn!("ignoring invalid DOCENT_TOP_K value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCENT_USE_RAG") {
            if let Ok(enabled) = v.parse::<bool>() {
                self.retrieval.use_rag = enabled;
            } else {
                tracing::warn!("ignoring invalid DOCENT_USE_RAG value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCENT_PERSIST") {
            if let Ok(persist) = v.parse::<bool>() {
                self.storage.persist = persist;
            } else {
                tracing::warn!("ignoring invalid DOCENT_PERSIST value: {v}");
            }
        }
        if let Ok(v) = std::env::var("DOCENT_DATA_DIR") {
            self.storage.data_dir = v.into();
        }
        if let Ok(v) = std::env::var("DOCENT_LOG_LEVEL") {
            self.log_level = v;
        }
    }
}
