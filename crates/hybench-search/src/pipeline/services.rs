use hybench_core::model::RankedList;
use hybench_core::upstream::ServiceError;

/// Text embedding service.
pub trait Embedder {
    /// Fixed-length vector for `text`.
    ///
    /// # Errors
    ///
    /// Quota, timeout, and transport failures must come back as distinct
    /// [`ServiceError`] variants so the retry path can tell them apart.
    fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

/// Search index offering lexical and vector retrieval.
pub trait Retriever {
    /// BM25 search over `fields`.
    ///
    /// # Errors
    ///
    /// Any upstream failure.
    fn search_lexical(
        &self,
        query: &str,
        fields: &[String],
        top_k: usize,
    ) -> Result<RankedList, ServiceError>;

    /// Nearest-neighbour search for `vector`.
    ///
    /// # Errors
    ///
    /// Any upstream failure.
    fn search_vector(&self, vector: &[f32], top_k: usize) -> Result<RankedList, ServiceError>;

    /// Text and vector in one request, fused by the index itself.
    ///
    /// # Errors
    ///
    /// Any upstream failure.
    fn search_hybrid(
        &self,
        query: &str,
        fields: &[String],
        vector: &[f32],
        top_k: usize,
    ) -> Result<RankedList, ServiceError>;
}
