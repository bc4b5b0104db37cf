use crate::chunking::split_into_chunks;
use crate::database::{QdrantClient, QdrantConfig};
use crate::errors::{IngestError, IngestResult};
use crate::gateway::IndexGateway;
use crate::gemini::GeminiClient;
use anyhow::Context;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Retrieval engine backed by Qdrant for storage and Gemini for embeddings
/// and answer generation
pub struct RagGateway {
    qdrant_config: QdrantConfig,
    collection_name: String,
    vector_size: u64,
    gemini: GeminiClient,
    qdrant: RwLock<Option<Arc<QdrantClient>>>,
}

impl RagGateway {
    pub fn new(
        qdrant_config: QdrantConfig,
        collection_name: &str,
        vector_size: u64,
        gemini: GeminiClient,
    ) -> Self {
        RagGateway {
            qdrant_config,
            collection_name: collection_name.to_string(),
            vector_size,
            gemini,
            qdrant: RwLock::new(None),
        }
    }

    async fn qdrant(&self) -> IngestResult<Arc<QdrantClient>> {
        self.qdrant
            .read()
            .await
            .clone()
            .ok_or(IngestError::NotInitialized)
    }
}

#[async_trait]
impl IndexGateway for RagGateway {
    async fn initialize(&self) -> IngestResult<()> {
        let mut qdrant = self.qdrant.write().await;
        if qdrant.is_some() {
            return Ok(());
        }

        info!("Connecting to Qdrant at {}", self.qdrant_config.url);
        let client = QdrantClient::new(&self.qdrant_config, &self.collection_name)
            .await
            .context("Failed to initialize Qdrant client")?;
        client.ensure_collection(self.vector_size).await?;

        *qdrant = Some(Arc::new(client));
        Ok(())
    }

    async fn upsert(&self, ids: &[String], contents: &[String]) -> IngestResult<()> {
        let qdrant = self.qdrant().await?;
        info!("Inserting/updating {} documents", ids.len());

        let mut chunks = Vec::new();
        let mut embeddings = Vec::new();
        let mut empty_documents = Vec::new();

        for (id, content) in ids.iter().zip(contents) {
            let document_chunks = split_into_chunks(content, id);
            if document_chunks.is_empty() {
                empty_documents.push(id.clone());
                continue;
            }

            for chunk in document_chunks {
                let embedding = self
                    .gemini
                    .get_embedding(&chunk.text)
                    .await
                    .with_context(|| format!("Failed to embed document {}", id))?;
                chunks.push(chunk);
                embeddings.push(embedding);
            }
        }

        // A document updated to empty text keeps no chunks.
        if !empty_documents.is_empty() {
            warn!("{} documents have no indexable text", empty_documents.len());
            qdrant.delete_documents(&empty_documents).await?;
        }

        info!("Storing {} chunks", chunks.len());
        qdrant.replace_documents(chunks, embeddings).await?;
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> IngestResult<()> {
        let qdrant = self.qdrant().await?;
        qdrant.delete_documents(ids).await?;
        info!("Deletion of {} documents complete", ids.len());
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> IngestResult<Option<String>> {
        let qdrant = self.qdrant().await?;

        let question_embedding = self
            .gemini
            .get_embedding(text)
            .await
            .context("Failed to embed query")?;
        let chunks = qdrant.search(question_embedding, top_k as u64).await?;

        if chunks.is_empty() {
            info!("No relevant information found for query");
            return Ok(None);
        }

        let context = chunks
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<&str>>()
            .join("\n\n");

        let answer = self.gemini.generate_answer(&context, text).await?;
        Ok(Some(answer))
    }

    async fn shutdown(&self) -> IngestResult<()> {
        if self.qdrant.write().await.take().is_some() {
            info!("Closed connection to collection {}", self.collection_name);
        }
        Ok(())
    }
}
