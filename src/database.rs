use crate::chunking::TextChunk;
use crate::gemini::Embedding;
use anyhow::{Context, Result};
use log::{debug, info};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    UpsertPointsBuilder, Value, VectorParams,
};
use qdrant_client::Qdrant;
use serde_json::json;
use std::collections::HashMap;
use std::env;
use uuid::Uuid;

/// Configuration for Qdrant
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl QdrantConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let url = env::var("QDRANT_URL")?;
        let api_key = env::var("QDRANT_API_KEY").ok();

        Ok(QdrantConfig { url, api_key })
    }
}

/// Client for the collection holding every indexed document chunk
pub struct QdrantClient {
    client: Qdrant,
    collection_name: String,
}

impl QdrantClient {
    /// Create a new Qdrant client
    pub async fn new(config: &QdrantConfig, collection_name: &str) -> Result<Self> {
        let config_builder = Qdrant::from_url(&config.url);
        let config_builder = if let Some(api_key) = &config.api_key {
            config_builder.api_key(api_key.clone())
        } else {
            config_builder
        };

        let client = config_builder.build()?;

        Ok(QdrantClient {
            client,
            collection_name: collection_name.to_string(),
        })
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        match self.client.collection_info(&self.collection_name).await {
            Ok(_) => Ok(true),
            Err(qdrant_client::QdrantError::ResponseError { status })
                if status.code() == tonic::Code::NotFound =>
            {
                Ok(false)
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to check collection existence: {}",
                e
            )),
        }
    }

    /// Create the collection unless it already exists
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<()> {
        if self.collection_exists().await? {
            info!("Using existing collection: {}", self.collection_name);
            return Ok(());
        }

        let create_collection = CreateCollectionBuilder::new(self.collection_name.clone())
            .vectors_config(VectorParams {
                size: vector_size,
                distance: Distance::Cosine.into(),
                ..Default::default()
            });

        self.client
            .create_collection(create_collection)
            .await
            .with_context(|| format!("Failed to create collection {}", self.collection_name))?;

        info!("Created collection: {}", self.collection_name);
        Ok(())
    }

    /// Remove every chunk belonging to the given documents
    pub async fn delete_documents(&self, document_ids: &[String]) -> Result<()> {
        if document_ids.is_empty() {
            return Ok(());
        }

        let request = DeletePointsBuilder::new(self.collection_name.clone())
            .points(document_filter(document_ids))
            .wait(true);

        self.client.delete_points(request).await.with_context(|| {
            format!(
                "Failed to delete points in collection {}",
                self.collection_name
            )
        })?;

        debug!("Deleted points of {} documents", document_ids.len());
        Ok(())
    }

    /// Replace the stored chunks of every document that appears in `chunks`
    pub async fn replace_documents(
        &self,
        chunks: Vec<TextChunk>,
        embeddings: Vec<Embedding>,
    ) -> Result<()> {
        let mut document_ids: Vec<String> = chunks.iter().map(|c| c.document_id.clone()).collect();
        document_ids.dedup();
        self.delete_documents(&document_ids).await?;

        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let payload: HashMap<String, Value> = serde_json::from_value(json!({
                "text": chunk.text,
                "document_id": chunk.document_id,
                "start_position": chunk.start_position,
                "chunk_index": chunk.chunk_index,
            }))
            .context("Failed to build point payload")?;

            let id = point_id(&chunk.document_id, chunk.chunk_index);
            points.push(PointStruct::new(id, embedding.values, payload));
        }

        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let upsert_request = UpsertPointsBuilder::new(self.collection_name.clone(), points).wait(true);

        self.client
            .upsert_points(upsert_request)
            .await
            .with_context(|| {
                format!(
                    "Failed to upsert points in collection {}",
                    self.collection_name
                )
            })?;

        debug!("Upserted {} points", count);
        Ok(())
    }

    /// Search for relevant chunks
    pub async fn search(&self, query_embedding: Embedding, limit: u64) -> Result<Vec<TextChunk>> {
        use qdrant_client::qdrant::{with_payload_selector, SearchPoints, WithPayloadSelector};

        let search_request = SearchPoints {
            collection_name: self.collection_name.clone(),
            vector: query_embedding.values,
            limit,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(with_payload_selector::SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .with_context(|| format!("Failed to search collection {}", self.collection_name))?;

        // Points without a text payload are skipped.
        let chunks = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let payload = scored_point.payload;
                let text = payload.get("text")?.as_str()?.to_string();
                let document_id = payload.get("document_id")?.as_str()?.to_string();
                let integer_field = |name: &str| {
                    payload
                        .get(name)
                        .and_then(|v| v.as_integer())
                        .map(|v| v as usize)
                        .unwrap_or(0)
                };

                Some(TextChunk {
                    token_count: crate::chunking::estimate_token_count(&text),
                    start_position: integer_field("start_position"),
                    chunk_index: integer_field("chunk_index"),
                    text,
                    document_id,
                })
            })
            .collect();

        Ok(chunks)
    }
}

/// Filter matching every point whose `document_id` payload is one of `document_ids`
fn document_filter(document_ids: &[String]) -> Filter {
    Filter::must([Condition::matches("document_id", document_ids.to_vec())])
}

/// Stable point id for a chunk, so re-indexing a document overwrites it
fn point_id(document_id: &str, chunk_index: usize) -> String {
    let name = format!("{}#{}", document_id, chunk_index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
