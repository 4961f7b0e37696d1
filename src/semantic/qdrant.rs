//! Qdrant vector store over its REST API.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::errors::PrepError;
use crate::semantic::embeddings::Embedder;
use crate::semantic::store::{ScoredText, VectorStore};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Payload key holding the stored text
const CONTENT_KEY: &str = "page_content";

pub struct QdrantStore {
    client: reqwest::blocking::Client,
    base: url::Url,
}

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, serde_json::Value>>,
}

impl QdrantStore {
    pub fn new(host: &str, port: u16) -> Result<Self, PrepError> {
        let raw = format!("http://{host}:{port}/");
        let base = url::Url::parse(&raw)
            .map_err(|e| PrepError::config(format!("vector store address '{raw}': {e}")))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<url::Url, PrepError> {
        self.base
            .join(path)
            .map_err(|e| PrepError::VectorStore(format!("bad request path '{path}': {e}")))
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> Result<T, PrepError> {
        let resp = request.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            log::warn!("qdrant request failed: status={status} body={body}");
            return Err(PrepError::VectorStore(format!("qdrant returned {status}: {body}")));
        }

        let parsed: QdrantResponse<T> = resp.json()?;
        parsed
            .result
            .ok_or_else(|| PrepError::VectorStore("qdrant response has no result".to_string()))
    }

    fn point_count(&self, collection: &str) -> Result<u64, PrepError> {
        let url = self.url(&format!("collections/{collection}/points/count"))?;
        let count: CountResult = self.send(self.client.post(url).json(&json!({ "exact": true })))?;
        Ok(count.count)
    }
}

impl VectorStore for QdrantStore {
    fn collection_exists(&mut self, collection: &str) -> Result<bool, PrepError> {
        let url = self.url(&format!("collections/{collection}/exists"))?;
        let result: ExistsResult = self.send(self.client.get(url))?;
        Ok(result.exists)
    }

    fn drop_collection(&mut self, collection: &str) -> Result<bool, PrepError> {
        let url = self.url(&format!("collections/{collection}"))?;
        self.send(self.client.delete(url))
    }

    fn create_collection(&mut self, collection: &str, dimensions: usize) -> Result<(), PrepError> {
        let url = self.url(&format!("collections/{collection}"))?;
        let body = json!({
            "vectors": { "size": dimensions, "distance": "Cosine" },
        });
        let created: bool = self.send(self.client.put(url).json(&body))?;
        if !created {
            return Err(PrepError::VectorStore(format!(
                "qdrant did not create collection '{collection}'"
            )));
        }
        Ok(())
    }

    fn upsert_texts(
        &mut self,
        collection: &str,
        texts: &[String],
        embedder: &dyn Embedder,
    ) -> Result<usize, PrepError> {
        if texts.is_empty() {
            return Ok(0);
        }

        let embeddings = embedder.embed_batch(texts)?;
        if embeddings.len() != texts.len() {
            return Err(PrepError::VectorStore(format!(
                "embedder returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }

        // ids continue after the points already stored
        let first_id = self.point_count(collection)?;
        let points: Vec<serde_json::Value> = texts
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, vector))| {
                json!({
                    "id": first_id + i as u64,
                    "vector": vector,
                    "payload": { CONTENT_KEY: text, "metadata": {} },
                })
            })
            .collect();

        let mut url = self.url(&format!("collections/{collection}/points"))?;
        url.set_query(Some("wait=true"));
        let _: serde_json::Value = self.send(self.client.put(url).json(&json!({ "points": points })))?;

        Ok(texts.len())
    }

    fn similarity_search(
        &mut self,
        collection: &str,
        query: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredText>, PrepError> {
        if k == 0 {
            return Ok(vec![]);
        }

        let vector = embedder.embed(query)?;
        let url = self.url(&format!("collections/{collection}/points/search"))?;
        let body = json!({
            "vector": vector,
            "limit": k,
            "with_payload": true,
        });
        let points: Vec<ScoredPoint> = self.send(self.client.post(url).json(&body))?;

        Ok(points
            .into_iter()
            .map(|point| {
                let text = point
                    .payload
                    .as_ref()
                    .and_then(|p| p.get(CONTENT_KEY))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                ScoredText {
                    text,
                    score: point.score,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_urls() {
        let store = QdrantStore::new("localhost", 6333).unwrap();

        assert_eq!(
            store.url("collections/all-MiniLM-L6-v2/exists").unwrap().as_str(),
            "http://localhost:6333/collections/all-MiniLM-L6-v2/exists"
        );
    }

    #[test]
    fn test_bad_host_is_config_error() {
        assert!(matches!(
            QdrantStore::new("bad host", 6333),
            Err(PrepError::Config(_))
        ));
    }

    #[test]
    fn test_search_result_parsing() {
        let raw = r#"{"result":[{"id":3,"version":1,"score":0.91,"payload":{"page_content":"Approve invoice","metadata":{}}}],"status":"ok","time":0.001}"#;
        let parsed: QdrantResponse<Vec<ScoredPoint>> = serde_json::from_str(raw).unwrap();
        let points = parsed.result.unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].score, 0.91);
        assert_eq!(
            points[0].payload.as_ref().unwrap()["page_content"],
            "Approve invoice"
        );
    }

    #[test]
    fn test_count_and_exists_parsing() {
        let count: QdrantResponse<CountResult> =
            serde_json::from_str(r#"{"result":{"count":12},"status":"ok","time":0.0}"#).unwrap();
        assert_eq!(count.result.unwrap().count, 12);

        let exists: QdrantResponse<ExistsResult> =
            serde_json::from_str(r#"{"result":{"exists":false},"status":"ok","time":0.0}"#).unwrap();
        assert!(!exists.result.unwrap().exists);
    }
}
