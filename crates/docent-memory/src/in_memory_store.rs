use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::vector_store::{
    BoxFuture, FieldValue, Payload, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore,
    VectorStoreError,
};

/// Snapshot file kept inside the data directory of a persistent store.
pub const SNAPSHOT_FILE: &str = "vectors.json";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: Payload,
}

#[derive(Serialize, Deserialize)]
struct Collection {
    dimensions: usize,
    points: HashMap<String, StoredPoint>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    collections: &'a HashMap<String, Collection>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    collections: HashMap<String, Collection>,
}

/// Brute-force cosine-similarity store kept in process memory, optionally
/// mirrored to a JSON snapshot on disk.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    snapshot_path: Option<PathBuf>,
    persist_lock: AsyncMutex<()>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            snapshot_path: None,
            persist_lock: AsyncMutex::new(()),
        }
    }

    /// Store backed by [`SNAPSHOT_FILE`] in `data_dir`. An existing snapshot
    /// is loaded; every change rewrites it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the snapshot
    /// cannot be read or parsed.
    pub async fn with_persistence(data_dir: &Path) -> Result<Self, VectorStoreError> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| persist_error(data_dir, &e))?;
        let path = data_dir.join(SNAPSHOT_FILE);

        let collections = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let snapshot: Snapshot = serde_json::from_str(&content)
                    .map_err(|e| persist_error(&path, &e))?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(VectorStoreError::Persist(format!(
                        "{}: unsupported snapshot version {}",
                        path.display(),
                        snapshot.version
                    )));
                }
                let points: usize = snapshot.collections.values().map(|c| c.points.len()).sum();
                tracing::info!("loaded {points} vectors from {}", path.display());
                snapshot.collections
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(persist_error(&path, &e)),
        };

        Ok(Self {
            collections: RwLock::new(collections),
            snapshot_path: Some(path),
            persist_lock: AsyncMutex::new(()),
        })
    }

    #[must_use]
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Rewrite the snapshot through a temp file and rename. No-op without
    /// persistence.
    async fn persist(&self) -> Result<(), VectorStoreError> {
        let Some(path) = self.snapshot_path.as_deref() else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;

        let content = {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Persist(e.to_string()))?;
            serde_json::to_string(&SnapshotRef {
                version: SNAPSHOT_VERSION,
                collections: &cols,
            })
            .map_err(|e| persist_error(path, &e))?
        };

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| persist_error(&tmp, &e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| persist_error(path, &e))?;
        tracing::debug!("vector snapshot written to {}", path.display());
        Ok(())
    }
}

fn persist_error(path: &Path, e: &dyn std::fmt::Display) -> VectorStoreError {
    VectorStoreError::Persist(format!("{}: {e}", path.display()))
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .field("snapshot_path", &self.snapshot_path)
            .finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn matches_filter(payload: &Payload, filter: &VectorFilter) -> bool {
    let hit = |cond: &crate::vector_store::FieldCondition| {
        payload
            .get(&cond.field)
            .is_some_and(|val| field_matches(val, &cond.value))
    };
    filter.must.iter().all(hit) && !filter.must_not.iter().any(hit)
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
    }
}

fn check_dimensions(name: &str, col: &Collection, actual: usize) -> Result<(), VectorStoreError> {
    if col.dimensions == actual {
        Ok(())
    } else {
        Err(VectorStoreError::Dimension {
            collection: name.to_owned(),
            expected: col.dimensions,
            actual,
        })
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: usize,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            {
                let mut cols = self
                    .collections
                    .write()
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
                if let Some(col) = cols.get(&collection) {
                    return check_dimensions(&collection, col, vector_size);
                }
                tracing::debug!("creating collection {collection} ({vector_size} dimensions)");
                cols.insert(
                    collection,
                    Collection {
                        dimensions: vector_size,
                        points: HashMap::new(),
                    },
                );
            }
            self.persist().await
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let removed = {
                let mut cols = self
                    .collections
                    .write()
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
                cols.remove(&collection).is_some()
            };
            if removed {
                self.persist().await?;
            }
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            {
                let mut cols = self
                    .collections
                    .write()
                    .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
                let col = cols.get_mut(&collection).ok_or_else(|| {
                    VectorStoreError::Upsert(format!("collection {collection} not found"))
                })?;
                for p in &points {
                    check_dimensions(&collection, col, p.vector.len())?;
                }
                for p in points {
                    col.points.insert(
                        p.id,
                        StoredPoint {
                            vector: p.vector,
                            payload: p.payload,
                        },
                    );
                }
            }
            self.persist().await
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;
            check_dimensions(&collection, col, vector.len())?;

            let filter = filter.unwrap_or_default();
            let mut scored: Vec<ScoredVectorPoint> = col
                .points
                .iter()
                .filter(|(_, sp)| matches_filter(&sp.payload, &filter))
                .map(|(id, sp)| ScoredVectorPoint {
                    id: id.clone(),
                    score: cosine_similarity(&vector, &sp.vector),
                    payload: sp.payload.clone(),
                })
                .collect();

            // ties broken by id so equal scores come back in a stable order
            scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            scored.truncate(limit);
            Ok(scored)
        })
    }

    fn delete_by_filter(
        &self,
        collection: &str,
        filter: VectorFilter,
    ) -> BoxFuture<'_, Result<usize, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let removed = {
                let mut cols = self
                    .collections
                    .write()
                    .map_err(|e| VectorStoreError::Delete(e.to_string()))?;
                let Some(col) = cols.get_mut(&collection) else {
                    return Ok(0);
                };
                let before = col.points.len();
                col.points.retain(|_, sp| !matches_filter(&sp.payload, &filter));
                before - col.points.len()
            };
            if removed > 0 {
                self.persist().await?;
            }
            Ok(removed)
        })
    }

    fn distinct_values(
        &self,
        collection: &str,
        field: &str,
    ) -> BoxFuture<'_, Result<BTreeSet<String>, VectorStoreError>> {
        let collection = collection.to_owned();
        let field = field.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(cols
                .get(&collection)
                .map(|col| {
                    col.points
                        .values()
                        .filter_map(|sp| sp.payload.get(&field)?.as_str().map(str::to_owned))
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<usize, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            Ok(cols.get(&collection).map_or(0, |col| col.points.len()))
        })
    }
}
