//! Bulk generation: records are rendered concurrently in fixed-size
//! batches, and every record gets exactly one result in input order.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::render::{ImageCache, compose_with_cache};
use super::source::ImageSource;
use super::{ImageError, ImageTemplateSpec, RenderedImage};
use crate::config::ImageConfig;
use crate::events::RecordEvent;

/// One input row: the record id and the field values it contributes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageRecord {
    pub record_id: Uuid,
    #[schema(value_type = Object)]
    pub fields: JsonValue,
}

impl From<RecordEvent> for ImageRecord {
    fn from(record: RecordEvent) -> Self {
        Self {
            record_id: record.record_id,
            fields: record.variables,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ImageResult {
    pub record_id: Uuid,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<RenderedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageResult {
    fn from_outcome(record_id: Uuid, outcome: Result<RenderedImage, ImageError>) -> Self {
        match outcome {
            Ok(image) => Self {
                record_id,
                success: true,
                image: Some(image),
                error: None,
            },
            Err(err) => Self {
                record_id,
                success: false,
                image: None,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Clone)]
pub struct ImageGenerator {
    source: Arc<dyn ImageSource>,
    batch_size: usize,
    cache_capacity: NonZeroUsize,
}

impl ImageGenerator {
    pub fn new(source: Arc<dyn ImageSource>, config: &ImageConfig) -> Self {
        Self {
            source,
            batch_size: config.batch_size.max(1),
            cache_capacity: NonZeroUsize::new(config.cache_capacity).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Renders every record. A failing record never affects the others.
    pub async fn generate_batch(
        &self,
        spec: ImageTemplateSpec,
        records: Vec<ImageRecord>,
    ) -> Vec<ImageResult> {
        let started = Instant::now();
        let spec = Arc::new(spec);
        let cache: Arc<ImageCache> = Arc::new(RwLock::new(LruCache::new(self.cache_capacity)));
        let mut results = Vec::with_capacity(records.len());

        for chunk in records.chunks(self.batch_size) {
            let mut slots: Vec<Option<ImageResult>> = vec![None; chunk.len()];
            let mut tasks = JoinSet::new();

            for (index, record) in chunk.iter().cloned().enumerate() {
                let spec = Arc::clone(&spec);
                let source = Arc::clone(&self.source);
                let cache = Arc::clone(&cache);
                tasks.spawn(async move {
                    let outcome =
                        compose_with_cache(&spec, &record.fields, source.as_ref(), Some(&cache))
                            .await;
                    (index, ImageResult::from_outcome(record.record_id, outcome))
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, result)) => slots[index] = Some(result),
                    Err(err) => warn!(error = %err, "Image render task failed to join"),
                }
            }

            for (slot, record) in slots.into_iter().zip(chunk) {
                let result = slot.unwrap_or_else(|| {
                    ImageResult::from_outcome(
                        record.record_id,
                        Err(ImageError::Aborted("render task did not complete".to_string())),
                    )
                });
                results.push(result);
            }
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        counter!("images_generated_total", "outcome" => "success").increment(succeeded as u64);
        counter!("images_generated_total", "outcome" => "failure").increment(failed as u64);
        histogram!("image_batch_duration_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        debug!(records = results.len(), succeeded, failed, "Image batch completed");

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::source::LoadedImage;
    use crate::images::{Frame, ImageElement};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ImageSource for TrackingSource {
        async fn load(&self, _url: &str) -> Result<LoadedImage, ImageError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(LoadedImage {
                content_type: "image/png".to_string(),
                bytes: vec![1],
            })
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_batch_size() {
        let source = Arc::new(TrackingSource {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = ImageConfig {
            batch_size: 3,
            ..Default::default()
        };
        let generator = ImageGenerator::new(source.clone(), &config);
        let spec = ImageTemplateSpec {
            width: 100,
            height: 100,
            background: None,
            elements: vec![ImageElement::VariableImage {
                field: "photo".to_string(),
                frame: Frame {
                    x: 0,
                    y: 0,
                    width: 10,
                    height: 10,
                },
            }],
        };
        let records: Vec<ImageRecord> = (0..8)
            .map(|_| ImageRecord {
                record_id: Uuid::new_v4(),
                fields: json!({"photo": "https://cdn.test/p.png"}),
            })
            .collect();
        let ids: Vec<Uuid> = records.iter().map(|r| r.record_id).collect();

        let results = generator.generate_batch(spec, records).await;

        assert_eq!(results.iter().map(|r| r.record_id).collect::<Vec<_>>(), ids);
        assert!(results.iter().all(|r| r.success));
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn empty_input_yields_no_results() {
        let generator = ImageGenerator::new(
            Arc::new(TrackingSource {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            &ImageConfig::default(),
        );
        let spec = ImageTemplateSpec {
            width: 10,
            height: 10,
            background: None,
            elements: Vec::new(),
        };
        assert!(generator.generate_batch(spec, Vec::new()).await.is_empty());
    }
}
