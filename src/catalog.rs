// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Code -> value lookups for enumerated feature attributes.

use crate::models::FeatureTypeId;
use ahash::AHashMap as HashMap;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub type CodeValueMap = HashMap<u32, i64>;

/// Speed limit codes to km/h, used whenever the catalog cannot be reached.
const FALLBACK_SPEED_LIMITS: [(u32, i64); 12] = [
    (2726, 5),
    (2728, 20),
    (2730, 30),
    (2735, 40),
    (2738, 50),
    (2741, 60),
    (2744, 70),
    (2745, 80),
    (2746, 90),
    (5087, 100),
    (9721, 110),
    (19885, 120),
];

pub fn fallback_code_values() -> CodeValueMap {
    FALLBACK_SPEED_LIMITS.into_iter().collect()
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog has no code values for feature type {0}")]
    Empty(FeatureTypeId),
}

pub trait CodeValueSource: Send + Sync {
    fn code_values(
        &self,
        feature_type: FeatureTypeId,
    ) -> impl std::future::Future<Output = Result<CodeValueMap, CatalogError>> + Send;
}

#[derive(Deserialize, Debug)]
struct CodeValueEntry {
    code: u32,
    value: i64,
}

/// JSON catalog client. Expects `GET {base}/featuretypes/{id}/codevalues` to
/// return `[{"code": .., "value": ..}, ..]`.
#[derive(Clone, Debug)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl CodeValueSource for HttpCatalog {
    async fn code_values(&self, feature_type: FeatureTypeId) -> Result<CodeValueMap, CatalogError> {
        let url = format!("{}/featuretypes/{}/codevalues", self.base_url, feature_type);
        let entries = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<CodeValueEntry>>()
            .await?;

        if entries.is_empty() {
            return Err(CatalogError::Empty(feature_type));
        }
        Ok(entries.into_iter().map(|e| (e.code, e.value)).collect())
    }
}

/// Wraps a source and never fails: any catalog error yields the baked-in table.
pub struct CodeValueLookup<S> {
    source: Option<S>,
}

impl<S: CodeValueSource> CodeValueLookup<S> {
    pub fn new(source: Option<S>) -> Self {
        Self { source }
    }

    pub async fn code_value_map(&self, feature_type: FeatureTypeId) -> CodeValueMap {
        let Some(source) = &self.source else {
            return fallback_code_values();
        };
        match source.code_values(feature_type).await {
            Ok(map) => {
                info!("Loaded {} code values for feature type {}", map.len(), feature_type);
                map
            }
            Err(e) => {
                warn!(
                    "Code value lookup for feature type {} failed, using fallback table: {}",
                    feature_type, e
                );
                fallback_code_values()
            }
        }
    }
}
