//! REST gateway backed by reqwest

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client,
};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use super::{EntityFilter, EntityGateway};
use crate::config::RelationsConfig;
use crate::entity::{EntityRecord, EntityType};
use crate::error::{RelationError, RelationResult};

/// Entity gateway talking to the sports database REST API
#[derive(Clone)]
pub struct HttpEntityGateway {
    base_url: Url,
    client: Client,
}

impl HttpEntityGateway {
    /// Create a gateway from the relations configuration
    pub fn new(config: &RelationsConfig) -> RelationResult<Self> {
        let base_url = parse_base_url(&config.api_base_url)?;
        let headers = build_headers(config.api_token.as_deref())?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                RelationError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { base_url, client })
    }

    /// Collection URL with the filter applied as a query pair
    pub fn endpoint(&self, entity_type: EntityType, filter: &EntityFilter) -> RelationResult<Url> {
        let mut url = self
            .base_url
            .join(&entity_type.collection_path())
            .map_err(|e| RelationError::Configuration(format!("Invalid endpoint: {}", e)))?;

        let (field, value) = filter.query_pair();
        url.query_pairs_mut().append_pair(&field, &value);
        Ok(url)
    }
}

/// Normalize the base URL so relative joins keep its last path segment
fn parse_base_url(raw: &str) -> RelationResult<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash)
        .map_err(|e| RelationError::Configuration(format!("Invalid API base URL '{}': {}", raw, e)))
}

fn build_headers(token: Option<&str>) -> RelationResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    if let Some(token) = token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                RelationError::Configuration(format!("Invalid API token format: {}", e))
            })?,
        );
    }

    Ok(headers)
}

/// Accept either a bare JSON array or a `{ "data": [...] }` envelope
fn decode_records(body: Value) -> RelationResult<Vec<EntityRecord>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut envelope) => match envelope.remove("data") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(RelationError::Serialization(
                    "response object has no 'data' array".to_string(),
                ))
            }
        },
        other => {
            return Err(RelationError::Serialization(format!(
                "expected a JSON array of records, got {}",
                other
            )))
        }
    };

    items.into_iter().map(EntityRecord::from_value).collect()
}

#[async_trait]
impl EntityGateway for HttpEntityGateway {
    async fn fetch(
        &self,
        entity_type: EntityType,
        filter: &EntityFilter,
    ) -> RelationResult<Vec<EntityRecord>> {
        let url = self.endpoint(entity_type, filter)?;
        debug!(%entity_type, %url, "Fetching entities");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(%entity_type, %url, status = status.as_u16(), "Entity fetch failed");
            return Err(RelationError::transport(
                Some(status.as_u16()),
                if message.is_empty() {
                    status.to_string()
                } else {
                    message
                },
            ));
        }

        let body: Value = response.json().await?;
        decode_records(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gateway(base_url: &str) -> HttpEntityGateway {
        let config = RelationsConfig {
            api_base_url: base_url.to_string(),
            ..RelationsConfig::default()
        };
        HttpEntityGateway::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let gateway = gateway("http://localhost:8000/api/v1");
        let url = gateway
            .endpoint(EntityType::League, &EntityFilter::ids(["league-1"]))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/leagues?id=league-1");
    }

    #[test]
    fn test_endpoint_encodes_multi_value_filter() {
        let gateway = gateway("http://localhost:8000/api/v1/");
        let url = gateway
            .endpoint(
                EntityType::DivisionConference,
                &EntityFilter::ids(["dc-1", "dc-2"]),
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/v1/division-conferences?id=dc-1%2Cdc-2"
        );
    }

    #[test]
    fn test_endpoint_for_listing() {
        let gateway = gateway("https://sports.example.com/api");
        let url = gateway
            .endpoint(EntityType::Stadium, &EntityFilter::all(50))
            .unwrap();
        assert_eq!(url.as_str(), "https://sports.example.com/api/stadiums?limit=50");
    }

    #[test]
    fn test_invalid_base_url() {
        let config = RelationsConfig {
            api_base_url: "not a url".to_string(),
            ..RelationsConfig::default()
        };
        assert!(matches!(
            HttpEntityGateway::new(&config),
            Err(RelationError::Configuration(_))
        ));
    }

    #[test]
    fn test_decode_array_and_envelope() {
        let records = decode_records(json!([{"id": "a", "name": "A"}])).unwrap();
        assert_eq!(records.len(), 1);

        let records =
            decode_records(json!({"data": [{"id": 1, "name": "B"}], "total": 1})).unwrap();
        assert_eq!(records[0].id(), "1");

        assert!(decode_records(json!({"items": []})).is_err());
        assert!(decode_records(json!("nope")).is_err());
    }
}
