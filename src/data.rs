use crate::config::SourceConfig;
use crate::error::{FetchError, ResolveError};
use crate::types::{RegionCollection, RegionFeature, SourceTier};
use geojson::feature::Id;
use geojson::{FeatureCollection, Geometry};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetches one endpoint and hands back its body.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("regions-map/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/geo+json, application/json")
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Tries every candidate in order and returns the first non-empty
/// FeatureCollection. Each candidate is requested at most once.
pub async fn resolve<T: Transport>(
    transport: &T,
    config: &SourceConfig,
) -> Result<RegionCollection, ResolveError> {
    let candidates = config.candidates();
    let mut last_err = None;

    for (url, tier) in &candidates {
        info!("Fetching regions from {} ({:?})", url, tier);

        let collection = match fetch_collection(transport, url).await {
            Ok(collection) => collection,
            Err(e) => {
                warn!("{}", e);
                last_err = Some(e);
                continue;
            }
        };

        let mut regions = RegionCollection::new(collection, url, *tier);
        if *tier == SourceTier::Fallback {
            for feature in regions.features.iter_mut() {
                normalize_properties(feature, config);
            }
        }
        info!("Loaded {} regions from {}", regions.len(), url);
        return Ok(regions);
    }

    Err(ResolveError::Exhausted {
        attempts: candidates.len(),
        last: last_err,
    })
}

async fn fetch_collection<T: Transport>(
    transport: &T,
    url: &str,
) -> Result<FeatureCollection, FetchError> {
    let body = transport.get_text(url).await?;
    parse_collection(url, &body)
}

/// Accepts any JSON object carrying a non-empty `features` array. Features
/// are read leniently: a missing or unreadable geometry becomes null, an
/// unusable `id` is dropped, entries that are not objects are skipped.
fn parse_collection(url: &str, body: &str) -> Result<FeatureCollection, FetchError> {
    let value: Value = serde_json::from_str(body).map_err(|e| FetchError::Body {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    let mut object = match value {
        Value::Object(object) => object,
        _ => {
            return Err(FetchError::NotCollection {
                url: url.to_string(),
            })
        }
    };

    let raw_features = match object.remove("features") {
        Some(Value::Array(features)) if !features.is_empty() => features,
        _ => {
            return Err(FetchError::NoFeatures {
                url: url.to_string(),
            })
        }
    };

    let total = raw_features.len();
    let features: Vec<RegionFeature> = raw_features
        .into_iter()
        .filter_map(|raw| match raw {
            Value::Object(object) => Some(lenient_feature(url, object)),
            _ => None,
        })
        .collect();

    if features.is_empty() {
        return Err(FetchError::NoFeatures {
            url: url.to_string(),
        });
    }
    if features.len() < total {
        debug!("{}: skipped {} non-object features", url, total - features.len());
    }

    let without_geometry = features.iter().filter(|f| f.geometry.is_none()).count();
    if without_geometry > 0 {
        debug!("{}: {} features have no geometry", url, without_geometry);
    }

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn lenient_feature(url: &str, mut object: Map<String, Value>) -> RegionFeature {
    let geometry = match object.remove("geometry") {
        None | Some(Value::Null) => None,
        Some(raw) => match Geometry::from_json_value(raw) {
            Ok(geometry) => Some(geometry),
            Err(e) => {
                debug!("{}: dropping unreadable geometry: {}", url, e);
                None
            }
        },
    };

    let id = match object.remove("id") {
        Some(Value::String(s)) => Some(Id::String(s)),
        Some(Value::Number(n)) => Some(Id::Number(n)),
        _ => None,
    };

    let properties = match object.remove("properties") {
        Some(Value::Object(properties)) => Some(properties),
        _ => None,
    };

    RegionFeature {
        bbox: None,
        geometry,
        id,
        properties,
        foreign_members: None,
    }
}

/// Aligns a fallback-source feature on the primary schema: copies the
/// alternate name into the canonical name field, and the first present
/// alternate code field into the canonical code field.
pub fn normalize_properties(feature: &mut RegionFeature, config: &SourceConfig) {
    let props = feature.properties.get_or_insert_with(Default::default);

    if !props.contains_key(&config.name_field) {
        if let Some(name) = props.get(&config.alt_name_field).cloned() {
            props.insert(config.name_field.clone(), name);
        }
    }

    if !props.contains_key(&config.code_field) {
        let code: Option<Value> = config
            .alt_code_fields
            .iter()
            .find_map(|key| props.get(key).cloned());
        if let Some(code) = code {
            props.insert(config.code_field.clone(), code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::HashMap;

    const ONE_REGION: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[-4.0, 48.0], [-1.0, 48.0], [-1.0, 49.0], [-4.0, 48.0]]]},
            "properties": {"nom": "Bretagne", "code": "53"}
        }]
    }"#;

    const FALLBACK_REGION: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Polygon", "coordinates": [[[8.5, 41.4], [9.6, 41.4], [9.6, 43.0], [8.5, 41.4]]]},
            "properties": {"name": "Corse", "code_region": "94", "id": "COR"}
        }]
    }"#;

    /// Serves canned bodies per URL and records every URL it was asked for.
    #[derive(Default)]
    struct MockTransport {
        responses: HashMap<String, Result<String, u16>>,
        contacted: RefCell<Vec<String>>,
    }

    impl MockTransport {
        fn with(mut self, url: &str, response: Result<&str, u16>) -> Self {
            self.responses
                .insert(url.to_string(), response.map(str::to_string));
            self
        }
    }

    impl Transport for MockTransport {
        async fn get_text(&self, url: &str) -> Result<String, FetchError> {
            self.contacted.borrow_mut().push(url.to_string());
            match self.responses.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(FetchError::Status {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(FetchError::Request {
                    url: url.to_string(),
                    message: "connection refused".to_string(),
                }),
            }
        }
    }

    fn source_config(primaries: &[&str], fallbacks: &[&str]) -> SourceConfig {
        SourceConfig {
            primary_urls: primaries.iter().map(|u| u.to_string()).collect(),
            fallback_urls: fallbacks.iter().map(|u| u.to_string()).collect(),
            ..SourceConfig::default()
        }
    }

    fn feature_with(properties: Value) -> RegionFeature {
        RegionFeature {
            bbox: None,
            geometry: None,
            id: None,
            properties: properties.as_object().cloned(),
            foreign_members: None,
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_valid_candidate() {
        let config = source_config(&["p1", "p2", "p3", "p4"], &["f1"]);
        let transport = MockTransport::default()
            .with("p1", Err(500))
            .with("p2", Ok("not json"))
            .with("p3", Ok(ONE_REGION))
            .with("p4", Ok(ONE_REGION))
            .with("f1", Ok(FALLBACK_REGION));

        let regions = resolve(&transport, &config).await.unwrap();

        assert_eq!(regions.source_url, "p3");
        assert_eq!(regions.tier, SourceTier::Primary);
        assert_eq!(regions.len(), 1);
        assert_eq!(*transport.contacted.borrow(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_non_collection_bodies() {
        let config = source_config(&["empty", "feature", "array"], &["f1"]);
        let transport = MockTransport::default()
            .with("empty", Ok(r#"{"type": "FeatureCollection", "features": []}"#))
            .with(
                "feature",
                Ok(r#"{"type": "Feature", "geometry": null, "properties": {}}"#),
            )
            .with("array", Ok("[1, 2, 3]"))
            .with("f1", Ok(FALLBACK_REGION));

        let regions = resolve(&transport, &config).await.unwrap();

        assert_eq!(regions.source_url, "f1");
        assert_eq!(transport.contacted.borrow().len(), 4);
    }

    #[tokio::test]
    async fn test_fallback_tier_is_normalized() {
        let config = source_config(&["p1"], &["f1", "f2"]);
        let transport = MockTransport::default()
            .with("p1", Err(404))
            .with("f1", Ok(FALLBACK_REGION));

        let regions = resolve(&transport, &config).await.unwrap();

        assert_eq!(regions.tier, SourceTier::Fallback);
        let feature = &regions.features[0];
        assert_eq!(feature.property("nom"), Some(&json!("Corse")));
        assert_eq!(feature.property("code"), Some(&json!("94")));
        assert_eq!(*transport.contacted.borrow(), vec!["p1", "f1"]);
    }

    #[tokio::test]
    async fn test_primary_tier_is_not_normalized() {
        let body = FALLBACK_REGION;
        let config = source_config(&["p1"], &[]);
        let transport = MockTransport::default().with("p1", Ok(body));

        let regions = resolve(&transport, &config).await.unwrap();

        let feature = &regions.features[0];
        assert!(!feature.contains_property("nom"));
        assert!(!feature.contains_property("code"));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let config = source_config(&["p1", "p2"], &["f1", "f2"]);
        let transport = MockTransport::default()
            .with("p1", Err(500))
            .with("p2", Ok("{}"))
            .with("f1", Err(502))
            .with("f2", Err(503));

        let err = resolve(&transport, &config).await.unwrap_err();

        match &err {
            ResolveError::Exhausted { attempts, last } => {
                assert_eq!(*attempts, 4);
                assert!(matches!(
                    last,
                    Some(FetchError::Status { status: 503, .. })
                ));
            }
        }
        assert!(err.to_string().contains("f2: HTTP 503"));
        assert_eq!(transport.contacted.borrow().len(), 4);
    }

    #[test]
    fn test_normalize_keeps_existing_fields() {
        let config = SourceConfig::default();
        let mut feature = feature_with(json!({
            "nom": "Grand Est",
            "name": "Great East",
            "code": "44",
            "code_insee": "99"
        }));

        normalize_properties(&mut feature, &config);

        assert_eq!(feature.property("nom"), Some(&json!("Grand Est")));
        assert_eq!(feature.property("code"), Some(&json!("44")));
    }

    #[test]
    fn test_normalize_code_precedence() {
        let config = SourceConfig::default();
        let mut feature = feature_with(json!({
            "id": "x",
            "code_region": "27",
            "code_insee": "27-insee"
        }));
        normalize_properties(&mut feature, &config);
        assert_eq!(feature.property("code"), Some(&json!("27-insee")));

        let mut feature = feature_with(json!({"id": 11}));
        normalize_properties(&mut feature, &config);
        assert_eq!(feature.property("code"), Some(&json!(11)));
    }

    #[test]
    fn test_normalize_missing_properties() {
        let config = SourceConfig::default();
        let mut feature = feature_with(Value::Null);

        normalize_properties(&mut feature, &config);

        assert_eq!(feature.properties, Some(serde_json::Map::new()));
    }
    #[test]
    fn test_collection_without_top_level_type() {
        let body = r#"{"features": [{"type": "Feature", "geometry": null, "properties": {"nom": "Corse"}}]}"#;

        let collection = parse_collection("u", body).unwrap();

        assert_eq!(collection.features.len(), 1);
        assert_eq!(collection.features[0].property("nom"), Some(&json!("Corse")));
    }

    #[test]
    fn test_loose_features_are_kept() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                {"properties": {"nom": "Bretagne"}},
                {"type": "Feature", "properties": {"nom": "Normandie"}, "id": true},
                {"geometry": {"type": "Blob"}, "properties": {"nom": "Corse"}, "id": 94},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [2.0, 48.0]}, "properties": null},
                "not a feature"
            ]
        }"#;

        let collection = parse_collection("u", body).unwrap();

        let features = &collection.features;
        assert_eq!(features.len(), 4);
        assert!(features[0].geometry.is_none());
        assert_eq!(features[1].property("nom"), Some(&json!("Normandie")));
        assert!(features[1].id.is_none());
        assert!(features[2].geometry.is_none());
        assert!(matches!(&features[2].id, Some(Id::Number(n)) if n.as_u64() == Some(94)));
        assert!(features[3].geometry.is_some());
        assert!(features[3].properties.is_none());
    }

    #[test]
    fn test_rejected_bodies() {
        assert!(matches!(parse_collection("u", "<html>"), Err(FetchError::Body { .. })));
        assert!(matches!(parse_collection("u", "[1]"), Err(FetchError::NotCollection { .. })));
        assert!(matches!(parse_collection("u", "{}"), Err(FetchError::NoFeatures { .. })));
        assert!(matches!(
            parse_collection("u", r#"{"features": {}}"#),
            Err(FetchError::NoFeatures { .. })
        ));
        assert!(matches!(
            parse_collection("u", r#"{"features": [1, 2]}"#),
            Err(FetchError::NoFeatures { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolver_accepts_loose_collection() {
        let config = source_config(&["p1", "p2"], &[]);
        let transport = MockTransport::default()
            .with("p1", Ok(r#"{"features": [{"properties": {"nom": "Bretagne", "code": "53"}}]}"#))
            .with("p2", Ok(ONE_REGION));

        let regions = resolve(&transport, &config).await.unwrap();

        assert_eq!(regions.source_url, "p1");
        assert_eq!(*transport.contacted.borrow(), vec!["p1"]);
    }
}

