use geojson::{Feature, FeatureCollection};
use serde_json::Value;

/// A region polygon plus its property bag (`nom`, `code`, enrichment fields).
pub type RegionFeature = Feature;

/// Which list of endpoints a collection was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    Primary,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct RegionCollection {
    pub features: Vec<RegionFeature>,
    pub source_url: String,
    pub tier: SourceTier,
}

impl RegionCollection {
    pub fn new(collection: FeatureCollection, source_url: &str, tier: SourceTier) -> Self {
        Self {
            features: collection.features,
            source_url: source_url.to_string(),
            tier,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn to_feature_collection(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.features.clone(),
            foreign_members: None,
        }
    }
}

/// Property keys written by the enricher.
pub mod props {
    pub const NAME: &str = "nom";
    pub const ALT_NAME: &str = "name";
    pub const CODE: &str = "code";
    pub const POPULATION: &str = "population";
    pub const AREA_KM2: &str = "surface_km2";
    pub const DENSITY: &str = "densite_km2";
    pub const POPULATION_SHARE_PCT: &str = "part_population_pct";
}

/// Join key of a feature: `nom`, else `name`. Empty strings don't count.
pub fn region_name(feature: &RegionFeature) -> Option<&str> {
    [props::NAME, props::ALT_NAME]
        .into_iter()
        .filter_map(|key| feature.property(key).and_then(Value::as_str))
        .find(|name| !name.is_empty())
}
