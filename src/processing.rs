use crate::types::{props, region_name, RegionCollection};
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionEntry {
    pub name: &'static str,
    pub population: u64,
    pub area_km2: f64,
}

const fn entry(name: &'static str, population: u64, area_km2: f64) -> RegionEntry {
    RegionEntry {
        name,
        population,
        area_km2,
    }
}

// Indicative orders of magnitude, not census figures.
const FRANCE_REGIONS: [RegionEntry; 18] = [
    entry("Île-de-France", 12_271_794, 12_012.0),
    entry("Auvergne-Rhône-Alpes", 8_078_271, 69_711.0),
    entry("Nouvelle-Aquitaine", 6_073_000, 84_036.0),
    entry("Occitanie", 5_999_000, 72_724.0),
    entry("Grand Est", 5_549_000, 57_441.0),
    entry("Hauts-de-France", 6_006_000, 31_813.0),
    entry("Provence-Alpes-Côte d'Azur", 5_098_000, 31_400.0),
    entry("Pays de la Loire", 3_883_000, 32_082.0),
    entry("Bretagne", 3_420_000, 27_208.0),
    entry("Centre-Val de Loire", 2_573_000, 39_151.0),
    entry("Bourgogne-Franche-Comté", 2_807_000, 47_784.0),
    entry("Normandie", 3_330_000, 29_906.0),
    entry("Corse", 351_000, 8_680.0),
    entry("Guadeloupe", 376_000, 1_628.0),
    entry("Martinique", 353_000, 1_128.0),
    entry("Guyane", 294_000, 83_846.0),
    entry("La Réunion", 859_000, 2_512.0),
    entry("Mayotte", 310_000, 376.0),
];

/// Static region name → (population, area) table, the right-hand side of the
/// join. Lookups are by exact name.
#[derive(Debug, Clone, Copy)]
pub struct MetadataTable {
    entries: &'static [RegionEntry],
}

impl MetadataTable {
    pub const fn new(entries: &'static [RegionEntry]) -> Self {
        Self { entries }
    }

    pub const fn france() -> Self {
        Self::new(&FRANCE_REGIONS)
    }

    pub fn get(&self, name: &str) -> Option<&RegionEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn total_population(&self) -> u64 {
        self.entries.iter().map(|e| e.population).sum()
    }

    pub fn entries(&self) -> &[RegionEntry] {
        self.entries
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub matched: usize,
    pub unmatched: usize,
}

/// Population per km², one decimal. `None` when the area is zero.
pub fn density(population: u64, area_km2: f64) -> Option<f64> {
    if area_km2 > 0.0 {
        Some(round_to(population as f64 / area_km2, 1))
    } else {
        None
    }
}

/// Share of `total` in percent, two decimals. `None` when `total` is zero.
pub fn population_share_pct(population: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(round_to(100.0 * population as f64 / total as f64, 2))
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Writes population, area, density and population share onto every feature
/// whose name is in `table`. Unmatched features are left untouched.
pub fn enrich(regions: &mut RegionCollection, table: &MetadataTable) -> EnrichSummary {
    let total_population = table.total_population();
    let mut summary = EnrichSummary::default();

    for feature in regions.features.iter_mut() {
        let meta = match region_name(feature).and_then(|name| table.get(name)) {
            Some(meta) => *meta,
            None => {
                debug!("No metadata for region {:?}", region_name(feature));
                summary.unmatched += 1;
                continue;
            }
        };

        feature.set_property(props::POPULATION, meta.population);
        feature.set_property(props::AREA_KM2, meta.area_km2);
        feature.set_property(
            props::DENSITY,
            density(meta.population, meta.area_km2).map_or(Value::Null, |d| json!(d)),
        );
        if let Some(share) = population_share_pct(meta.population, total_population) {
            feature.set_property(props::POPULATION_SHARE_PCT, share);
        }
        summary.matched += 1;
    }

    info!(
        "Enriched {} regions ({} without metadata)",
        summary.matched, summary.unmatched
    );
    summary
}
