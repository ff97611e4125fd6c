use crate::types::SourceTier;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed run configuration. There is no config file: `AppConfig::default()`
/// is the configuration, tests build their own values.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub output: OutputConfig,
    pub map: MapConfig,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub primary_urls: Vec<String>,
    pub fallback_urls: Vec<String>,
    pub timeout: Duration,
    pub name_field: String,
    pub alt_name_field: String,
    pub code_field: String,
    pub alt_code_fields: Vec<String>, // first present wins, order matters
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub html_file: PathBuf,
    pub pages_dir: String,
    pub page_extension: String,
}

#[derive(Debug, Clone)]
pub struct MapConfig {
    pub center: [f64; 2],
    pub zoom_start: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_url: String,
    pub tile_attribution: String,
    pub tile_name: String,
    pub control_scale: bool,
    pub prefer_canvas: bool,
    /// `[[south, west], [north, east]]`
    pub bounds: [[f64; 2]; 2],
    pub load_fit_padding: [u32; 2],
}

const PRIMARY_URLS: [&str; 6] = [
    "https://geo.api.gouv.fr/regions?format=geojson&geometry=contour&projection=WGS84",
    "https://geo.api.gouv.fr/regions?format=geojson&geometry=contours&projection=WGS84",
    "https://geo.api.gouv.fr/regions?format=geojson&geometry=contour",
    "https://geo.api.gouv.fr/regions?format=geojson&geometry=contours",
    "https://geo.api.gouv.fr/regions?format=geojson",
    "https://geo.api.gouv.fr/regions?projection=WGS84&format=geojson",
];

const FALLBACK_URLS: [&str; 2] = [
    "https://france-geojson.gregoiredavid.fr/repo/regions.geojson",
    "https://raw.githubusercontent.com/gregoiredavid/france-geojson/master/regions.geojson",
];

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            primary_urls: PRIMARY_URLS.iter().map(|u| u.to_string()).collect(),
            fallback_urls: FALLBACK_URLS.iter().map(|u| u.to_string()).collect(),
            timeout: Duration::from_secs(30),
            name_field: "nom".to_string(),
            alt_name_field: "name".to_string(),
            code_field: "code".to_string(),
            alt_code_fields: vec![
                "code_insee".to_string(),
                "code_region".to_string(),
                "id".to_string(),
            ],
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            html_file: PathBuf::from("index.html"),
            pages_dir: "Régions".to_string(),
            page_extension: "HTML".to_string(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: [46.6, 2.5],
            zoom_start: 5,
            min_zoom: 4,
            max_zoom: 12,
            tile_url: "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png".to_string(),
            tile_attribution: "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors &copy; <a href=\"https://carto.com/attributions\">CARTO</a>".to_string(),
            tile_name: "CartoDB positron".to_string(),
            control_scale: true,
            prefer_canvas: true,
            bounds: [[41.0, -5.5], [51.5, 10.0]],
            load_fit_padding: [20, 20],
        }
    }
}

impl SourceConfig {
    /// Every endpoint to try, in order: all primaries, then all fallbacks.
    pub fn candidates(&self) -> Vec<(&str, SourceTier)> {
        self.primary_urls
            .iter()
            .map(|u| (u.as_str(), SourceTier::Primary))
            .chain(
                self.fallback_urls
                    .iter()
                    .map(|u| (u.as_str(), SourceTier::Fallback)),
            )
            .collect()
    }
}
