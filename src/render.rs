use crate::config::{AppConfig, MapConfig, OutputConfig};
use crate::types::{props, region_name, RegionCollection};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::info;

const MAP_ID: &str = "map_regions";

/// One fill color per density range, lower bound inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityBucket {
    pub lower: f64,
    pub color: &'static str,
    pub label: &'static str,
}

/// Sorted by `lower`. The first bucket is open below.
pub const DENSITY_BUCKETS: [DensityBucket; 6] = [
    DensityBucket { lower: f64::NEG_INFINITY, color: "#D4EEFF", label: "< 50" },
    DensityBucket { lower: 50.0, color: "#9BD1FF", label: "50–100" },
    DensityBucket { lower: 100.0, color: "#6FB2FF", label: "100–150" },
    DensityBucket { lower: 150.0, color: "#3D7CFF", label: "150–250" },
    DensityBucket { lower: 250.0, color: "#2E6EEA", label: "250–500" },
    DensityBucket { lower: 500.0, color: "#1F4DBF", label: "≥ 500" },
];

/// Fill for regions without a usable density.
pub const NO_DENSITY_COLOR: &str = "#9AA5B1";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<&'static str>,
    pub color: &'static str,
    pub weight: u32,
    pub fill_opacity: f64,
}

pub fn base_style(density: Option<f64>) -> FeatureStyle {
    FeatureStyle {
        fill_color: Some(density_color(density)),
        color: "#1F4DBF",
        weight: 1,
        fill_opacity: 0.35,
    }
}

pub const HIGHLIGHT_STYLE: FeatureStyle = FeatureStyle {
    fill_color: None,
    color: "#3D7CFF",
    weight: 3,
    fill_opacity: 0.55,
};

/// (property, label) pairs shown on hover.
const TOOLTIP_FIELDS: [(&str, &str); 2] = [(props::NAME, "Région"), (props::CODE, "Code")];

/// (property, label) pairs shown on click.
const POPUP_FIELDS: [(&str, &str); 6] = [
    (props::NAME, "Région"),
    (props::CODE, "Code"),
    (props::POPULATION, "Population"),
    (props::AREA_KM2, "Surface (km²)"),
    (props::DENSITY, "Densité (hab/km²)"),
    (props::POPULATION_SHARE_PCT, "Part pop. (%)"),
];

pub fn density_color(density: Option<f64>) -> &'static str {
    match density {
        Some(d) if !d.is_nan() => DENSITY_BUCKETS
            .iter()
            .rev()
            .find(|bucket| d >= bucket.lower)
            .map_or(NO_DENSITY_COLOR, |bucket| bucket.color),
        _ => NO_DENSITY_COLOR,
    }
}

/// Reads a density property. Numeric strings are accepted, anything else is
/// treated as missing.
pub fn density_value(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Percent-encodes like the browser's `encodeURIComponent`.
pub fn encode_uri_component(input: &str) -> String {
    // urlencoding also escapes these, encodeURIComponent leaves them as is
    urlencoding::encode(input)
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%2A", "*")
}

/// Relative link to the detail page of a region, e.g. `Régions/Corse.HTML`.
pub fn page_path(pages_dir: &str, name: &str, extension: &str) -> String {
    format!("{}/{}.{}", pages_dir, encode_uri_component(name), extension)
}

/// Renders the map and writes it to `output_path`.
pub fn render(regions: &RegionCollection, config: &AppConfig, output_path: &Path) -> Result<()> {
    let document = render_document(regions, config)?;
    fs::write(output_path, document)
        .with_context(|| format!("Failed to write map document: {:?}", output_path))?;
    info!("Wrote {} regions to {:?}", regions.len(), output_path);
    Ok(())
}

pub fn render_document(regions: &RegionCollection, config: &AppConfig) -> Result<String> {
    let geojson = embedded_geojson(regions, &config.output)?;
    let map = &config.map;

    let document = fill(
        DOCUMENT_TEMPLATE,
        &[
            ("title_panel", title_panel(&config.output)),
            ("legend_panel", legend_panel()),
            ("map_script", map_script(map)?),
            ("behavior_script", behavior_script(map, &config.output)?),
            ("map_id", MAP_ID.to_string()),
            // last, so region names are never scanned for placeholders
            ("regions", geojson),
        ],
    );
    Ok(document)
}

/// Copy of the collection with the computed `_style` and `_page` of every
/// feature added to its properties. Safe to inline in a `<script>`.
fn embedded_geojson(regions: &RegionCollection, output: &OutputConfig) -> Result<String> {
    let mut collection = regions.to_feature_collection();

    for feature in collection.features.iter_mut() {
        let density = density_value(feature.property(props::DENSITY));
        let page = region_name(feature)
            .map(|name| page_path(&output.pages_dir, name, &output.page_extension));

        feature.set_property("_style", serde_json::to_value(base_style(density))?);
        if let Some(page) = page {
            feature.set_property("_page", page);
        }
    }

    let json = serde_json::to_string(&collection).context("Failed to serialize regions")?;
    Ok(json.replace("</", "<\\/"))
}

fn fill(template: &str, values: &[(&str, String)]) -> String {
    values.iter().fold(template.to_string(), |doc, (key, value)| {
        doc.replace(&format!("{{{{{}}}}}", key), value)
    })
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn field_list(fields: &[(&str, &str)]) -> Value {
    Value::Array(fields.iter().map(|(key, label)| json!([key, label])).collect())
}

fn title_panel(output: &OutputConfig) -> String {
    let pattern = format!("{}/NOM_DE_LA_RÉGION.{}", output.pages_dir, output.page_extension);
    TITLE_PANEL.replace("{{page_pattern}}", &escape_html(&pattern))
}

fn legend_panel() -> String {
    let rows: String = DENSITY_BUCKETS
        .iter()
        .map(|bucket| {
            format!(
                r#"
      <div style="display:flex; gap:6px; align-items:center;">
        <span style="display:inline-block;width:18px;height:12px;background:{};border:1px solid #1F4DBF33;"></span><span>{}</span>
      </div>"#,
                bucket.color,
                escape_html(bucket.label)
            )
        })
        .collect();
    LEGEND_PANEL.replace("{{rows}}", &rows)
}

fn map_script(map: &MapConfig) -> Result<String> {
    let options = json!({
        "center": map.center,
        "zoom": map.zoom_start,
        "minZoom": map.min_zoom,
        "maxZoom": map.max_zoom,
        "preferCanvas": map.prefer_canvas,
        "zoomControl": true,
    });
    let tiles = json!({
        "attribution": map.tile_attribution,
        "minZoom": map.min_zoom,
        "maxZoom": map.max_zoom,
        "subdomains": "abcd",
    });

    Ok(fill(
        MAP_SCRIPT,
        &[
            ("highlight", serde_json::to_string(&HIGHLIGHT_STYLE)?),
            ("tooltip_fields", field_list(&TOOLTIP_FIELDS).to_string()),
            ("popup_fields", field_list(&POPUP_FIELDS).to_string()),
            ("map_options", options.to_string()),
            ("tile_url", serde_json::to_string(&map.tile_url)?),
            ("tile_name", serde_json::to_string(&map.tile_name)?),
            ("tile_options", tiles.to_string()),
            ("scale_control", map.control_scale.to_string()),
            ("bounds", serde_json::to_string(&map.bounds)?),
        ],
    ))
}

fn behavior_script(map: &MapConfig, output: &OutputConfig) -> Result<String> {
    Ok(fill(
        BEHAVIOR_SCRIPT,
        &[
            ("bounds", serde_json::to_string(&map.bounds)?),
            ("padding", serde_json::to_string(&map.load_fit_padding)?),
            ("pages_dir", serde_json::to_string(&output.pages_dir)?),
            ("page_extension", serde_json::to_string(&output.page_extension)?),
        ],
    ))
}

const DOCUMENT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="fr">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=no" />
  <title>Carte des régions de France</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" crossorigin="" />
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js" crossorigin=""></script>
  <style>
    html, body { width: 100%; height: 100%; margin: 0; padding: 0; }
    #{{map_id}} { position: absolute; top: 0; bottom: 0; right: 0; left: 0; }
    .region-fields th { text-align: left; padding-right: 8px; font-weight: 600; }
  </style>
</head>
<body>
  <div id="{{map_id}}"></div>
{{title_panel}}
{{legend_panel}}
{{map_script}}
{{behavior_script}}
</body>
</html>
"#;

const TITLE_PANEL: &str = r#"    <div style="position: fixed; top: 12px; left: 12px; right: 12px; z-index: 9999;
                 max-width: 680px;
                 background: rgba(11,19,32,0.78); color: #eaeef7; padding: 12px 14px;
                 border-radius: 10px; border: 1px solid rgba(255,255,255,0.25);
                 font-family: system-ui, -apple-system, Segoe UI, Roboto, Ubuntu, Cantarell;
                 font-size: 14px;">
      <div style="font-size:16px; font-weight:600; margin-bottom:4px;">
        Densité de population des régions de France : carte interactive
      </div>
      <div style="opacity:.95; line-height:1.35;">
        Population, surface et densité indicatives par région (hab/km²).
        Survolez une région pour la mettre en évidence, puis cliquez pour ouvrir la page
        régionale correspondante&nbsp;: <b>{{page_pattern}}</b>.
      </div>
    </div>"#;

const LEGEND_PANEL: &str = r#"    <div style="position: fixed; bottom: 12px; left: 12px; z-index: 9999;
                background: rgba(11,19,32,0.78); color: #eaeef7; padding: 10px 12px;
                border-radius: 10px; border: 1px solid rgba(255,255,255,0.25);
                font-family: system-ui, -apple-system, Segoe UI, Roboto, Ubuntu, Cantarell;
                font-size: 12px; line-height: 1.2;">
      <div style="font-weight:600; margin-bottom:6px;">Densité (hab/km²)</div>{{rows}}
    </div>"#;

const MAP_SCRIPT: &str = r#"  <script>
    var regionsData = {{regions}};
    var highlightStyle = {{highlight}};
    var tooltipFields = {{tooltip_fields}};
    var popupFields = {{popup_fields}};

    function escapeHtml(text) {
      return String(text)
        .replace(/&/g, '&amp;')
        .replace(/</g, '&lt;')
        .replace(/>/g, '&gt;')
        .replace(/"/g, '&quot;');
    }

    function formatValue(value, localize) {
      if (value === null || value === undefined) return '';
      if (localize && typeof value === 'number') return escapeHtml(value.toLocaleString());
      return escapeHtml(value);
    }

    function fieldTable(properties, fields, localize) {
      var rows = fields.map(function(field) {
        return '<tr><th>' + escapeHtml(field[1]) + '</th><td>'
          + formatValue(properties[field[0]], localize) + '</td></tr>';
      });
      return '<table class="region-fields">' + rows.join('') + '</table>';
    }

    var {{map_id}} = L.map('{{map_id}}', {{map_options}});
    if ({{scale_control}}) {
      L.control.scale().addTo({{map_id}});
    }

    var baseTiles = L.tileLayer({{tile_url}}, {{tile_options}}).addTo({{map_id}});

    var regionsLayer = L.geoJson(regionsData, {
      style: function(feature) {
        return (feature.properties && feature.properties._style) || {};
      },
      onEachFeature: function(feature, layer) {
        var properties = feature.properties || {};
        layer.bindTooltip(function() {
          return fieldTable(properties, tooltipFields, false);
        }, { sticky: true });
        layer.bindPopup(function() {
          return fieldTable(properties, popupFields, true);
        });
        layer.on('mouseover', function(e) { e.target.setStyle(highlightStyle); });
        layer.on('mouseout', function(e) { regionsLayer.resetStyle(e.target); });
      }
    }).addTo({{map_id}});

    {{map_id}}.fitBounds({{bounds}});

    var baseLayers = {};
    baseLayers[{{tile_name}}] = baseTiles;
    L.control.layers(baseLayers, { 'Régions': regionsLayer }, { collapsed: true }).addTo({{map_id}});
  </script>"#;

const BEHAVIOR_SCRIPT: &str = r#"  <script>
    window.addEventListener('load', function() {
      var map = window['{{map_id}}'];

      try {
        if (map && typeof L !== 'undefined' && L.latLngBounds) {
          map.fitBounds(L.latLngBounds({{bounds}}), { padding: {{padding}} });
        }
      } catch (e) {}

      function attach(layer) {
        if (!layer) return;
        var f = layer.feature;
        if (f && f.properties && f.properties.nom) {
          layer.on('click', function() {
            var url = f.properties._page
              || ({{pages_dir}} + '/' + encodeURIComponent(f.properties.nom) + '.' + {{page_extension}});
            window.location.href = url;
          });
          layer.on('mouseover', function() {
            try { map.getContainer().style.cursor = 'pointer'; } catch (e) {}
          });
          layer.on('mouseout', function() {
            try { map.getContainer().style.cursor = ''; } catch (e) {}
          });
        }
      }

      if (map && typeof map.eachLayer === 'function') {
        map.eachLayer(function(l) {
          if (typeof l.eachLayer === 'function') {
            l.eachLayer(function(sl) { attach(sl); });
          } else {
            attach(l);
          }
        });
      }
    });
  </script>"#;
