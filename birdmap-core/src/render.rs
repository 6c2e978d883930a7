//! Turns a batch of observations into one self-contained HTML page.
//!
//! Rendering is pure: the same observations, query and timestamp always give
//! the same bytes. Markers keep input order; legend and layers are sorted by
//! species name.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::RenderConfig,
    model::{NotableQuery, Observation},
};

pub mod template;

use template::{MAP_TEMPLATE, fill};

pub const EMPTY_NOTICE: &str = "No current notable birds for the selected window.";

#[derive(Debug, Clone)]
pub struct MapRenderer {
    zoom_start: u8,
    species_layer_threshold: usize,
    archive_url: Option<String>,
}

impl Default for MapRenderer {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl MapRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            zoom_start: config.zoom_start,
            species_layer_threshold: config.species_layer_threshold,
            archive_url: config.archive_url.clone().filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn render(
        &self,
        query: &NotableQuery,
        observations: &[Observation],
        generated_at: DateTime<Utc>,
    ) -> String {
        let palette: BTreeMap<&str, String> = distinct_species(observations)
            .into_iter()
            .map(|name| (name, species_color(name)))
            .collect();

        let headline = format!(
            "eBird Notable \u{2022} {} km radius \u{2022} last {} day(s)",
            query.radius_km, query.back_days
        );
        let page_title = format!("eBird Notable - {} km radius", query.radius_km);
        let built = generated_at.format("%b %d, %Y %H:%M UTC").to_string();

        let archive_link = self
            .archive_url
            .as_deref()
            .map(|url| {
                format!(
                    r#"<a href="{}" target="_blank" rel="noopener">Archive</a>"#,
                    escape_html(url)
                )
            })
            .unwrap_or_default();

        let notice = if observations.is_empty() {
            format!("  <div id=\"notice\" class=\"panel\">{EMPTY_NOTICE}</div>\n")
        } else {
            String::new()
        };

        let legend = legend_html(&palette);
        let map_data = self.map_data(query, observations, &palette);

        fill(
            MAP_TEMPLATE,
            &[
                ("page_title", page_title.as_str()),
                ("headline", headline.as_str()),
                ("built", built.as_str()),
                ("archive_link", archive_link.as_str()),
                ("notice", notice.as_str()),
                ("legend", legend.as_str()),
                ("map_data", map_data.as_str()),
            ],
        )
    }

    fn map_data(
        &self,
        query: &NotableQuery,
        observations: &[Observation],
        palette: &BTreeMap<&str, String>,
    ) -> String {
        let species: Vec<Value> = palette
            .iter()
            .map(|(name, color)| json!({ "name": escape_html(name), "color": color }))
            .collect();

        let markers: Vec<Value> = observations
            .iter()
            .map(|obs| {
                json!({
                    "lat": obs.coordinate.lat,
                    "lon": obs.coordinate.lon,
                    "species": escape_html(&obs.common_name),
                    "color": palette.get(obs.common_name.as_str()),
                    "popup": popup_html(obs),
                })
            })
            .collect();

        let data = json!({
            "center": { "lat": query.center.lat, "lon": query.center.lon },
            "zoom": self.zoom_start,
            "radiusKm": query.radius_km,
            "groupBySpecies": palette.len() <= self.species_layer_threshold,
            "species": species,
            "markers": markers,
        });

        // `<` only occurs inside JSON strings, where < is equivalent and
        // cannot terminate the enclosing script element.
        data.to_string().replace('<', "\\u003c")
    }
}

/// Sorted, de-duplicated common names.
pub fn distinct_species(observations: &[Observation]) -> BTreeSet<&str> {
    observations.iter().map(|o| o.common_name.as_str()).collect()
}

/// Stable color for a species: SHA-256 of the name picks a hue, saturation
/// and lightness are fixed.
pub fn species_color(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let hue = digest.iter().fold(0u32, |acc, b| (acc * 256 + u32::from(*b)) % 360);
    let (r, g, b) = hsl_to_rgb(f64::from(hue), 0.70, 0.45);

    format!("#{r:02x}{g:02x}{b:02x}")
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;

    let (r, g, b) = match h as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    let byte = |v: f64| ((v + m) * 255.0) as u8;
    (byte(r), byte(g), byte(b))
}

fn popup_html(obs: &Observation) -> String {
    let count = obs.how_many.map_or_else(|| "Unknown".to_string(), |n| n.to_string());

    let checklist = obs
        .checklist_url()
        .map(|url| {
            format!(
                r#" [<a href="{}" target="_blank" rel="noopener">Checklist</a>]"#,
                escape_html(&url)
            )
        })
        .unwrap_or_default();

    let scientific = obs
        .scientific_name
        .as_deref()
        .map(|name| format!("<div><i>{}</i></div>", escape_html(name)))
        .unwrap_or_default();

    format!(
        "<div class=\"sighting-popup\"><div><b>Location:</b> {}</div><hr>\
         <div><b>{}</b> ({}) on {}{}</div>{}</div>",
        escape_html(&obs.location_name),
        escape_html(&obs.common_name),
        count,
        obs.observed_at,
        checklist,
        scientific,
    )
}

fn legend_html(palette: &BTreeMap<&str, String>) -> String {
    if palette.is_empty() {
        return "    <div class=\"legend-item\">No species</div>".to_string();
    }

    palette
        .iter()
        .map(|(name, color)| {
            format!(
                "    <div class=\"legend-item\"><span class=\"swatch\" style=\"background:{color};\"></span><span>{}</span></div>",
                escape_html(name)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
