//! Page shell for the rendered map.
//!
//! Placeholders are `{{name}}` and are substituted in a single pass by
//! [`fill`]. Everything dynamic reaches the page either pre-escaped or through
//! the `map-data` JSON block.

pub const MAP_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{page_title}}</title>

  <!-- Leaflet 1.9.4 -->
  <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.css" crossorigin="anonymous"
    referrerpolicy="no-referrer" />
  <script src="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.js" crossorigin="anonymous"
    referrerpolicy="no-referrer"></script>

  <!-- Leaflet.markercluster 1.4.1 -->
  <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.4.1/dist/MarkerCluster.css" />
  <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.4.1/dist/MarkerCluster.Default.css" />
  <script src="https://unpkg.com/leaflet.markercluster@1.4.1/dist/leaflet.markercluster.js"></script>

  <!-- Map controls -->
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/leaflet.fullscreen@3.0.0/Control.FullScreen.css" />
  <script src="https://cdn.jsdelivr.net/npm/leaflet.fullscreen@3.0.0/Control.FullScreen.min.js"></script>
  <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/leaflet-minimap/3.6.1/Control.MiniMap.css" />
  <script src="https://cdnjs.cloudflare.com/ajax/libs/leaflet-minimap/3.6.1/Control.MiniMap.js"></script>
  <link rel="stylesheet" href="https://cdn.jsdelivr.net/gh/ljagis/leaflet-measure@2.1.7/dist/leaflet-measure.min.css" />
  <script src="https://cdn.jsdelivr.net/gh/ljagis/leaflet-measure@2.1.7/dist/leaflet-measure.min.js"></script>
  <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/leaflet-locatecontrol/0.66.2/L.Control.Locate.min.css" />
  <script src="https://cdnjs.cloudflare.com/ajax/libs/leaflet-locatecontrol/0.66.2/L.Control.Locate.min.js"></script>

  <style>
    html, body { height: 100%; margin: 0; font-family: system-ui, sans-serif; }
    #map { position: absolute; inset: 0; }
    .panel {
      position: fixed;
      background: rgba(255, 255, 255, 0.95);
      border: 1px solid #999;
      border-radius: 6px;
      box-shadow: 0 1px 4px rgba(0, 0, 0, 0.2);
    }
    #title {
      top: 10px;
      left: 50%;
      transform: translateX(-50%);
      padding: 8px 12px;
      z-index: 1000;
      font-size: 14px;
    }
    #title .headline { font-weight: 600; }
    #title .meta {
      display: flex;
      gap: 12px;
      justify-content: space-between;
      align-items: center;
      margin-top: 4px;
      font-size: 12px;
    }
    #title .meta a { text-decoration: none; }
    #legend {
      bottom: 16px;
      right: 16px;
      z-index: 1000;
      padding: 8px 10px;
      border-color: #888;
      max-height: 70vh;
      max-width: 28vw;
      overflow-y: auto;
      overflow-x: hidden;
      resize: vertical;
    }
    #legend .legend-title { font-weight: 600; margin-bottom: 6px; }
    #legend .legend-item { display: flex; align-items: center; margin: 2px 0; font-size: 12px; line-height: 1.2; }
    #legend .swatch {
      display: inline-block;
      width: 12px;
      height: 12px;
      margin-right: 6px;
      border: 1px solid #333;
      flex: 0 0 12px;
    }
    #notice {
      top: 50%;
      left: 50%;
      transform: translate(-50%, -50%);
      padding: 10px 14px;
      z-index: 1500;
      font-size: 14px;
    }
    .sighting-dot {
      width: 14px;
      height: 14px;
      border-radius: 50%;
      border: 1.5px solid #222;
      box-sizing: border-box;
    }
    .ring-label { font-size: 11px; white-space: nowrap; }
    .mouse-position {
      background: rgba(255, 255, 255, 0.8);
      padding: 0 5px;
      font-size: 11px;
      min-width: 180px;
    }
    .sighting-popup { font-size: 13px; }
    .sighting-popup hr { margin: 6px 0; }
  </style>
</head>
<body>
  <div id="map"></div>

  <div id="title" class="panel">
    <div class="headline">{{headline}}</div>
    <div class="meta">
      <span>Built: {{built}}</span>
      {{archive_link}}
    </div>
  </div>
{{notice}}
  <div id="legend" class="panel">
    <div class="legend-title">Species Legend</div>
{{legend}}
  </div>

  <script type="application/json" id="map-data">{{map_data}}</script>
  <script>
    (function () {
      const data = JSON.parse(document.getElementById('map-data').textContent);
      const center = [data.center.lat, data.center.lon];

      const tiles = 'https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png';
      const attribution = '&copy; OpenStreetMap contributors';

      const map = L.map('map', { center: center, zoom: data.zoom });
      L.control.scale().addTo(map);
      L.tileLayer(tiles, { maxZoom: 19, attribution: attribution }).addTo(map);

      L.control.fullscreen().addTo(map);
      new L.Control.MiniMap(L.tileLayer(tiles, { attribution: attribution }), {
        toggleDisplay: true,
        position: 'bottomleft'
      }).addTo(map);
      new L.Control.Measure({
        primaryLengthUnit: 'kilometers',
        secondaryLengthUnit: 'miles',
        primaryAreaUnit: 'sqmeters',
        secondaryAreaUnit: 'acres'
      }).addTo(map);
      // Not started until the visitor asks; the map stays on the configured center.
      L.control.locate({ keepCurrentZoomLevel: false }).addTo(map);

      const MousePosition = L.Control.extend({
        options: { position: 'bottomleft' },
        onAdd: function (target) {
          const box = L.DomUtil.create('div', 'mouse-position');
          target.on('mousemove', function (e) {
            box.textContent = 'Lat, Lon: ' + e.latlng.lat.toFixed(5) + ' , ' + e.latlng.lng.toFixed(5);
          });
          return box;
        }
      });
      new MousePosition().addTo(map);

      L.circleMarker(center, {
        radius: 4, color: '#2c7fb8', fill: true, fillOpacity: 1
      }).bindTooltip('Center').addTo(map);

      const ringLabel = function (lonOffset, text, color) {
        L.marker([center[0], center[1] + lonOffset], {
          interactive: false,
          icon: L.divIcon({
            className: '',
            html: '<div class="ring-label" style="color:' + color + ';">' + text + '</div>'
          })
        }).addTo(map);
      };

      L.circle(center, {
        radius: data.radiusKm * 1000, color: '#08519c', fill: false, weight: 3, opacity: 0.9
      }).addTo(map);
      ringLabel(0.09 * data.radiusKm / 10, '~' + data.radiusKm + ' km', '#08519c');

      L.circle(center, {
        radius: 1000, color: '#000000', fill: false, weight: 2, opacity: 0.9, dashArray: '5,5'
      }).addTo(map);
      ringLabel(0.009, '1 km', '#000');

      L.circle(center, {
        radius: 5000, color: '#555555', fill: false, weight: 2, opacity: 0.9, dashArray: '5,7'
      }).addTo(map);
      ringLabel(0.045, '5 km', '#555');

      const overlays = {};
      const groups = {};
      const shared = data.groupBySpecies ? null : L.markerClusterGroup();
      if (shared) {
        shared.addTo(map);
        overlays['Notable sightings'] = shared;
      } else {
        data.species.forEach(function (sp) {
          const group = L.markerClusterGroup();
          group.addTo(map);
          groups[sp.name] = group;
          overlays[sp.name] = group;
        });
      }

      data.markers.forEach(function (m) {
        const icon = L.divIcon({
          className: '',
          html: '<div class="sighting-dot" style="background:' + m.color + ';"></div>',
          iconSize: [14, 14],
          iconAnchor: [7, 7]
        });
        const marker = L.marker([m.lat, m.lon], { icon: icon })
          .bindTooltip(m.species)
          .bindPopup(m.popup, { maxWidth: 320 });
        (shared || groups[m.species]).addLayer(marker);
      });

      L.control.layers(null, overlays, { collapsed: false }).addTo(map);
    })();
  </script>
</body>
</html>
"#;

/// Substitute `{{name}}` placeholders in one left-to-right pass. Inserted
/// values are never rescanned. Unknown placeholders are kept verbatim.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        match values.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push_str("{{");
                out.push_str(name);
                out.push_str("}}");
            }
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_known_placeholders() {
        assert_eq!(fill("a {{x}} b {{y}}", &[("x", "1"), ("y", "2")]), "a 1 b 2");
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        assert_eq!(fill("{{x}}{{y}}", &[("x", "{{y}}"), ("y", "Y")]), "{{y}}Y");
    }

    #[test]
    fn unknown_and_unterminated_placeholders_are_kept() {
        assert_eq!(fill("{{nope}} and {{open", &[]), "{{nope}} and {{open");
    }

    #[test]
    fn template_has_every_slot() {
        for slot in ["page_title", "headline", "built", "archive_link", "notice", "legend", "map_data"] {
            assert!(MAP_TEMPLATE.contains(&format!("{{{{{slot}}}}}")), "missing {slot}");
        }
    }
}
