//! Slippy-map tile handling: on-disk cache, batched fetcher and
//! terrain-RGB elevation lookup.

pub mod cache;
pub mod coords;
pub mod dem;
pub mod fetcher;

use serde::{Deserialize, Serialize};

/// One configured tile source.
///
/// `url` carries `{z}`/`{x}`/`{y}` placeholders plus optional `{basetime}`,
/// `{validtime}` and `{s}` (subdomain). Time-enabled overlays (weather
/// radar) set `basetime`/`validtime`; their cached tiles live under a
/// basetime subdirectory so stale frames can be swept in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    pub name: String,
    pub url: String,
    /// Fallback template used when a tile is missing at the primary zoom.
    pub retry_url: Option<String>,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Zoom all lookups are pinned to (elevation layers).
    pub fix_zoom: Option<u8>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub basetime: Option<String>,
    pub validtime: Option<String>,
    pub subdomains: Vec<String>,
    pub tile_size: u32,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            retry_url: None,
            min_zoom: 0,
            max_zoom: 18,
            fix_zoom: None,
            referer: None,
            user_agent: None,
            basetime: None,
            validtime: None,
            subdomains: Vec::new(),
            tile_size: 256,
        }
    }
}

impl LayerConfig {
    /// File extension of the cached tiles; raw-pixel endpoints still store
    /// plain png.
    pub fn tile_ext(&self) -> &str {
        let ext = self
            .url
            .rsplit('.')
            .next()
            .map(|e| e.split(&['?', '{'][..]).next().unwrap_or("png"))
            .unwrap_or("png");
        match ext {
            "pngraw" | "" => "png",
            e => e,
        }
    }

    /// Expand the URL template for one tile.
    pub fn tile_url(&self, z: u8, x: i64, y: i64) -> String {
        self.expand(&self.url, z, x, y)
    }

    fn expand(&self, template: &str, z: u8, x: i64, y: i64) -> String {
        let mut url = template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());
        if let Some(bt) = &self.basetime {
            url = url.replace("{basetime}", bt);
        }
        if let Some(vt) = &self.validtime {
            url = url.replace("{validtime}", vt);
        }
        if !self.subdomains.is_empty() {
            // spread load over subdomains deterministically per tile
            let pick = ((x + y) as usize) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[pick]);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(url: &str) -> LayerConfig {
        LayerConfig {
            name: "test".into(),
            url: url.into(),
            ..LayerConfig::default()
        }
    }

    #[test]
    fn url_placeholders_are_expanded() {
        let l = layer("https://tile.example.com/{z}/{x}/{y}.png");
        assert_eq!(
            l.tile_url(15, 29081, 12913),
            "https://tile.example.com/15/29081/12913.png"
        );
    }

    #[test]
    fn pngraw_is_stored_as_png() {
        let l = layer("https://api.example.com/v4/terrain/{z}/{x}/{y}.pngraw?key=abc");
        assert_eq!(l.tile_ext(), "png");
        let plain = layer("https://tile.example.com/{z}/{x}/{y}.jpg");
        assert_eq!(plain.tile_ext(), "jpg");
    }

    #[test]
    fn time_enabled_layers_expand_their_times() {
        let mut l = layer("https://radar.example.com/{basetime}/{validtime}/{z}/{x}/{y}.png");
        l.basetime = Some("20230928133000".into());
        l.validtime = Some("20230928134500".into());
        assert_eq!(
            l.tile_url(8, 227, 100),
            "https://radar.example.com/20230928133000/20230928134500/8/227/100.png"
        );
    }

    #[test]
    fn subdomain_choice_is_deterministic() {
        let mut l = layer("https://{s}.tile.example.com/{z}/{x}/{y}.png");
        l.subdomains = vec!["a".into(), "b".into()];
        assert_eq!(l.tile_url(10, 2, 2), l.tile_url(10, 2, 2));
        assert!(l.tile_url(10, 2, 3).contains("b.tile"));
    }
}
