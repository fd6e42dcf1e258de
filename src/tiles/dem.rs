//! Elevation lookup from terrain-RGB tiles.
//!
//! Reads run at a fixed zoom; when the tile is not cached the lookup
//! returns NaN immediately and queues the download, falling back one and
//! two zoom levels in the meantime so a coarse answer arrives before the
//! fine one. Successive fixes usually land on the same pixel, so the last
//! decoded pixel is kept as a one-entry cache.

use parking_lot::Mutex;
use tracing::debug;

use crate::tiles::cache::{TileCache, TileState};
use crate::tiles::coords;
use crate::tiles::fetcher::{TileFetcher, TileRequest};
use crate::tiles::LayerConfig;

/// How far below the fixed zoom the fallback may go.
const ZOOM_FALLBACK: u8 = 2;

/// Pixel encoding of the elevation tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemEncoding {
    /// Japan GSI DEM png: signed 0.01 m steps, 2^23 marks no-data.
    JapanGsi,
    /// Mapbox terrain-rgb: -10000 + 0.1 m steps.
    MapboxTerrainRgb,
    /// Maptiler/terrarium: 1/256 m steps offset by 32768.
    Maptiler,
}

impl DemEncoding {
    pub fn decode(self, r: u8, g: u8, b: u8) -> f64 {
        let v = ((r as u32) << 16 | (g as u32) << 8 | b as u32) as f64;
        match self {
            DemEncoding::JapanGsi => {
                const NO_DATA: f64 = 8388608.0; // 2^23
                if v < NO_DATA {
                    v * 0.01
                } else if v == NO_DATA {
                    f64::NAN
                } else {
                    (v - 16777216.0) * 0.01 // 2^24
                }
            }
            DemEncoding::MapboxTerrainRgb => -10000.0 + v * 0.1,
            DemEncoding::Maptiler => v / 256.0 - 32768.0,
        }
    }
}

struct LastPixel {
    z: u8,
    tile_x: i64,
    tile_y: i64,
    x_in_tile: u32,
    y_in_tile: u32,
    altitude: f64,
}

pub struct DemReader {
    layer: LayerConfig,
    encoding: DemEncoding,
    cache: TileCache,
    fetcher: TileFetcher,
    last: Mutex<Option<LastPixel>>,
}

impl DemReader {
    pub fn new(
        layer: LayerConfig,
        encoding: DemEncoding,
        cache: TileCache,
        fetcher: TileFetcher,
    ) -> Self {
        Self {
            layer,
            encoding,
            cache,
            fetcher,
            last: Mutex::new(None),
        }
    }

    /// Terrain altitude at a coordinate [m], NaN when not (yet) known.
    /// A cache miss queues the tile download as a side effect.
    pub fn altitude(&self, lon: f64, lat: f64) -> f64 {
        if lon.is_nan() || lat.is_nan() {
            return f64::NAN;
        }
        let fix_zoom = self.layer.fix_zoom.unwrap_or(15);

        for step in 0..=ZOOM_FALLBACK {
            let zoom = fix_zoom.saturating_sub(step);
            if zoom < self.layer.min_zoom || zoom == 0 {
                break;
            }
            let p = coords::tile_pixel(zoom, lon, lat, self.layer.tile_size);

            if let Some(last) = self.last.lock().as_ref() {
                if last.z == zoom
                    && last.tile_x == p.tile_x
                    && last.tile_y == p.tile_y
                    && last.x_in_tile == p.x_in_tile
                    && last.y_in_tile == p.y_in_tile
                {
                    return last.altitude;
                }
            }

            match self.cache.state(&self.layer, zoom, p.tile_x, p.tile_y) {
                TileState::Present => {
                    if let Some(alt) = self.decode_pixel(zoom, &p) {
                        *self.last.lock() = Some(LastPixel {
                            z: zoom,
                            tile_x: p.tile_x,
                            tile_y: p.tile_y,
                            x_in_tile: p.x_in_tile,
                            y_in_tile: p.y_in_tile,
                            altitude: alt,
                        });
                        return alt;
                    }
                }
                TileState::NotFound | TileState::InFlight => {}
                TileState::Absent | TileState::Error => {
                    self.request(zoom, step, p.tile_x, p.tile_y);
                }
            }
        }
        f64::NAN
    }

    fn decode_pixel(&self, zoom: u8, p: &coords::TilePixel) -> Option<f64> {
        let path = self.cache.tile_path(&self.layer, zoom, p.tile_x, p.tile_y);
        let img = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "tile decode failed");
                self.cache.mark_error(&self.layer, zoom, p.tile_x, p.tile_y);
                return None;
            }
        };
        if p.x_in_tile >= img.width() || p.y_in_tile >= img.height() {
            return None;
        }
        let px = img.get_pixel(p.x_in_tile, p.y_in_tile);
        let alt = self.encoding.decode(px[0], px[1], px[2]);
        if alt.is_nan() {
            return None;
        }
        Some(alt)
    }

    fn request(&self, zoom: u8, step: u8, x: i64, y: i64) {
        // fallback zooms go through the retry endpoint when there is one
        let mut layer = self.layer.clone();
        if step > 0 {
            if let Some(retry) = &self.layer.retry_url {
                layer.url = retry.clone();
            }
        }
        self.fetcher.enqueue(vec![TileRequest { layer, z: zoom, x, y }]);
    }
}
