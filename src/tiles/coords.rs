//! Web-Mercator tile arithmetic.

use std::f64::consts::PI;

/// Tile containing a coordinate plus the pixel position inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePixel {
    pub tile_x: i64,
    pub tile_y: i64,
    pub x_in_tile: u32,
    pub y_in_tile: u32,
}

/// Tile and in-tile pixel of a lon/lat at `zoom`.
pub fn tile_pixel(zoom: u8, lon: f64, lat: f64, tile_size: u32) -> TilePixel {
    let n = (1u64 << zoom) as f64;
    let fx = (lon + 180.0) / 360.0 * n;
    let fy = (1.0 - lat.to_radians().tan().asinh() / PI) / 2.0 * n;
    let tile_x = fx.floor();
    let tile_y = fy.floor();
    TilePixel {
        tile_x: tile_x as i64,
        tile_y: tile_y as i64,
        x_in_tile: ((fx - tile_x) * tile_size as f64) as u32,
        y_in_tile: ((fy - tile_y) * tile_size as f64) as u32,
    }
}

/// North-west corner of a tile, as (lon, lat).
pub fn tile_nw_corner(zoom: u8, tile_x: i64, tile_y: i64) -> (f64, f64) {
    let n = (1u64 << zoom) as f64;
    let lon = tile_x as f64 / n * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * tile_y as f64 / n)).sinh().atan().to_degrees();
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greenwich_equator_is_the_middle_tile() {
        let p = tile_pixel(1, 0.0, 0.0, 256);
        assert_eq!((p.tile_x, p.tile_y), (1, 1));
        assert_eq!((p.x_in_tile, p.y_in_tile), (0, 0));
    }

    #[test]
    fn known_tokyo_tile_at_zoom_15() {
        // Tokyo station, a widely used reference point
        let p = tile_pixel(15, 139.767125, 35.681236, 256);
        assert_eq!((p.tile_x, p.tile_y), (29105, 12903));
        assert!(p.x_in_tile < 256 && p.y_in_tile < 256);
    }

    #[test]
    fn corner_round_trips_through_tile_pixel() {
        let (lon, lat) = tile_nw_corner(12, 3638, 1612);
        let p = tile_pixel(12, lon + 1e-9, lat - 1e-9, 256);
        assert_eq!((p.tile_x, p.tile_y), (3638, 1612));
        assert_eq!((p.x_in_tile, p.y_in_tile), (0, 0));
    }

    #[test]
    fn pixel_position_scales_with_tile_size() {
        let a = tile_pixel(10, 139.5, 35.5, 256);
        let b = tile_pixel(10, 139.5, 35.5, 512);
        assert_eq!(a.tile_x, b.tile_x);
        assert_eq!(b.x_in_tile / 2, a.x_in_tile);
    }
}
