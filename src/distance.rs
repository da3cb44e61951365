// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// Mean radius of Earth, in meters.
/// Source: https://en.wikipedia.org/wiki/Earth_radius#Arithmetic_mean_radius
const EARTH_RADIUS: f64 = 6_371_008.8;

/// Mean diameter of Earth, in meters.
const EARTH_DIAMETER: f64 = EARTH_RADIUS + EARTH_RADIUS;

/// Radius of the sphere used by the [Web Mercator](https://en.wikipedia.org/wiki/Web_Mercator_projection)
/// projection, in meters.
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitudes beyond this value can't be represented in Web Mercator and are clamped.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Calculates the great-circle distance between two lat-lon positions
/// on Earth using the [haversine formula](https://en.wikipedia.org/wiki/Haversine_formula).
/// Returns the result in meters.
pub fn earth_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1 = lat1.to_radians();
    let lon1 = lon1.to_radians();
    let lat2 = lat2.to_radians();
    let lon2 = lon2.to_radians();

    let sin_dlat_half = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon_half = ((lon2 - lon1) * 0.5).sin();

    let h = sin_dlat_half * sin_dlat_half + lat1.cos() * lat2.cos() * sin_dlon_half * sin_dlon_half;

    EARTH_DIAMETER * h.sqrt().asin()
}

/// Projects a lat-lon position onto the spherical Web Mercator plane.
/// Returns `(x, y)` in meters.
pub fn project(lat: f64, lon: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = MERCATOR_RADIUS * lon.to_radians();
    let y = MERCATOR_RADIUS * (std::f64::consts::FRAC_PI_4 + lat * 0.5).tan().ln();
    (x, y)
}

/// Euclidean distance between two projected points.
#[inline]
pub fn projected_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}
