use serde::{Deserialize, Serialize};

use crate::models::worker::{GeoPoint, Location};

const EARTH_RADIUS_KM: f64 = 6_371.0;
const KM_PER_DEGREE_LAT: f64 = 111.32;

const SAME_POINT_KM: f64 = 2.0;
const SAME_LOCAL_AREA_KM: f64 = 8.0;
const SAME_REGION_KM: f64 = 15.0;
const DISTANT_KM: f64 = 25.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProximityTier {
    SamePoint,
    SameLocalArea,
    SameRegion,
    Distant,
}

impl ProximityTier {
    fn from_distance(distance_km: f64) -> Self {
        if distance_km <= SAME_POINT_KM {
            ProximityTier::SamePoint
        } else if distance_km <= SAME_LOCAL_AREA_KM {
            ProximityTier::SameLocalArea
        } else if distance_km <= SAME_REGION_KM {
            ProximityTier::SameRegion
        } else {
            ProximityTier::Distant
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProximityEstimate {
    pub distance_km: f64,
    pub tier: ProximityTier,
    /// True when both sides had coordinates.
    pub precise: bool,
}

/// Great-circle distance using the spherical law of cosines.
pub fn great_circle_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let cos_angle = lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * delta_lng.cos();
    let central_angle = cos_angle.clamp(-1.0, 1.0).acos();

    EARTH_RADIUS_KM * central_angle
}

pub fn normalize_postal_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// First three characters of the normalized postal code.
pub fn zone_of(code: &str) -> String {
    normalize_postal_code(code).chars().take(3).collect()
}

/// Returns `None` when the two locations share no comparable descriptor.
pub fn estimate(a: &Location, b: &Location) -> Option<ProximityEstimate> {
    if let (Some(pa), Some(pb)) = (&a.point, &b.point) {
        let distance_km = great_circle_km(pa, pb);
        return Some(ProximityEstimate {
            distance_km,
            tier: ProximityTier::from_distance(distance_km),
            precise: true,
        });
    }

    let code_a = a.postal_code.as_deref().map(normalize_postal_code)?;
    let code_b = b.postal_code.as_deref().map(normalize_postal_code)?;
    if code_a.is_empty() || code_b.is_empty() {
        return None;
    }

    let (tier, distance_km) = if code_a == code_b {
        (ProximityTier::SamePoint, SAME_POINT_KM)
    } else if shared_prefix(&code_a, &code_b, 3) {
        (ProximityTier::SameLocalArea, SAME_LOCAL_AREA_KM)
    } else if shared_prefix(&code_a, &code_b, 2) {
        (ProximityTier::SameRegion, SAME_REGION_KM)
    } else {
        (ProximityTier::Distant, DISTANT_KM)
    };

    Some(ProximityEstimate {
        distance_km,
        tier,
        precise: false,
    })
}

/// Cheap lat/lng box test used before the precise distance.
pub fn within_bounding_box(center: &GeoPoint, point: &GeoPoint, radius_km: f64) -> bool {
    let lat_delta = radius_km / KM_PER_DEGREE_LAT;
    let lng_scale = center.lat.to_radians().cos().abs().max(0.01);
    let lng_delta = radius_km / (KM_PER_DEGREE_LAT * lng_scale);

    (point.lat - center.lat).abs() <= lat_delta && (point.lng - center.lng).abs() <= lng_delta
}

fn shared_prefix(a: &str, b: &str, len: usize) -> bool {
    a.chars().count() >= len
        && b.chars().count() >= len
        && a.chars().take(len).eq(b.chars().take(len))
}
