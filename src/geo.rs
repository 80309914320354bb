use geo_types::Point;

use crate::entities::Coordinates;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const OTHER_CITY: &str = "Other";

/// Great-circle distance in kilometres. Points carry longitude in `x` and latitude in `y`.
pub fn haversine_km(a: Point<f64>, b: Point<f64>) -> f64 {
    let (lat1, lat2) = (a.y().to_radians(), b.y().to_radians());
    let d_lat = (b.y() - a.y()).to_radians();
    let d_lng = (b.x() - a.x()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    haversine_km(a.into(), b.into())
}

// name, lat, lng
const GAZETTEER: &[(&str, f64, f64)] = &[
    ("Adana", 37.00, 35.32),
    ("Ankara", 39.93, 32.86),
    ("Antalya", 36.90, 30.70),
    ("Aydın", 37.85, 27.84),
    ("Balıkesir", 39.65, 27.88),
    ("Bursa", 40.19, 29.06),
    ("Denizli", 37.78, 29.09),
    ("Diyarbakır", 37.91, 40.24),
    ("Edirne", 41.68, 26.56),
    ("Elazığ", 38.68, 39.22),
    ("Erzurum", 39.90, 41.27),
    ("Eskişehir", 39.78, 30.52),
    ("Gaziantep", 37.07, 37.38),
    ("Hatay", 36.20, 36.16),
    ("Isparta", 37.76, 30.55),
    ("İstanbul", 41.01, 28.98),
    ("İzmir", 38.42, 27.14),
    ("Kahramanmaraş", 37.58, 36.94),
    ("Kayseri", 38.73, 35.49),
    ("Kocaeli", 40.77, 29.92),
    ("Konya", 37.87, 32.48),
    ("Malatya", 38.36, 38.31),
    ("Manisa", 38.61, 27.43),
    ("Mardin", 37.31, 40.74),
    ("Mersin", 36.81, 34.64),
    ("Muğla", 37.22, 28.36),
    ("Ordu", 40.98, 37.88),
    ("Sakarya", 40.69, 30.44),
    ("Samsun", 41.29, 36.33),
    ("Şanlıurfa", 37.16, 38.80),
    ("Sivas", 39.75, 37.02),
    ("Tekirdağ", 40.98, 27.51),
    ("Trabzon", 41.00, 39.72),
    ("Van", 38.49, 43.38),
    ("Zonguldak", 41.45, 31.79),
];

/// Nearest gazetteer city within `radius_km`, or [`OTHER_CITY`].
pub fn nearest_city(coordinates: Coordinates, radius_km: f64) -> String {
    GAZETTEER
        .iter()
        .map(|&(name, lat, lng)| (name, distance_km(coordinates, Coordinates::new(lat, lng))))
        .filter(|&(_, distance)| distance <= radius_km)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| OTHER_CITY.to_string())
}

/// Folds a city name for comparison. Turkish dotted and dotless i both fold to `i`, so
/// "İstanbul", "ISTANBUL" and "istanbul" compare equal.
fn fold_city_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|&c| c != '\u{0307}')
        .flat_map(|c| match c {
            'İ' | 'I' | 'ı' => 'i'.to_lowercase(),
            _ => c.to_lowercase(),
        })
        .collect()
}

pub fn same_city(a: &str, b: &str) -> bool {
    fold_city_name(a) == fold_city_name(b)
}

#[test]
fn istanbul_to_ankara_is_about_350_km() {
    let distance = distance_km(Coordinates::new(41.01, 28.98), Coordinates::new(39.93, 32.86));
    assert!((345.0..360.0).contains(&distance), "{}", distance);
}

#[test]
fn zero_distance_to_self() {
    let point = Coordinates::new(37.0, 35.0);
    assert_eq!(distance_km(point, point), 0.0);
}

#[test]
fn pickup_resolves_to_nearest_city() {
    assert_eq!(nearest_city(Coordinates::new(37.00, 35.00), 50.0), "Adana");
    assert_eq!(nearest_city(Coordinates::new(38.43, 27.15), 50.0), "İzmir");
}

#[test]
fn far_from_every_city_is_other() {
    assert_eq!(nearest_city(Coordinates::new(0.0, 0.0), 50.0), OTHER_CITY);
}

#[test]
fn city_names_fold_turkish_i() {
    assert!(same_city("İstanbul", "istanbul"));
    assert!(same_city("İstanbul", " ISTANBUL "));
    assert!(same_city("İzmir", "izmir"));
    assert!(same_city("Diyarbakır", "DIYARBAKIR"));
    assert!(same_city("i\u{0307}stanbul", "İstanbul"));
    assert!(!same_city("İstanbul", "İzmir"));
}
