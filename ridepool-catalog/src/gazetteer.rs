use ridepool_core::locality::LocalityDirectory;
use ridepool_shared::Waypoint;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GazetteerEntry {
    name: String,
    zip: String,
    canton: String,
    lat: f64,
    lon: f64,
}

/// In-memory locality directory.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    entries: Vec<Waypoint>,
}

impl Gazetteer {
    pub fn new(mut entries: Vec<Waypoint>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.zip.cmp(&b.zip)));
        Self { entries }
    }

    /// Parses a JSON array of `{name, zip, canton, lat, lon}` objects.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: Vec<GazetteerEntry> = serde_json::from_str(json)?;
        Ok(Self::new(
            raw.into_iter()
                .map(|e| Waypoint {
                    name: e.name,
                    zip: e.zip,
                    canton: e.canton,
                    lat: e.lat,
                    lon: e.lon,
                })
                .collect(),
        ))
    }

    /// Main Swiss towns, enough to run without an external data file.
    pub fn swiss_default() -> Self {
        let rows: [(&str, &str, &str, f64, f64); 20] = [
            ("Basel", "4001", "BS", 47.5596, 7.5886),
            ("Bern", "3011", "BE", 46.9480, 7.4474),
            ("Biel/Bienne", "2502", "BE", 47.1368, 7.2463),
            ("Fribourg", "1700", "FR", 46.8063, 7.1617),
            ("Geneva", "1201", "GE", 46.2044, 6.1432),
            ("Köniz", "3098", "BE", 46.9245, 7.4146),
            ("La Chaux-de-Fonds", "2300", "NE", 47.1057, 6.8267),
            ("Lancy", "1212", "GE", 46.1904, 6.1125),
            ("Lausanne", "1003", "VD", 46.5197, 6.6323),
            ("Lucerne", "6003", "LU", 47.0502, 8.3093),
            ("Lugano", "6900", "TI", 46.0101, 8.9627),
            ("Neuchâtel", "2000", "NE", 46.9926, 6.9305),
            ("Schaffhausen", "8200", "SH", 47.6970, 8.6342),
            ("Sion", "1950", "VS", 46.2332, 7.3578),
            ("St. Gallen", "9000", "SG", 47.4212, 9.3751),
            ("Thun", "3600", "BE", 46.7581, 7.6283),
            ("Uster", "8610", "ZH", 47.3467, 8.7208),
            ("Vernier", "1214", "GE", 46.2064, 6.0851),
            ("Winterthur", "8400", "ZH", 47.5010, 8.7234),
            ("Zurich", "8001", "ZH", 47.3769, 8.5417),
        ];
        Self::new(
            rows.iter()
                .map(|(name, zip, canton, lat, lon)| Waypoint {
                    name: name.to_string(),
                    zip: zip.to_string(),
                    canton: canton.to_string(),
                    lat: *lat,
                    lon: *lon,
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocalityDirectory for Gazetteer {
    fn lookup(&self, query: &str) -> Vec<Waypoint> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let is_zip = needle.chars().all(|c| c.is_ascii_digit());
        // entries are kept sorted by name, so filtering preserves the order
        self.entries
            .iter()
            .filter(|w| {
                if is_zip {
                    w.zip.starts_with(&needle)
                } else {
                    w.name.to_lowercase().contains(&needle)
                }
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_substring_is_case_insensitive() {
        let g = Gazetteer::swiss_default();
        let hits = g.lookup("LAN");
        let names: Vec<_> = hits.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Lancy", "Lausanne"]);
    }

    #[test]
    fn test_zip_prefix() {
        let g = Gazetteer::swiss_default();
        let hits = g.lookup("12");
        let names: Vec<_> = hits.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["Geneva", "Lancy", "Vernier"]);
    }

    #[test]
    fn test_no_match_and_blank_query() {
        let g = Gazetteer::swiss_default();
        assert!(g.lookup("Atlantis").is_empty());
        assert!(g.lookup("   ").is_empty());
    }

    #[test]
    fn test_from_json() {
        let g = Gazetteer::from_json(
            r#"[{"name":"Aarau","zip":"5000","canton":"AG","lat":47.39,"lon":8.04}]"#,
        )
        .unwrap();
        assert_eq!(g.len(), 1);
        assert_eq!(g.lookup("aar")[0].canton, "AG");
    }
}
