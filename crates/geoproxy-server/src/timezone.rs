//! Coordinate to IANA timezone lookup for `/geotz`.

use tzf_rs::DefaultFinder;

/// Resolves a coordinate to the timezone ids covering it.
pub trait TimezoneLookup: Send + Sync {
    /// Timezone ids at (`lat`, `lon`); empty when none is known.
    fn find(&self, lat: f64, lon: f64) -> Vec<String>;
}

/// Lookup backed by the timezone polygons bundled with `tzf-rs`.
pub struct TzfLookup {
    finder: DefaultFinder,
}

impl TzfLookup {
    /// Loads the polygon index. Takes a noticeable moment; build once per worker.
    pub fn new() -> Self {
        Self {
            finder: DefaultFinder::new(),
        }
    }
}

impl Default for TzfLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl TimezoneLookup for TzfLookup {
    fn find(&self, lat: f64, lon: f64) -> Vec<String> {
        self.finder
            .get_tz_names(lon, lat)
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}
