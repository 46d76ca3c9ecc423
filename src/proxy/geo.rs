//! Optional geolocation of candidate addresses from a MaxMind MMDB file

use crate::Result;
use maxminddb::{geoip2, Reader};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Where an endpoint's address is registered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code (e.g., "US", "CN")
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub city_name: Option<String>,
    pub continent_code: Option<String>,
}

impl GeoLocation {
    pub fn is_empty(&self) -> bool {
        self.country_code.is_none()
            && self.country_name.is_none()
            && self.city_name.is_none()
            && self.continent_code.is_none()
    }

    /// "City, CC", "CC", "City" or "Unknown"
    pub fn short_display(&self) -> String {
        match (&self.country_code, &self.city_name) {
            (Some(cc), Some(city)) => format!("{}, {}", city, cc),
            (Some(cc), None) => cc.clone(),
            (None, Some(city)) => city.clone(),
            (None, None) => String::from("Unknown"),
        }
    }
}

/// Shared handle on an opened MMDB reader
#[derive(Clone)]
pub struct GeoLocator {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoLocator {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Locate a host given as a literal IP; hostnames and misses yield `None`
    pub fn locate(&self, host: &str) -> Option<GeoLocation> {
        let ip: IpAddr = host.parse().ok()?;
        match self.lookup_ip(ip) {
            Ok(loc) if !loc.is_empty() => Some(loc),
            Ok(_) => None,
            Err(e) => {
                debug!("geo lookup for {} failed: {}", host, e);
                None
            }
        }
    }

    fn lookup_ip(&self, ip: IpAddr) -> Result<GeoLocation> {
        let lookup_result = self.reader.lookup(ip)?;
        let city: Option<geoip2::City> = lookup_result.decode()?;

        let Some(city) = city else {
            return Ok(GeoLocation::default());
        };

        Ok(GeoLocation {
            country_code: city.country.iso_code.map(String::from),
            country_name: city.country.names.english.map(String::from),
            city_name: city.city.names.english.map(String::from),
            continent_code: city.continent.code.map(String::from),
        })
    }
}

impl std::fmt::Debug for GeoLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoLocator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_location_default_is_empty() {
        let loc = GeoLocation::default();
        assert!(loc.is_empty());
        assert_eq!(loc.short_display(), "Unknown");
    }

    #[test]
    fn test_geo_location_short_display() {
        let mut loc = GeoLocation {
            country_code: Some("US".to_string()),
            ..Default::default()
        };
        assert_eq!(loc.short_display(), "US");

        loc.city_name = Some("New York".to_string());
        assert_eq!(loc.short_display(), "New York, US");

        loc.country_code = None;
        assert_eq!(loc.short_display(), "New York");
    }

    #[test]
    fn test_missing_database_is_an_error() {
        assert!(GeoLocator::from_path("/nonexistent/GeoLite2-City.mmdb").is_err());
    }
}
