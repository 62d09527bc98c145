//! Geolocation from a local MaxMind GeoLite2/GeoIP2 City database

use anyhow::{Context, Result};
use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use super::{GeoError, GeoProvider};
use crate::analytics::models::{GeoLocation, UNKNOWN_LOCATION};

/// Memory-mapped City database; lookups are synchronous and cheap
#[derive(Clone)]
pub struct MaxMindProvider {
    reader: Arc<Reader<Mmap>>,
}

impl MaxMindProvider {
    pub fn open(path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    fn lookup_sync(&self, ip: IpAddr) -> Result<Option<GeoLocation>, GeoError> {
        let result = self
            .reader
            .lookup(ip)
            .map_err(|e| GeoError::Database(e.to_string()))?;

        let (country, city) = match result.decode::<geoip2::City>() {
            Ok(Some(record)) => (
                record.country.names.english.map(str::to_string),
                record.city.names.english.map(str::to_string),
            ),
            // Country-only databases still answer the country half
            _ => match result.decode::<geoip2::Country>() {
                Ok(Some(record)) => (record.country.names.english.map(str::to_string), None),
                Ok(None) => (None, None),
                Err(e) => return Err(GeoError::Database(e.to_string())),
            },
        };

        if country.is_none() && city.is_none() {
            return Ok(None);
        }

        Ok(Some(GeoLocation::new(
            country.unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
            city.unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        )))
    }
}

#[async_trait]
impl GeoProvider for MaxMindProvider {
    fn name(&self) -> &'static str {
        "maxmind"
    }

    async fn lookup(&self, ip: IpAddr) -> Result<Option<GeoLocation>, GeoError> {
        self.lookup_sync(ip)
    }
}
