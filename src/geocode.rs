//! Address geocoding boundary.
//!
//! Geocoding is an external collaborator: the engine only needs "address in,
//! optional coordinates out". Location adds work fine without a real
//! geocoder, they just have no map pin.

use async_trait::async_trait;

use crate::types::Coordinates;

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolve a free-text address to coordinates. Returns None when the
    /// address cannot be resolved; resolution failures never fail the caller.
    async fn geocode(&self, address: &str) -> Option<Coordinates>;
}

/// Geocoder that resolves nothing. The default collaborator when no
/// geocoding service is wired in.
pub struct NoopGeocoder;

#[async_trait]
impl Geocoder for NoopGeocoder {
    async fn geocode(&self, _address: &str) -> Option<Coordinates> {
        None
    }
}
