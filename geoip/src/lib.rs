//! IP classification tables.
//!
//! Two independent lookup structures, both immutable after construction and
//! shared by reference across concurrent lookups:
//!
//! - [`GeoTable`] — country/continent/ASN geolocation over range-sorted
//!   partitions of the address space.
//! - [`ProviderTable`] — cloud/VPN/Tor/CDN provider detection over
//!   CIDR-tagged ranges with longest-prefix-match semantics and a per-run
//!   memo cache.

pub mod country;
pub mod error;
pub mod provider;

pub use country::{GeoTable, IpInfo};
pub use error::GeoError;
pub use provider::ProviderTable;
