//! Remote naturalist-platform plumbing: typed payloads and the API client.

mod client;
mod payload;

pub use client::{InatApiClient, PhotoFetcher, RemoteClient, RemoteCredentials};
pub use payload::{
    FieldValue, FieldValueMap, GeoJsonPoint, ObservationField, ObservationFieldValueAttribute,
    ObservationPayload, ObservedOnDetails, RemoteObservation, RemotePhoto, RemoteTaxon,
    EVIDENCE_INDIVIDUAL, EVIDENCE_NEST,
};
