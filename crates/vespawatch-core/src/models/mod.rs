//! Data models for Vespa-Watch

mod action;
mod observation;
mod taxon;

pub use action::{
    ActionOutcome, Aftercare, ManagementAction, Method, NestSite, NestType, Product,
};
pub use observation::{
    validate_coordinates, validate_observation_time, Behaviour, IndividualDetails, NestDetails,
    NestHeight, NestSize, Observation, ObservationDetails, ObservationId, ObservationKind,
    ObservationWarning, Origin, PendingDeletion, Picture, PictureId,
};
pub use taxon::{Taxon, TaxonId};
