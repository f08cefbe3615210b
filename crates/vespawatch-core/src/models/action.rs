//! Management action model: what was done about a reported nest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::observation::ObservationId;

/// Overall result of a management action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    SuccessfullyTreated,
    NotTreated,
    Unknown,
}

impl ActionOutcome {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::SuccessfullyTreated => "ST",
            Self::NotTreated => "UN",
            Self::Unknown => "UK",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "ST" => Ok(Self::SuccessfullyTreated),
            "UN" => Ok(Self::NotTreated),
            "UK" => Ok(Self::Unknown),
            other => Err(Error::InvalidInput(format!("Unknown outcome: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::SuccessfullyTreated => "Successfully treated",
            Self::NotTreated => "Not treated",
            Self::Unknown => "Unknown",
        }
    }

    pub const ALL: [Self; 3] = [Self::SuccessfullyTreated, Self::NotTreated, Self::Unknown];
}

/// Where the nest was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NestSite {
    OutdoorUncovered,
    OutdoorCovered,
    IndoorBuilding,
    Underground,
    Unknown,
}

impl NestSite {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::OutdoorUncovered => "OU",
            Self::OutdoorCovered => "OC",
            Self::IndoorBuilding => "IB",
            Self::Underground => "UG",
            Self::Unknown => "UK",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "OU" => Ok(Self::OutdoorUncovered),
            "OC" => Ok(Self::OutdoorCovered),
            "IB" => Ok(Self::IndoorBuilding),
            "UG" => Ok(Self::Underground),
            "UK" => Ok(Self::Unknown),
            other => Err(Error::InvalidInput(format!("Unknown nest site: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OutdoorUncovered => "Outdoor, uncovered",
            Self::OutdoorCovered => "Outdoor, covered",
            Self::IndoorBuilding => "Inside a building",
            Self::Underground => "Underground",
            Self::Unknown => "Unknown",
        }
    }

    pub const ALL: [Self; 5] = [
        Self::OutdoorUncovered,
        Self::OutdoorCovered,
        Self::IndoorBuilding,
        Self::Underground,
        Self::Unknown,
    ];
}

/// Development stage of the treated nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NestType {
    ActiveEmbryo,
    ActivePrimary,
    ActiveSecondary,
    InactiveEmpty,
    Unknown,
}

impl NestType {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::ActiveEmbryo => "AE",
            Self::ActivePrimary => "AP",
            Self::ActiveSecondary => "AS",
            Self::InactiveEmpty => "IE",
            Self::Unknown => "UK",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "AE" => Ok(Self::ActiveEmbryo),
            "AP" => Ok(Self::ActivePrimary),
            "AS" => Ok(Self::ActiveSecondary),
            "IE" => Ok(Self::InactiveEmpty),
            "UK" => Ok(Self::Unknown),
            other => Err(Error::InvalidInput(format!("Unknown nest type: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ActiveEmbryo => "Active embryo nest",
            Self::ActivePrimary => "Active primary nest",
            Self::ActiveSecondary => "Active secondary nest",
            Self::InactiveEmpty => "Inactive/empty nest",
            Self::Unknown => "Unknown",
        }
    }

    pub const ALL: [Self; 5] = [
        Self::ActiveEmbryo,
        Self::ActivePrimary,
        Self::ActiveSecondary,
        Self::InactiveEmpty,
        Self::Unknown,
    ];
}

/// State of the nest site after treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aftercare {
    NestCompletelyRemoved,
    NestPartiallyRemoved,
    NestNotRemoved,
    Unknown,
}

impl Aftercare {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::NestCompletelyRemoved => "NCR",
            Self::NestPartiallyRemoved => "NPR",
            Self::NestNotRemoved => "NNR",
            Self::Unknown => "UK",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "NCR" => Ok(Self::NestCompletelyRemoved),
            "NPR" => Ok(Self::NestPartiallyRemoved),
            "NNR" => Ok(Self::NestNotRemoved),
            "UK" => Ok(Self::Unknown),
            other => Err(Error::InvalidInput(format!("Unknown aftercare: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NestCompletelyRemoved => "Nest completely removed",
            Self::NestPartiallyRemoved => "Nest partially removed",
            Self::NestNotRemoved => "Nest not removed",
            Self::Unknown => "Unknown",
        }
    }

    pub const ALL: [Self; 4] = [
        Self::NestCompletelyRemoved,
        Self::NestPartiallyRemoved,
        Self::NestNotRemoved,
        Self::Unknown,
    ];
}

/// Product used during treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Product {
    PermasD,
    LiquidNitrogen,
    Vespa,
    FicamD,
    TopscorePal,
    EtherAcetoneEthylAcetate,
    DiatomaceousEarth,
    Other,
    None,
    Unknown,
}

impl Product {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::PermasD => "PD",
            Self::LiquidNitrogen => "LN",
            Self::Vespa => "V",
            Self::FicamD => "FD",
            Self::TopscorePal => "TP",
            Self::EtherAcetoneEthylAcetate => "EE",
            Self::DiatomaceousEarth => "DE",
            Self::Other => "O",
            Self::None => "N",
            Self::Unknown => "UK",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "PD" => Ok(Self::PermasD),
            "LN" => Ok(Self::LiquidNitrogen),
            "V" => Ok(Self::Vespa),
            "FD" => Ok(Self::FicamD),
            "TP" => Ok(Self::TopscorePal),
            "EE" => Ok(Self::EtherAcetoneEthylAcetate),
            "DE" => Ok(Self::DiatomaceousEarth),
            "O" => Ok(Self::Other),
            "N" => Ok(Self::None),
            "UK" => Ok(Self::Unknown),
            other => Err(Error::InvalidInput(format!("Unknown product: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::PermasD => "Permas-D",
            Self::LiquidNitrogen => "Liquid nitrogen",
            Self::Vespa => "Vespa",
            Self::FicamD => "Ficam D",
            Self::TopscorePal => "Topscore PAL",
            Self::EtherAcetoneEthylAcetate => "Ether / acetone / ethyl acetate",
            Self::DiatomaceousEarth => "Diatomaceous earth",
            Self::Other => "Other",
            Self::None => "None",
            Self::Unknown => "Unknown",
        }
    }

    pub const ALL: [Self; 10] = [
        Self::PermasD,
        Self::LiquidNitrogen,
        Self::Vespa,
        Self::FicamD,
        Self::TopscorePal,
        Self::EtherAcetoneEthylAcetate,
        Self::DiatomaceousEarth,
        Self::Other,
        Self::None,
        Self::Unknown,
    ];
}

/// Method used during treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Freezer,
    TelescopicHandle,
    KillingJar,
    LiquidSprayer,
    PowderDistributor,
    NestNotTreated,
    Other,
    Unknown,
}

impl Method {
    #[must_use]
    pub const fn as_code(self) -> &'static str {
        match self {
            Self::Freezer => "FR",
            Self::TelescopicHandle => "TH",
            Self::KillingJar => "KJ",
            Self::LiquidSprayer => "LS",
            Self::PowderDistributor => "PD",
            Self::NestNotTreated => "NNT",
            Self::Other => "O",
            Self::Unknown => "UK",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        match code {
            "FR" => Ok(Self::Freezer),
            "TH" => Ok(Self::TelescopicHandle),
            "KJ" => Ok(Self::KillingJar),
            "LS" => Ok(Self::LiquidSprayer),
            "PD" => Ok(Self::PowderDistributor),
            "NNT" => Ok(Self::NestNotTreated),
            "O" => Ok(Self::Other),
            "UK" => Ok(Self::Unknown),
            other => Err(Error::InvalidInput(format!("Unknown method: {other}"))),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Freezer => "Freezer",
            Self::TelescopicHandle => "Telescopic handle",
            Self::KillingJar => "Killing jar/box",
            Self::LiquidSprayer => "Liquid sprayer",
            Self::PowderDistributor => "Powder distributor",
            Self::NestNotTreated => "Nest not treated",
            Self::Other => "Other",
            Self::Unknown => "Unknown",
        }
    }

    pub const ALL: [Self; 8] = [
        Self::Freezer,
        Self::TelescopicHandle,
        Self::KillingJar,
        Self::LiquidSprayer,
        Self::PowderDistributor,
        Self::NestNotTreated,
        Self::Other,
        Self::Unknown,
    ];
}

/// A nest-removal intervention, one-to-one with a nest observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementAction {
    /// Key of the nest this action applies to (also this record's key)
    pub nest_id: ObservationId,
    pub outcome: ActionOutcome,
    pub site: Option<NestSite>,
    pub nest_type: Option<NestType>,
    pub aftercare: Option<Aftercare>,
    pub product: Option<Product>,
    pub method: Option<Method>,
    /// Name of the user who performed or recorded the action
    pub user: String,
    pub action_time: DateTime<Utc>,
    /// Time spent on site, in minutes
    pub duration_minutes: Option<i64>,
    pub number_of_persons: Option<i32>,
    pub comments: String,
    /// Named problems encountered during the intervention
    pub problems: Vec<String>,
}

impl ManagementAction {
    /// Create a new management action with the required fields.
    pub fn new(
        nest_id: ObservationId,
        outcome: ActionOutcome,
        user: impl Into<String>,
        action_time: DateTime<Utc>,
    ) -> Result<Self> {
        let user = user.into().trim().to_string();
        if user.is_empty() {
            return Err(Error::InvalidInput("Acting user cannot be empty".into()));
        }

        Ok(Self {
            nest_id,
            outcome,
            site: None,
            nest_type: None,
            aftercare: None,
            product: None,
            method: None,
            user,
            action_time,
            duration_minutes: None,
            number_of_persons: None,
            comments: String::new(),
            problems: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_rejects_empty_user() {
        let when = Utc.with_ymd_and_hms(2021, 8, 19, 11, 0, 0).unwrap();
        assert!(ManagementAction::new(ObservationId::new(), ActionOutcome::Unknown, " ", when)
            .is_err());
    }

    #[test]
    fn test_outcome_codes_round_trip() {
        for outcome in ActionOutcome::ALL {
            assert_eq!(ActionOutcome::from_code(outcome.as_code()).unwrap(), outcome);
        }
        assert!(ActionOutcome::from_code("ZZ").is_err());
    }

    #[test]
    fn test_aftercare_codes_round_trip() {
        for aftercare in Aftercare::ALL {
            assert_eq!(Aftercare::from_code(aftercare.as_code()).unwrap(), aftercare);
        }
    }

    #[test]
    fn test_product_codes_round_trip() {
        for product in Product::ALL {
            assert_eq!(Product::from_code(product.as_code()).unwrap(), product);
        }
    }

    #[test]
    fn test_method_codes_round_trip() {
        for method in Method::ALL {
            assert_eq!(Method::from_code(method.as_code()).unwrap(), method);
        }
    }
}
