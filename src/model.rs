//! Typed views over the positional records of each collection.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::storage::Record;
use crate::types::{RecordId, StoreError};

/// Field positions in a user record.
pub mod user_fields {
    /// Unique login name.
    pub const USERNAME: usize = 0;
    /// Stored credential.
    pub const PASSWORD: usize = 1;
    /// Free-form role (donor, receiver, ...).
    pub const ROLE: usize = 2;
}

/// Field positions in a food offer record.
pub mod food_fields {
    /// Generated id.
    pub const ID: usize = 0;
    /// Username of the donor.
    pub const DONOR: usize = 1;
    /// What is offered.
    pub const NAME: usize = 2;
    /// Free-form amount.
    pub const QUANTITY: usize = 3;
    /// Pickup location.
    pub const LOCATION: usize = 4;
    /// `available` or `claimed`.
    pub const STATUS: usize = 5;
    /// Username of the claimer, present iff claimed.
    pub const CLAIMED_BY: usize = 6;
}

/// Field positions in a request record.
pub mod request_fields {
    /// Generated id.
    pub const ID: usize = 0;
    /// Username of the receiver who posted the request.
    pub const RECEIVER: usize = 1;
    /// Kind of food wanted.
    pub const FOOD_TYPE: usize = 2;
    /// Free-form amount.
    pub const QUANTITY: usize = 3;
    /// `pending`, `cancelled` or `fulfilled`.
    pub const STATUS: usize = 4;
    /// Username of the fulfilling donor, present iff fulfilled.
    pub const FULFILLED_BY: usize = 5;
}

/// A registered user. The password never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Unique login name.
    pub username: String,
    /// Role recorded at registration.
    pub role: String,
}

impl User {
    /// Reads a user record.
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            username: record.field(user_fields::USERNAME)?.to_string(),
            role: record.field(user_fields::ROLE)?.to_string(),
        })
    }
}

/// Lifecycle state of a food offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FoodStatus {
    /// Open for claiming.
    Available,
    /// Taken by a receiver.
    Claimed,
}

impl FoodStatus {
    /// Persisted spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            FoodStatus::Available => "available",
            FoodStatus::Claimed => "claimed",
        }
    }
}

impl FromStr for FoodStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(FoodStatus::Available),
            "claimed" => Ok(FoodStatus::Claimed),
            other => Err(StoreError::invalid(format!("unknown food status {other:?}"))),
        }
    }
}

impl fmt::Display for FoodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published food offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodOffer {
    /// Generated id.
    pub id: RecordId,
    /// Username of the donor.
    pub donor: String,
    /// What is offered.
    pub name: String,
    /// Free-form amount.
    pub quantity: String,
    /// Pickup location.
    pub location: String,
    /// Current state.
    pub status: FoodStatus,
    /// Claimer, set iff `status` is claimed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
}

impl FoodOffer {
    /// Reads a food record; `None` for an unknown status.
    pub fn from_record(record: &Record) -> Option<Self> {
        let status = record.field(food_fields::STATUS)?.parse().ok()?;
        Some(Self {
            id: RecordId::from(record.field(food_fields::ID)?),
            donor: record.field(food_fields::DONOR)?.to_string(),
            name: record.field(food_fields::NAME)?.to_string(),
            quantity: record.field(food_fields::QUANTITY)?.to_string(),
            location: record.field(food_fields::LOCATION)?.to_string(),
            status,
            claimed_by: record
                .field(food_fields::CLAIMED_BY)
                .filter(|_| status == FoodStatus::Claimed)
                .map(str::to_string),
        })
    }
}

/// Lifecycle state of a request. Only `pending` may transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for a donor.
    Pending,
    /// Withdrawn by its receiver.
    Cancelled,
    /// Satisfied by a donor.
    Fulfilled,
}

impl RequestStatus {
    /// Persisted spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Fulfilled => "fulfilled",
        }
    }

    /// Whether `self -> next` is an allowed transition.
    pub fn can_become(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Cancelled)
                | (RequestStatus::Pending, RequestStatus::Fulfilled)
        )
    }
}

impl FromStr for RequestStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "cancelled" => Ok(RequestStatus::Cancelled),
            "fulfilled" => Ok(RequestStatus::Fulfilled),
            other => Err(StoreError::invalid(format!(
                "unknown request status {other:?}"
            ))),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A standing request for food.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodRequest {
    /// Generated id.
    pub id: RecordId,
    /// Username of the receiver.
    pub receiver: String,
    /// Kind of food wanted.
    pub food_type: String,
    /// Free-form amount.
    pub quantity: String,
    /// Current state.
    pub status: RequestStatus,
    /// Donor, set iff `status` is fulfilled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfilled_by: Option<String>,
}

impl FoodRequest {
    /// Reads a request record; `None` for an unknown status.
    pub fn from_record(record: &Record) -> Option<Self> {
        let status = record.field(request_fields::STATUS)?.parse().ok()?;
        Some(Self {
            id: RecordId::from(record.field(request_fields::ID)?),
            receiver: record.field(request_fields::RECEIVER)?.to_string(),
            food_type: record.field(request_fields::FOOD_TYPE)?.to_string(),
            quantity: record.field(request_fields::QUANTITY)?.to_string(),
            status,
            fulfilled_by: record
                .field(request_fields::FULFILLED_BY)
                .filter(|_| status == RequestStatus::Fulfilled)
                .map(str::to_string),
        })
    }
}
