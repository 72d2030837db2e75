use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three independent record collections.
///
/// The declaration order is the global lock acquisition order: any operation
/// that locks more than one collection takes them in ascending `Ord` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Registered users.
    Users,
    /// Food offers published by donors.
    FoodOffers,
    /// Standing requests posted by recipients.
    Requests,
}

impl Collection {
    /// All collections in lock acquisition order.
    pub const ALL: [Collection; 3] = [
        Collection::Users,
        Collection::FoodOffers,
        Collection::Requests,
    ];

    /// Short human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::FoodOffers => "food",
            Collection::Requests => "requests",
        }
    }

    /// File name of the backing store inside the data directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Collection::Users => "users.txt",
            Collection::FoodOffers => "food.txt",
            Collection::Requests => "requests.txt",
        }
    }

    pub(crate) fn lock_resource(self) -> &'static str {
        match self {
            Collection::Users => "users lock",
            Collection::FoodOffers => "food lock",
            Collection::Requests => "requests lock",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key of a stored record: the generated id, or the username for users.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(value.to_string())
    }
}
