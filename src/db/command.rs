use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{FoodOffer, FoodRequest};
use crate::types::{RecordId, Result, StoreError};

use super::store::Store;

/// Named string fields as parsed from a request body.
pub type Fields = HashMap<String, String>;

/// The store's business operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create a user.
    Register,
    /// Check credentials.
    Login,
    /// Publish a food offer.
    AddFood,
    /// List available offers.
    ListFood,
    /// Claim an available offer.
    ClaimFood,
    /// Post a request.
    AddRequest,
    /// List all requests.
    ListRequests,
    /// Cancel a pending request.
    CancelRequest,
    /// Remove a request.
    DeleteRequest,
    /// Fulfill a pending request.
    FulfillRequest,
}

impl Operation {
    /// Every operation, in documentation order.
    pub const ALL: [Operation; 10] = [
        Operation::Register,
        Operation::Login,
        Operation::AddFood,
        Operation::ListFood,
        Operation::ClaimFood,
        Operation::AddRequest,
        Operation::ListRequests,
        Operation::CancelRequest,
        Operation::DeleteRequest,
        Operation::FulfillRequest,
    ];

    /// Snake-case name.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Login => "login",
            Operation::AddFood => "add_food",
            Operation::ListFood => "list_food",
            Operation::ClaimFood => "claim_food",
            Operation::AddRequest => "add_request",
            Operation::ListRequests => "list_requests",
            Operation::CancelRequest => "cancel_request",
            Operation::DeleteRequest => "delete_request",
            Operation::FulfillRequest => "fulfill_request",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = StoreError;

    /// Accepts `add_food`, `add-food` and `addFood` spellings.
    fn from_str(s: &str) -> Result<Self> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Operation::ALL
            .into_iter()
            .find(|op| op.name().replace('_', "") == wanted)
            .ok_or_else(|| StoreError::invalid(format!("unknown operation {s:?}")))
    }
}

/// A fully parsed operation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// See [`Store::register`].
    Register {
        /// Login name.
        username: String,
        /// Credential.
        password: String,
        /// Role.
        role: String,
    },
    /// See [`Store::login`].
    Login {
        /// Login name.
        username: String,
        /// Credential.
        password: String,
    },
    /// See [`Store::add_food`].
    AddFood {
        /// Donor username.
        donor: String,
        /// What is offered.
        name: String,
        /// Amount.
        quantity: String,
        /// Pickup location.
        location: String,
    },
    /// See [`Store::list_food`].
    ListFood,
    /// See [`Store::claim_food`].
    ClaimFood {
        /// Offer id.
        food_id: String,
        /// Claiming username.
        receiver: String,
    },
    /// See [`Store::add_request`].
    AddRequest {
        /// Requesting username.
        receiver: String,
        /// Kind of food.
        food_type: String,
        /// Amount.
        quantity: String,
    },
    /// See [`Store::list_requests`].
    ListRequests,
    /// See [`Store::cancel_request`].
    CancelRequest {
        /// Request id.
        request_id: String,
        /// Owner username.
        receiver: String,
    },
    /// See [`Store::delete_request`].
    DeleteRequest {
        /// Request id.
        request_id: String,
        /// Owner username.
        receiver: String,
    },
    /// See [`Store::fulfill_request`].
    FulfillRequest {
        /// Request id.
        request_id: String,
        /// Fulfilling donor.
        donor: String,
    },
}

impl Command {
    /// Builds the command for `op` from named fields.
    ///
    /// Legacy field names are accepted as aliases: `type` for `role`,
    /// `donator` for `donor`, `qty` for `quantity`.
    pub fn from_fields(op: Operation, fields: &Fields) -> Result<Self> {
        let get = |names: &[&str]| -> Result<String> {
            names
                .iter()
                .find_map(|name| fields.get(*name).filter(|value| !value.trim().is_empty()))
                .cloned()
                .ok_or_else(|| StoreError::invalid(format!("missing field {}", names[0])))
        };
        Ok(match op {
            Operation::Register => Command::Register {
                username: get(&["username"])?,
                password: get(&["password"])?,
                role: get(&["role", "type"])?,
            },
            Operation::Login => Command::Login {
                username: get(&["username"])?,
                password: get(&["password"])?,
            },
            Operation::AddFood => Command::AddFood {
                donor: get(&["donor", "donator"])?,
                name: get(&["name"])?,
                quantity: get(&["quantity", "qty"])?,
                location: get(&["location"])?,
            },
            Operation::ListFood => Command::ListFood,
            Operation::ClaimFood => Command::ClaimFood {
                food_id: get(&["foodId", "food_id"])?,
                receiver: get(&["receiver"])?,
            },
            Operation::AddRequest => Command::AddRequest {
                receiver: get(&["receiver"])?,
                food_type: get(&["foodType", "food_type"])?,
                quantity: get(&["quantity", "qty"])?,
            },
            Operation::ListRequests => Command::ListRequests,
            Operation::CancelRequest => Command::CancelRequest {
                request_id: get(&["requestId", "request_id"])?,
                receiver: get(&["receiver"])?,
            },
            Operation::DeleteRequest => Command::DeleteRequest {
                request_id: get(&["requestId", "request_id"])?,
                receiver: get(&["receiver"])?,
            },
            Operation::FulfillRequest => Command::FulfillRequest {
                request_id: get(&["requestId", "request_id"])?,
                donor: get(&["donor", "donator"])?,
            },
        })
    }

    /// The operation this command performs.
    pub fn operation(&self) -> Operation {
        match self {
            Command::Register { .. } => Operation::Register,
            Command::Login { .. } => Operation::Login,
            Command::AddFood { .. } => Operation::AddFood,
            Command::ListFood => Operation::ListFood,
            Command::ClaimFood { .. } => Operation::ClaimFood,
            Command::AddRequest { .. } => Operation::AddRequest,
            Command::ListRequests => Operation::ListRequests,
            Command::CancelRequest { .. } => Operation::CancelRequest,
            Command::DeleteRequest { .. } => Operation::DeleteRequest,
            Command::FulfillRequest { .. } => Operation::FulfillRequest,
        }
    }
}

/// Structured success payload of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    /// A user was created.
    Registered {
        /// New username.
        username: String,
    },
    /// Credentials matched.
    LoggedIn {
        /// Username.
        username: String,
        /// Role stored at registration.
        role: String,
    },
    /// An offer was published.
    FoodAdded {
        /// New offer id.
        id: RecordId,
    },
    /// Available offers.
    FoodList {
        /// Offers in publication order.
        offers: Vec<FoodOffer>,
    },
    /// An offer was claimed.
    FoodClaimed {
        /// Offer id.
        id: RecordId,
    },
    /// A request was posted.
    RequestAdded {
        /// New request id.
        id: RecordId,
    },
    /// All requests.
    RequestList {
        /// Requests in posting order.
        requests: Vec<FoodRequest>,
    },
    /// A request was cancelled.
    RequestCancelled {
        /// Request id.
        id: RecordId,
    },
    /// A request was removed.
    RequestDeleted {
        /// Request id.
        id: RecordId,
    },
    /// A request was fulfilled.
    RequestFulfilled {
        /// Request id.
        id: RecordId,
    },
}

impl Store {
    /// Runs a parsed command.
    pub fn apply(&self, command: Command) -> Result<Reply> {
        debug!(op = %command.operation(), "store.apply");
        Ok(match command {
            Command::Register {
                username,
                password,
                role,
            } => {
                self.register(&username, &password, &role)?;
                Reply::Registered { username }
            }
            Command::Login { username, password } => {
                let role = self.login(&username, &password)?;
                Reply::LoggedIn { username, role }
            }
            Command::AddFood {
                donor,
                name,
                quantity,
                location,
            } => Reply::FoodAdded {
                id: self.add_food(&donor, &name, &quantity, &location)?,
            },
            Command::ListFood => Reply::FoodList {
                offers: self.list_food()?,
            },
            Command::ClaimFood { food_id, receiver } => {
                self.claim_food(&food_id, &receiver)?;
                Reply::FoodClaimed {
                    id: RecordId(food_id),
                }
            }
            Command::AddRequest {
                receiver,
                food_type,
                quantity,
            } => Reply::RequestAdded {
                id: self.add_request(&receiver, &food_type, &quantity)?,
            },
            Command::ListRequests => Reply::RequestList {
                requests: self.list_requests()?,
            },
            Command::CancelRequest {
                request_id,
                receiver,
            } => {
                self.cancel_request(&request_id, &receiver)?;
                Reply::RequestCancelled {
                    id: RecordId(request_id),
                }
            }
            Command::DeleteRequest {
                request_id,
                receiver,
            } => {
                self.delete_request(&request_id, &receiver)?;
                Reply::RequestDeleted {
                    id: RecordId(request_id),
                }
            }
            Command::FulfillRequest { request_id, donor } => {
                self.fulfill_request(&request_id, &donor)?;
                Reply::RequestFulfilled {
                    id: RecordId(request_id),
                }
            }
        })
    }

    /// Field-map entry point: parses `fields` for `op` and runs it.
    pub fn execute(&self, op: Operation, fields: &Fields) -> Result<Reply> {
        self.apply(Command::from_fields(op, fields)?)
    }
}
