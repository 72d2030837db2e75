use std::fs;
use std::io::{self, ErrorKind};
use std::sync::Arc;

use tracing::{debug, info};

use crate::model::{
    food_fields, request_fields, user_fields, FoodOffer, FoodRequest, FoodStatus, RequestStatus,
};
use crate::primitives::concurrency::{CancelToken, LockManager, LockPlan};
use crate::storage::{check_value, CollectionStore, IdGenerator, Record, Rewrite};
use crate::types::{Collection, RecordId, Result, StoreError};

use super::config::StoreOptions;
use super::session::Session;

/// The three collection stores, indexed by [`Collection`].
pub(crate) struct Collections {
    users: CollectionStore,
    food_offers: CollectionStore,
    requests: CollectionStore,
}

impl Collections {
    pub(crate) fn get(&self, collection: Collection) -> &CollectionStore {
        match collection {
            Collection::Users => &self.users,
            Collection::FoodOffers => &self.food_offers,
            Collection::Requests => &self.requests,
        }
    }
}

struct Inner {
    options: StoreOptions,
    locks: LockManager,
    collections: Collections,
}

/// Handle to the shared record store.
///
/// Clones share the same files, locks and throttle. Each handle carries a
/// [`CancelToken`] observed by every lock and throttle wait it performs;
/// [`with_cancel`](Self::with_cancel) derives a handle with a different one.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
    cancel: CancelToken,
}

impl Store {
    /// Opens the store described by `options`, creating missing files when
    /// `create_if_missing` is set.
    pub fn open(options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let dir = options.data_dir.as_path();
        if !dir.exists() {
            if !options.create_if_missing {
                return Err(io::Error::new(
                    ErrorKind::NotFound,
                    format!("data directory {} does not exist", dir.display()),
                )
                .into());
            }
            fs::create_dir_all(dir)?;
        }
        let ids = Arc::new(IdGenerator::new(options.id_len));
        let open = |collection| {
            CollectionStore::open(
                dir,
                collection,
                Arc::clone(&ids),
                options.create_if_missing,
                options.sync_writes,
            )
        };
        let collections = Collections {
            users: open(Collection::Users)?,
            food_offers: open(Collection::FoodOffers)?,
            requests: open(Collection::Requests)?,
        };
        let locks = LockManager::new(
            options.throttle_permits,
            options.lock_timeout,
            options.throttle_timeout,
        );
        info!(
            data_dir = %dir.display(),
            permits = options.throttle_permits,
            lock_timeout_ms = options.lock_timeout.as_millis() as u64,
            "store.open"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                options,
                locks,
                collections,
            }),
            cancel: CancelToken::new(),
        })
    }

    /// Options the store was opened with.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Lock manager shared by every handle.
    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    /// Token observed by this handle's waits.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// A handle on the same store whose waits observe `cancel`.
    pub fn with_cancel(&self, cancel: CancelToken) -> Store {
        Store {
            inner: Arc::clone(&self.inner),
            cancel,
        }
    }

    /// Runs `f` with every lock in `plan` held, plus one throttle permit.
    ///
    /// Locks are taken in global collection order and everything is released
    /// when `f` returns, whether it succeeds or fails.
    pub fn with_session<T, F>(&self, plan: &LockPlan, f: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        let held = self.inner.locks.acquire(plan, &self.cancel)?;
        let session = Session::new(held, &self.inner.collections);
        f(&session)
    }

    /// Registers a new user. `Conflict` if the username is taken.
    pub fn register(&self, username: &str, password: &str, role: &str) -> Result<()> {
        let username = required("username", username)?;
        let password = required("password", password)?;
        let role = required("role", role)?;
        self.with_session(&LockPlan::write(Collection::Users), |s| {
            let taken = s.scan(Collection::Users, |r| {
                r.field(user_fields::USERNAME) == Some(username)
            })?;
            if !taken.is_empty() {
                return Err(StoreError::Conflict(format!(
                    "username {username} already exists"
                )));
            }
            s.append(Collection::Users, Record::new([username, password, role]))?;
            Ok(())
        })?;
        info!(username, role, "store.register");
        Ok(())
    }

    /// Checks credentials and returns the user's role.
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let username = required("username", username)?;
        let password = required("password", password)?;
        let matched = self.with_session(&LockPlan::read(Collection::Users), |s| {
            s.scan(Collection::Users, |r| {
                r.field(user_fields::USERNAME) == Some(username)
                    && r.field(user_fields::PASSWORD) == Some(password)
            })
        })?;
        let role = matched
            .first()
            .and_then(|r| r.field(user_fields::ROLE))
            .ok_or(StoreError::Unauthorized)?;
        debug!(username, "store.login");
        Ok(role.to_string())
    }

    /// Publishes a food offer and returns its id.
    pub fn add_food(
        &self,
        donor: &str,
        name: &str,
        quantity: &str,
        location: &str,
    ) -> Result<RecordId> {
        let record = Record::new([
            required("donor", donor)?,
            required("name", name)?,
            required("quantity", quantity)?,
            required("location", location)?,
            FoodStatus::Available.as_str(),
        ]);
        let id = self.with_session(&LockPlan::write(Collection::FoodOffers), |s| {
            s.append(Collection::FoodOffers, record)
        })?;
        info!(id = %id, donor, "store.add_food");
        Ok(id)
    }

    /// Offers still available, in publication order.
    pub fn list_food(&self) -> Result<Vec<FoodOffer>> {
        let records = self.with_session(&LockPlan::read(Collection::FoodOffers), |s| {
            s.scan(Collection::FoodOffers, |r| {
                r.field(food_fields::STATUS) == Some(FoodStatus::Available.as_str())
            })
        })?;
        Ok(records.iter().filter_map(FoodOffer::from_record).collect())
    }

    /// Marks an available offer as claimed by `receiver`.
    pub fn claim_food(&self, food_id: &str, receiver: &str) -> Result<()> {
        let food_id = required("foodId", food_id)?;
        let receiver = required("receiver", receiver)?;
        let changed = self.with_session(&LockPlan::write(Collection::FoodOffers), |s| {
            s.rewrite_all(Collection::FoodOffers, |r| {
                let matches = r.field(food_fields::ID) == Some(food_id)
                    && r.field(food_fields::STATUS) == Some(FoodStatus::Available.as_str());
                if !matches {
                    return Rewrite::Keep;
                }
                let mut next = r.clone();
                next.set(food_fields::STATUS, FoodStatus::Claimed.as_str());
                next.set(food_fields::CLAIMED_BY, receiver);
                Rewrite::Replace(next)
            })
        })?;
        if !changed {
            return Err(StoreError::not_found(format!("available food offer {food_id}")));
        }
        info!(food_id, receiver, "store.claim_food");
        Ok(())
    }

    /// Posts a pending request and returns its id.
    pub fn add_request(&self, receiver: &str, food_type: &str, quantity: &str) -> Result<RecordId> {
        let record = Record::new([
            required("receiver", receiver)?,
            required("foodType", food_type)?,
            required("quantity", quantity)?,
            RequestStatus::Pending.as_str(),
        ]);
        let id = self.with_session(&LockPlan::write(Collection::Requests), |s| {
            s.append(Collection::Requests, record)
        })?;
        info!(id = %id, receiver, "store.add_request");
        Ok(id)
    }

    /// Every request in posting order, whatever its status.
    pub fn list_requests(&self) -> Result<Vec<FoodRequest>> {
        let records = self.with_session(&LockPlan::read(Collection::Requests), |s| {
            s.scan(Collection::Requests, |_| true)
        })?;
        Ok(records.iter().filter_map(FoodRequest::from_record).collect())
    }

    /// Cancels a pending request owned by `receiver`.
    pub fn cancel_request(&self, request_id: &str, receiver: &str) -> Result<()> {
        let request_id = required("requestId", request_id)?;
        let receiver = required("receiver", receiver)?;
        let changed = self.transition_request(
            request_id,
            RequestStatus::Cancelled,
            |r| r.field(request_fields::RECEIVER) == Some(receiver),
            None,
        )?;
        if !changed {
            return Err(StoreError::not_found(format!(
                "pending request {request_id} for {receiver}"
            )));
        }
        info!(request_id, receiver, "store.cancel_request");
        Ok(())
    }

    /// Removes a request owned by `receiver`, in any status.
    pub fn delete_request(&self, request_id: &str, receiver: &str) -> Result<()> {
        let request_id = required("requestId", request_id)?;
        let receiver = required("receiver", receiver)?;
        let changed = self.with_session(&LockPlan::write(Collection::Requests), |s| {
            s.rewrite_all(Collection::Requests, |r| {
                if r.field(request_fields::ID) == Some(request_id)
                    && r.field(request_fields::RECEIVER) == Some(receiver)
                {
                    Rewrite::Drop
                } else {
                    Rewrite::Keep
                }
            })
        })?;
        if !changed {
            return Err(StoreError::not_found(format!(
                "request {request_id} for {receiver}"
            )));
        }
        info!(request_id, receiver, "store.delete_request");
        Ok(())
    }

    /// Marks a pending request as fulfilled by `donor`.
    pub fn fulfill_request(&self, request_id: &str, donor: &str) -> Result<()> {
        let request_id = required("requestId", request_id)?;
        let donor = required("donor", donor)?;
        let changed =
            self.transition_request(request_id, RequestStatus::Fulfilled, |_| true, Some(donor))?;
        if !changed {
            return Err(StoreError::not_found(format!("pending request {request_id}")));
        }
        info!(request_id, donor, "store.fulfill_request");
        Ok(())
    }

    fn transition_request<F>(
        &self,
        request_id: &str,
        next: RequestStatus,
        owned: F,
        actor: Option<&str>,
    ) -> Result<bool>
    where
        F: Fn(&Record) -> bool,
    {
        self.with_session(&LockPlan::write(Collection::Requests), |s| {
            s.rewrite_all(Collection::Requests, |r| {
                let current = r
                    .field(request_fields::STATUS)
                    .and_then(|st| st.parse::<RequestStatus>().ok());
                let eligible = r.field(request_fields::ID) == Some(request_id)
                    && current.is_some_and(|st| st.can_become(next))
                    && owned(r);
                if !eligible {
                    return Rewrite::Keep;
                }
                let mut updated = r.clone();
                updated.truncate(request_fields::STATUS);
                updated.set(request_fields::STATUS, next.as_str());
                if let Some(actor) = actor {
                    updated.set(request_fields::FULFILLED_BY, actor);
                }
                Rewrite::Replace(updated)
            })
        })
    }
}

fn required<'a>(name: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(StoreError::invalid(format!("{name} is required")));
    }
    check_value(name, value)?;
    Ok(value)
}
