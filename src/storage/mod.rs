//! Record storage: positional records, id generation, and the per-collection
//! store with its append / scan / rewrite-all primitives.

mod collection;
mod ids;
mod record;

pub use collection::{CollectionStore, Loaded, Rewrite};
pub use ids::{IdGenerator, MAX_ID_ATTEMPTS, MAX_ID_LEN, MIN_ID_LEN};
pub use record::{check_value, Record, Schema, FIELD_DELIMITER};
