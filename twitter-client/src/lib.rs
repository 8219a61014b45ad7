pub mod api;
pub mod extract;

pub use api::{TwitterApiClient, REGION_FETCH_DELAY};
pub use extract::{region_from_raw, regions_from_raw, topics_from_payload};
