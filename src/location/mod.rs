pub mod calculator;
pub mod finder;
pub mod log;
pub mod store;
pub mod types;

pub use calculator::{CalculateLocationsRequest, LineShiftCalculator, LocationCalculator};
pub use finder::{FinderContext, MarkerLocationFinder, DEFAULT_HISTORY_LIMIT};
pub use log::{FinderLog, RecordingLog, TracingLog};
pub use store::{CachedLocationStore, LocationStore, MarkerLocations};
pub use types::{
    Location, LocationMeta, LocationReport, LocationsById, Marker, MissingLocation,
    MissingReason, MAX_RANGE_VALUE,
};
