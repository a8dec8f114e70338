//! Domain models for Geo Tracker.

pub mod area_of_interest;
pub mod device;
pub mod event;
pub mod location;
pub mod session;

pub use area_of_interest::{AreaOfInterest, AreaOwner, AreaShape, AreaShapeInput, Circle};
pub use device::{ProviderCredentials, TrackedDevice};
pub use event::{Event, EventStatus, EventType, NewEvent};
pub use location::{LocationFix, NewLocationFix, Position, FIX_RETENTION};
pub use session::{SessionState, SessionToken};
