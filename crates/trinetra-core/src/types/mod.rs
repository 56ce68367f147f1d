//! Domain types shared across the pipeline.
//!
//! Everything that crosses a service boundary lives here: the camera table,
//! frames and their bus metadata, detections, and the three wire events
//! (`DetectionEvent`, `IdentityEvent`, `AlertEvent`). All wire types derive
//! serde and serialize to the JSON shapes the downstream consumers expect.

mod camera;
mod detection;
mod events;
mod frame;
mod history;
mod travel;

pub use camera::{Camera, CameraType};
pub use detection::{cosine, l2_normalize, Detection, EMBEDDING_DIM, UNIT_NORM_TOLERANCE};
pub use events::{
    AlertEvent, AlertKind, DetectionEvent, IdentityEvent, IdentitySource, Severity,
    UNKNOWN_CUSTOMER,
};
pub use frame::{Frame, FrameMeta};
pub use history::HistoryRing;
pub use travel::TravelTimeMatrix;
