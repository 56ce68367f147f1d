//! Centralized defaults and tuning constants.
//!
//! Every threshold that shapes pipeline behavior is named here, so the
//! services, the tests, and the configuration layer agree on one value.

/// Frame bus capacity and trim behavior.
pub mod framebus {
    /// Default per-camera stream cap (entries).
    pub const FRAME_BUFFER_MAXLEN: usize = 100;

    /// Trim is approximate: up to this many entries of slack above the cap
    /// before the head is dropped.
    pub const TRIM_SLACK: usize = 10;

    /// Blocking consume window.
    pub const CONSUME_BLOCK_MS: u64 = 50;

    /// Idle time before a pending entry becomes reclaimable.
    pub const RECLAIM_IDLE_MS: u64 = 60_000;
}

/// Event log topology and retention.
pub mod eventlog {
    pub const TOPIC_DETECTIONS: &str = "detections";
    pub const TOPIC_IDENTITIES: &str = "identities";
    pub const TOPIC_ALERTS: &str = "alerts";

    pub const DETECTIONS_PARTITIONS: u32 = 8;
    pub const IDENTITIES_PARTITIONS: u32 = 8;
    pub const ALERTS_PARTITIONS: u32 = 3;

    /// Records older than this are pruned.
    pub const RETENTION_HOURS: u64 = 24;

    /// Consumer lag on `detections` above which an alert is raised.
    pub const LAG_ALERT_THRESHOLD: u64 = 5_000;

    /// Publish retry policy used by the worker and resolver.
    pub const PUBLISH_RETRIES: usize = 5;
    pub const PUBLISH_BACKOFF_MS: u64 = 100;
}

/// Stream ingestor tuning.
pub mod ingest {
    /// Inference frame edge; frames are resized to this square.
    pub const FRAME_EDGE: u32 = 640;

    /// JPEG quality for bus payloads. Balances size against model accuracy.
    pub const JPEG_QUALITY: u8 = 85;

    /// Validator bounds. Outside these the frame is blank or corrupted.
    pub const PIXEL_MEAN_MIN: f64 = 2.0;
    pub const PIXEL_MEAN_MAX: f64 = 253.0;
    pub const PIXEL_STD_MIN: f64 = 5.0;

    /// Fill ratio above which the sampler widens its skip interval.
    pub const HIGH_WATER_FILL: f64 = 0.80;

    /// Motion score above which the sampler narrows its skip interval.
    pub const MOTION_THRESHOLD: f64 = 2.5;

    /// Skip interval never exceeds base * this factor.
    pub const SKIP_CAP_FACTOR: u32 = 3;

    /// Burst suppressor token bucket capacity.
    pub const TOKEN_BUCKET_CAPACITY: f64 = 5.0;

    /// Reader-to-pipeline in-process queue depth per camera.
    pub const READER_QUEUE_CAP: usize = 30;

    /// Reconnect backoff schedule, seconds.
    pub const BACKOFF_INITIAL_S: f64 = 1.0;
    pub const BACKOFF_CEILING_S: f64 = 30.0;

    /// Assumed capture rate when the source does not report one.
    pub const DEFAULT_CAPTURE_FPS: u32 = 30;
}

/// Inference worker tuning.
pub mod worker {
    pub const CONSUMER_GROUP: &str = "inference-workers";

    /// Micro-batch size cap.
    pub const BATCH_SIZE: usize = 4;

    /// Micro-batch time cap from accumulation start.
    pub const BATCH_TIMEOUT_MS: u64 = 20;

    /// Face crops per embedder invocation.
    pub const SUB_BATCH_MAX: usize = 16;

    /// Face crop edge and normalization midpoint.
    pub const CROP_EDGE: u32 = 112;
    pub const CROP_NORM_MIDPOINT: f32 = 127.5;

    /// Operator invocation deadline.
    pub const OPERATOR_TIMEOUT_MS: u64 = 500;
}

/// Identity resolver tuning.
pub mod resolver {
    pub const CONSUMER_GROUP: &str = "identity-resolvers";

    /// Minimum cosine for a gallery candidate.
    pub const COSINE_THRESHOLD: f32 = 0.72;

    /// Minimum average score for history confirmation.
    pub const HISTORY_THRESHOLD: f32 = 0.74;

    /// Ring size and votes needed for confirmation.
    pub const HISTORY_RING: usize = 5;
    pub const HISTORY_MAJORITY: usize = 3;

    /// Max in-store session and registry TTL (one parameter by design).
    pub const TEMPORAL_GATE_WINDOW_S: f64 = 3600.0;

    /// Travel-time safety factor absorbing cross-camera clock skew.
    pub const TRAVEL_SAFETY_FACTOR: f64 = 0.9;

    /// Gallery EMA update: only applied above this score, at this weight.
    pub const EMA_MIN_SCORE: f32 = 0.85;
    pub const EMA_ALPHA: f32 = 0.05;

    /// ANN search effort.
    pub const TOP_K: usize = 5;
    pub const EF_BILLING: usize = 128;
    pub const EF_DEFAULT: usize = 50;

    /// Track goes stale after this much silence; its ring is cleared.
    pub const STALE_TRACK_S: f64 = 30.0;

    /// Registry sweep cadence: whichever fires first.
    pub const SWEEP_EVERY_EVENTS: u64 = 1_000;
    pub const SWEEP_EVERY_S: u64 = 60;

    /// Reverse-index false-merge check cadence, in processed events.
    pub const FALSE_MERGE_CHECK_EVERY: u64 = 100;
}

/// Shutdown behavior common to all services.
pub mod shutdown {
    /// In-flight work gets this long to drain before the process exits.
    pub const DRAIN_DEADLINE_S: u64 = 10;
}
