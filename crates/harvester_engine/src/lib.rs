//! Harvester engine: browser automation, downloads and persistence around the pure scan core.
mod auth;
mod browser;
mod checkpoint;
mod engine;
mod events;
mod fetch;
mod harvest;
mod persist;
mod resolver;
mod scanner;
mod selectors;
mod types;
mod wait;
mod webdriver;

pub use auth::{
    AuthError, AuthenticationGate, ChallengeKind, ChallengeResolver, Credentials, GateStatus,
    DEFAULT_MAX_CHALLENGE_ROUNDS, DIAGNOSTIC_TIME_FORMAT,
};
pub use browser::{
    find_first, find_required, BrowserError, BrowserSession, ElementHandle, Locator, WindowHandle,
    ENTER_KEY,
};
pub use checkpoint::{CheckpointError, CheckpointStore, MissingCheckpoint};
pub use engine::{EngineConfig, HarvestEngine};
pub use events::{LoggingSink, NullSink};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher};
pub use harvest::{
    DecodeFailurePolicy, FeedPost, HarvestSettings, PostCapture, PostHarvester,
    DEFAULT_SNAPSHOT_WIDTH,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use resolver::{AttachmentResolver, ResolveError};
pub use scanner::{FeedScanner, ScanSettings};
pub use selectors::{FeedSelectors, LoginSelectors};
pub use types::{
    CaptureResult, EventSink, FailureKind, FetchError, FetchOutput, HarvestError,
    HarvestEvent, RunSummary, SavedAttachment, SkippedAttachment,
};
pub use wait::{
    wait_for_absence, wait_for_any, wait_for_count_above, wait_for_elements,
    wait_for_stable_height, WaitSettings,
};
pub use webdriver::{BrowserOptions, ChromeDriverProcess, WebDriverSession};
