pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod executor;
pub mod http_client;
pub mod normalize;
pub mod pipeline;
pub mod planner;
pub mod retry;
pub mod sources;
pub mod validate;

pub mod test_support;

pub use config::LoaderConfig;
pub use daemon::Daemon;
pub use error::LoaderError;
pub use events::{Event, EventKind, EventLog};
pub use executor::{CacheMode, NetworkStatus, Payload, RequestDescriptor, RequestExecutor, ResponseFormat};
pub use http_client::{HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient, TransportError};
pub use normalize::{normalize, SourceContext, SourceDescriptor};
pub use pipeline::{JobOutcome, Pipeline, RefreshReport, SourceBatch, SourceJob, SourceOutcome};
pub use planner::{DimensionQuery, DimensionRules, Violation, YearRange};
pub use sources::{ObservationList, Provider, ResponseShape};
pub use validate::{validate, ValidationReport};
