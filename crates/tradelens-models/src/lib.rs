pub mod cache_schema;
pub mod classified_error;
pub mod config;
pub mod forecast;
pub mod macro_fact;
pub mod record;
pub mod trade_fact;

pub use cache_schema::{CacheCategory, CacheRow};
pub use classified_error::{ClassifiedError, ErrorKind, Severity};
pub use config::{CacheConfig, ExecutorConfig, ForecastConfig};
pub use forecast::{
    Diagnostics, ForecastOutcome, ForecastRequest, ForecastResponse, ForecastResult, OutputTag,
    RegressionResult, SmoothingParams,
};
pub use macro_fact::MacroFact;
pub use record::{CandidateRecord, CanonicalRecord, InvalidRecord, SchemaKind};
pub use trade_fact::{Flow, Frequency, ProductLevel, TradeFact};
