pub mod config;
pub mod delivery;
pub mod enrichment;
pub mod form;
pub mod lead;
pub mod normalization;
pub mod rate_limiter;
pub mod submitter;

pub use config::{Config, DeliveryMode};
pub use delivery::{DeliveryError, DeliveryStrategy};
pub use form::{FormBinding, FormOptions, FormSurface, MapForm};
pub use lead::{LeadSubmission, NormalizedLead, PageContext};
pub use rate_limiter::RateLimiter;
pub use submitter::{DeliveryResult, FailureKind, LeadSubmitter};
