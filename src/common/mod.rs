//! Common Infrastructure Module
//!
//! Configuration, structured logging, HTTP clients and the root error type.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;

pub use config::{ConfigError, ConfirmationMode, Environment, PtcConfig};
pub use error::{PtcError, Result};
pub use http::{client_with_timeout, DEFAULT_HTTP_TIMEOUT, DEFAULT_PAYOUT_TIMEOUT};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_api_request, log_api_response,
    log_security_event, log_withdrawal_event, ErrorDetails, EventCategory, LogEvent, LogLevel,
    LoggingError,
};
