pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod format;
pub mod normalize;

pub use cache::{Clock, ResponseCache, SystemClock};
pub use domain::permission::{PermissionDenial, PermissionOutcome, PermissionRecord};
pub use domain::request::{AdviceRequest, Convention, Params, Route, SubscribeRequest, UserLookup};
pub use errors::{ApplicationError, ErrorCode, InterfaceError};
pub use format::{OutboundResponse, Outcome};
pub use normalize::{normalize, InboundEvent, Invocation, NormalizeError};
