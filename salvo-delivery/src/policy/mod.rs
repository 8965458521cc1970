//! Delivery policies kept apart from run orchestration
//!
//! - [`TransientMatcher`]: decides whether a transport failure is temporary
//! - [`Throttle`]: paces transport calls
//! - [`RunHandler`]: lets a mailing be handed to another delivery path
//!   before the pipeline touches it

pub mod abdication;
pub mod throttle;
pub mod transient;

pub use abdication::{RunDecision, RunHandler, TemplateTypeGate};
pub use throttle::Throttle;
pub use transient::{FailureClass, TransientMatcher};
