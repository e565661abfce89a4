//! Webhook configuration index
//!
//! The approver needs to know which Services are entitled to serving certificates. A Service is
//! entitled when an admission webhook configuration calls it:
//!
//! - Each `ValidatingWebhookConfiguration` and `MutatingWebhookConfiguration` lists webhooks, each
//!   of which may reference a Service by namespace and name. Webhooks configured with a URL are not
//!   indexed.
//! - A configuration may also be annotated with allow-lists of usernames and groups that may
//!   request certificates on its behalf.
//!
//! ```text
//! [ Service ] <- [ WebhookConfiguration ] -> [ username | group ]
//! ```
//!
//! The index is updated by a single task per resource kind and is read by the approval controller.
//! Lookups are answered from reverse maps so that they do not need to scan every configuration.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod index;
pub mod metrics;


pub use self::index::{Configuration, ConfigurationResource, Index, SharedIndex};
