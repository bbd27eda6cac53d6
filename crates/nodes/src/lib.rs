//! `nodes` crate: the capabilities a workflow step is dispatched to.
//!
//! Every side effect of a step (running a process, calling an HTTP endpoint,
//! sending a notification) goes through one of the traits in [`traits`].
//! The engine crate only ever sees these trait objects, which keeps it
//! testable with the doubles in [`mock`].

pub mod error;
pub mod traits;
pub mod system;
pub mod http;
pub mod notify;
pub mod mock;

pub use error::NodeError;
pub use traits::{CommandOptions, CommandRunner, HttpCaller, HttpRequest, HttpResponse, Notifier};
pub use system::SystemRunner;
pub use http::ReqwestCaller;
pub use notify::ChannelNotifier;
