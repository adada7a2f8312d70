pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod control;
pub mod error;
pub mod feedback;
pub mod http_client;
pub mod profile;
pub mod recommender;
pub mod runtime;

pub use catalog::ActionCatalog;
pub use config::ControllerConfig;
pub use control::{ControlEvent, ControlLoop, ControlState, RunSummary};
pub use error::Fault;
pub use feedback::FeedbackLearner;
pub use profile::{Profile, ProfileMap, ProfileStore};
pub use recommender::Recommender;
pub use runtime::{ControllerRuntime, ControllerRuntimeBuilder};
