//! Core certificate watching types.

mod builder;
mod detector;
mod loader;
mod poller;
mod settings;
mod validation;
mod watcher;

pub use builder::CertWatcherBuilder;
pub use detector::ChangeDetector;
pub use loader::LoadedCertificate;
pub(crate) use loader::server_config_with;
pub use poller::{PollLoop, Polled};
pub use settings::{DEFAULT_INTERVAL, ENV_PREFIX, SettingsOverrides, WatchConfig};
pub use validation::Validate;
pub use watcher::CertWatcher;
