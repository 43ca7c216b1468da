//! Certificate source implementations.

mod cert_dir;
#[cfg(feature = "command")]
mod command;
mod key_pair;

pub use cert_dir::{CERT_FILE, CertDir, KEY_FILE, TimestampPair};
#[cfg(feature = "command")]
pub use command::{CommandSource, CommandStream};
pub use key_pair::X509KeyPair;
