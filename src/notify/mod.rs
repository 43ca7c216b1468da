//! Delivery of renewed certificates.
//!
//! A [`Delivery`] decides what happens to each certificate the poll loop
//! reads: run a consumer for it, send it on a channel or swap it into a
//! shared handle.

mod channel;
mod delivery;
mod invocation;
mod swap;

pub use channel::{CertificateStream, ChannelDelivery};
pub use delivery::{Delivery, Prepared};
pub use invocation::PreemptiveDelivery;
pub use swap::{CertificateHandle, SwapDelivery};
