//! Network naming and destination keys.
//!
//! See [`DestinationKey`] for the centerpiece of this module.

mod network;
#[doc(inline)]
pub use network::{AddressFamily, Network, UnknownNetworkError};

mod key;
#[doc(inline)]
pub use key::DestinationKey;

pub mod conn;
