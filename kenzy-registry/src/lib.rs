//! Peer registry and ask-callback table shared by the command bus and
//! transport layer.
//!
//! Kept deliberately free of any dependency on the bus's envelope types
//! ([`AskTable`] is generic over the caller's context type) so the
//! dependency graph stays one-directional: the bus depends on the registry,
//! never the reverse.

mod ask;
mod error;
mod peer;
mod registry;

pub use ask::{AskCallback, AskTable};
pub use error::RegistryError;
pub use peer::PeerRecord;
pub use registry::PeerRegistry;
