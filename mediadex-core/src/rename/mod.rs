//! Universal rename tracker: pairs scanner delete/create events into moves
//! and rewrites catalog paths in place of a rescan.

pub mod pending;
pub mod protocol;
pub mod tracker;

pub use pending::PendingMoveTable;
pub use protocol::{
    FtpProtocol, LocalProtocol, NfsProtocol, ProtocolHandler, ProtocolRegistry,
    SmbProtocol, WebDavProtocol, fallback_identifier,
};
pub use tracker::{DetectCreateRequest, TrackDeleteRequest, UniversalRenameTracker};
