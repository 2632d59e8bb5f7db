use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::ModelError;

/// Storage backend protocol tag carried by every storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StorageProtocol {
    Local,
    Smb,
    Ftp,
    Nfs,
    WebDav,
}

impl StorageProtocol {
    /// All protocols the engine knows about, in registration order.
    pub const ALL: [StorageProtocol; 5] = [
        StorageProtocol::Local,
        StorageProtocol::Smb,
        StorageProtocol::Ftp,
        StorageProtocol::Nfs,
        StorageProtocol::WebDav,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageProtocol::Local => "local",
            StorageProtocol::Smb => "smb",
            StorageProtocol::Ftp => "ftp",
            StorageProtocol::Nfs => "nfs",
            StorageProtocol::WebDav => "webdav",
        }
    }
}

impl Display for StorageProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageProtocol {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageProtocol::Local),
            "smb" | "cifs" => Ok(StorageProtocol::Smb),
            "ftp" | "ftps" => Ok(StorageProtocol::Ftp),
            "nfs" => Ok(StorageProtocol::Nfs),
            "webdav" | "dav" => Ok(StorageProtocol::WebDav),
            other => Err(ModelError::UnknownProtocol(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_tags() {
        for protocol in StorageProtocol::ALL {
            assert_eq!(protocol.as_str().parse::<StorageProtocol>().unwrap(), protocol);
        }
    }

    #[test]
    fn accepts_common_aliases() {
        assert_eq!("cifs".parse::<StorageProtocol>().unwrap(), StorageProtocol::Smb);
        assert_eq!("DAV".parse::<StorageProtocol>().unwrap(), StorageProtocol::WebDav);
        assert!("gopher".parse::<StorageProtocol>().is_err());
    }
}
