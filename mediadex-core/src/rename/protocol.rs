use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use mediadex_model::StorageProtocol;

use crate::config::RenameSettings;
use crate::error::{CatalogError, Result};
use crate::fs::FileSystemClient;

/// Capability set one storage protocol contributes to the rename tracker.
///
/// Implementations are stateless values; windows reflect how long the
/// protocol may sit between the delete and the create of a move.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    fn protocol(&self) -> StorageProtocol;

    /// Stable identity for a path during delete/create pairing, when the
    /// backend offers one. `None` falls back to content identity.
    fn file_identifier(
        &self,
        path: &str,
        size: i64,
        is_directory: bool,
        protocol_data: &BTreeMap<String, String>,
    ) -> Option<String>;

    /// Execute the move on the backend itself. Only called for protocols
    /// without real-time notification, where the observed delete/create pair
    /// is the only evidence and the backend still holds the old layout.
    async fn perform_move(
        &self,
        client: &dyn FileSystemClient,
        old_path: &str,
        new_path: &str,
        is_directory: bool,
    ) -> Result<()>;

    /// Confirm that the backend reflects the move: old gone, new present.
    async fn validate_move(
        &self,
        client: &dyn FileSystemClient,
        old_path: &str,
        new_path: &str,
    ) -> Result<bool>;

    /// Maximum delete-to-create gap still interpreted as a move.
    fn move_window(&self) -> Duration;

    fn supports_realtime_notification(&self) -> bool;
}

/// Deterministic fallback identity when a protocol offers none:
/// `fallback:<protocol>:<hash|nil>:<size>:<dir-flag>`.
pub fn fallback_identifier(
    protocol: StorageProtocol,
    hash: Option<&str>,
    size: i64,
    is_directory: bool,
) -> String {
    format!(
        "fallback:{}:{}:{}:{}",
        protocol.as_str(),
        hash.filter(|h| !h.is_empty()).unwrap_or("nil"),
        size,
        if is_directory { "d" } else { "f" },
    )
}

async fn rename_on_backend(
    client: &dyn FileSystemClient,
    old_path: &str,
    new_path: &str,
) -> Result<()> {
    client.rename(old_path, new_path).await
}

async fn old_gone_new_present(
    client: &dyn FileSystemClient,
    old_path: &str,
    new_path: &str,
) -> Result<bool> {
    Ok(!client.exists(old_path).await? && client.exists(new_path).await?)
}

macro_rules! protocol_handler {
    (
        $(#[$doc:meta])*
        $name:ident, $protocol:expr, $default_window_secs:expr,
        realtime: $realtime:expr, data_key: $data_key:expr, id_prefix: $id_prefix:expr
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            window: Duration,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    window: Duration::from_secs($default_window_secs),
                }
            }
        }

        impl $name {
            pub fn with_window(window: Duration) -> Self {
                Self { window }
            }
        }

        #[async_trait]
        impl ProtocolHandler for $name {
            fn protocol(&self) -> StorageProtocol {
                $protocol
            }

            fn file_identifier(
                &self,
                _path: &str,
                _size: i64,
                _is_directory: bool,
                protocol_data: &BTreeMap<String, String>,
            ) -> Option<String> {
                let key: Option<&str> = $data_key;
                let value = protocol_data.get(key?)?;
                if value.is_empty() {
                    return None;
                }
                Some(format!("{}:{}", $id_prefix, value))
            }

            async fn perform_move(
                &self,
                client: &dyn FileSystemClient,
                old_path: &str,
                new_path: &str,
                _is_directory: bool,
            ) -> Result<()> {
                rename_on_backend(client, old_path, new_path).await
            }

            async fn validate_move(
                &self,
                client: &dyn FileSystemClient,
                old_path: &str,
                new_path: &str,
            ) -> Result<bool> {
                old_gone_new_present(client, old_path, new_path).await
            }

            fn move_window(&self) -> Duration {
                self.window
            }

            fn supports_realtime_notification(&self) -> bool {
                $realtime
            }
        }
    };
}

protocol_handler!(
    /// Local mounts surface inode numbers and deliver change events
    /// promptly, so the window stays tight.
    LocalProtocol, StorageProtocol::Local, 5,
    realtime: true, data_key: Some("inode"), id_prefix: "inode"
);

protocol_handler!(
    /// SMB/CIFS exposes a persistent FileId on servers that support it.
    SmbProtocol, StorageProtocol::Smb, 10,
    realtime: false, data_key: Some("file_id"), id_prefix: "fileid"
);

protocol_handler!(
    /// FTP has no stable identity at all; pairing relies on the content
    /// fallback. Slow listings earn the widest window.
    FtpProtocol, StorageProtocol::Ftp, 30,
    realtime: false, data_key: None, id_prefix: "none"
);

protocol_handler!(
    /// NFS file handles carry a fileid attribute.
    NfsProtocol, StorageProtocol::Nfs, 10,
    realtime: false, data_key: Some("fileid"), id_prefix: "fileid"
);

protocol_handler!(
    /// WebDAV etags survive moves on the servers we target.
    WebDavProtocol, StorageProtocol::WebDav, 15,
    realtime: false, data_key: Some("etag"), id_prefix: "etag"
);

/// Flat registry mapping protocol tags to their handlers.
pub struct ProtocolRegistry {
    handlers: HashMap<StorageProtocol, Arc<dyn ProtocolHandler>>,
}

impl fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.handlers.keys().map(|p| p.as_str()).collect();
        tags.sort_unstable();
        f.debug_struct("ProtocolRegistry")
            .field("protocols", &tags)
            .finish()
    }
}

impl ProtocolRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in handler, honoring per-protocol window
    /// overrides from settings.
    pub fn with_defaults(settings: &RenameSettings) -> Self {
        let mut registry = Self::empty();

        let window = |protocol: StorageProtocol, default_secs: u64| {
            settings
                .window_override(protocol)
                .unwrap_or(Duration::from_secs(default_secs))
        };

        registry.register(Arc::new(LocalProtocol::with_window(window(
            StorageProtocol::Local,
            5,
        ))));
        registry.register(Arc::new(SmbProtocol::with_window(window(
            StorageProtocol::Smb,
            10,
        ))));
        registry.register(Arc::new(FtpProtocol::with_window(window(
            StorageProtocol::Ftp,
            30,
        ))));
        registry.register(Arc::new(NfsProtocol::with_window(window(
            StorageProtocol::Nfs,
            10,
        ))));
        registry.register(Arc::new(WebDavProtocol::with_window(window(
            StorageProtocol::WebDav,
            15,
        ))));

        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ProtocolHandler>) {
        self.handlers.insert(handler.protocol(), handler);
    }

    /// Handler lookup. Tracking is refused for unregistered protocols.
    pub fn get(&self, protocol: StorageProtocol) -> Result<&Arc<dyn ProtocolHandler>> {
        self.handlers.get(&protocol).ok_or_else(|| {
            warn!("no handler registered for protocol {}", protocol);
            CatalogError::UnknownProtocol(protocol.as_str().to_string())
        })
    }

    pub fn move_window(&self, protocol: StorageProtocol) -> Option<Duration> {
        self.handlers.get(&protocol).map(|h| h.move_window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_windows_match_protocol_latency() {
        let registry = ProtocolRegistry::with_defaults(&RenameSettings::default());
        assert_eq!(
            registry.move_window(StorageProtocol::Local),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            registry.move_window(StorageProtocol::Ftp),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            registry.move_window(StorageProtocol::WebDav),
            Some(Duration::from_secs(15))
        );
    }

    #[test]
    fn window_overrides_apply() {
        let mut settings = RenameSettings::default();
        settings.window_overrides_secs.insert("smb".to_string(), 60);
        let registry = ProtocolRegistry::with_defaults(&settings);
        assert_eq!(
            registry.move_window(StorageProtocol::Smb),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn identifier_prefers_protocol_data() {
        let handler = LocalProtocol::default();
        let mut data = BTreeMap::new();
        data.insert("inode".to_string(), "98765".to_string());

        assert_eq!(
            handler.file_identifier("/a/b.mkv", 10, false, &data),
            Some("inode:98765".to_string())
        );
        assert_eq!(handler.file_identifier("/a/b.mkv", 10, false, &BTreeMap::new()), None);
    }

    #[test]
    fn ftp_never_identifies() {
        let handler = FtpProtocol::default();
        let mut data = BTreeMap::new();
        data.insert("anything".to_string(), "1".to_string());
        assert_eq!(handler.file_identifier("/x", 1, false, &data), None);
    }

    #[test]
    fn fallback_identifier_is_deterministic() {
        let a = fallback_identifier(StorageProtocol::Ftp, None, 0, true);
        let b = fallback_identifier(StorageProtocol::Ftp, None, 0, true);
        assert_eq!(a, b);
        assert_eq!(a, "fallback:ftp:nil:0:d");
        assert_eq!(
            fallback_identifier(StorageProtocol::Smb, Some("abc123"), 42, false),
            "fallback:smb:abc123:42:f"
        );
    }

    #[test]
    fn unknown_protocol_is_refused() {
        let registry = ProtocolRegistry::empty();
        assert!(registry.get(StorageProtocol::Nfs).is_err());
    }
}
