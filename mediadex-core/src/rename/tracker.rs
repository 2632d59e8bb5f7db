use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mediadex_model::{
    CatalogFile, FileId, PendingMove, RenameEvent, RenameEventId, RenameTrackerStats,
    StorageProtocol, StorageRootId,
};

use crate::catalog::{FileRepository, RenameEventRepository};
use crate::config::RenameSettings;
use crate::error::{CatalogError, Result};
use crate::fs::FileSystemClient;
use crate::rename::pending::PendingMoveTable;
use crate::rename::protocol::{ProtocolRegistry, fallback_identifier};

/// A delete observed by the scanner.
#[derive(Debug, Clone)]
pub struct TrackDeleteRequest {
    pub file_id: FileId,
    pub path: String,
    pub storage_root_id: StorageRootId,
    pub protocol: StorageProtocol,
    pub size: i64,
    pub hash: Option<String>,
    pub is_directory: bool,
    pub protocol_data: BTreeMap<String, String>,
}

/// A create observed by the scanner, possibly the second half of a move.
#[derive(Debug, Clone)]
pub struct DetectCreateRequest {
    pub new_path: String,
    pub storage_root_id: StorageRootId,
    pub protocol: StorageProtocol,
    pub size: i64,
    pub hash: Option<String>,
    pub is_directory: bool,
    pub protocol_data: BTreeMap<String, String>,
}

/// Turns delete+create pairs into O(affected-rows) catalog rewrites.
///
/// Deletes are parked in a bounded in-memory table under a protocol-aware
/// identity key; a create arriving within the protocol's move window claims
/// the entry, and `process_move` rewrites the subtree in one transaction
/// instead of re-ingesting it.
pub struct UniversalRenameTracker {
    pool: PgPool,
    pending: Arc<PendingMoveTable>,
    registry: Arc<ProtocolRegistry>,
    events: RenameEventRepository,
    settings: RenameSettings,
    tracked_deletes: AtomicU64,
    matched_creates: AtomicU64,
    processed_moves: AtomicU64,
    failed_moves: AtomicU64,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for UniversalRenameTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniversalRenameTracker")
            .field("pending", &self.pending.len())
            .field("capacity", &self.pending.capacity())
            .field("registry", &self.registry)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl UniversalRenameTracker {
    pub fn new(pool: PgPool, registry: Arc<ProtocolRegistry>, settings: RenameSettings) -> Self {
        let pending = Arc::new(PendingMoveTable::new(
            settings.pending_capacity,
            settings.eviction_fraction,
        ));
        let events = RenameEventRepository::new(pool.clone());

        Self {
            pool,
            pending,
            registry,
            events,
            settings,
            tracked_deletes: AtomicU64::new(0),
            matched_creates: AtomicU64::new(0),
            processed_moves: AtomicU64::new(0),
            failed_moves: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Park a delete in the pending table. Refuses unregistered protocols.
    pub fn track_delete(&self, req: TrackDeleteRequest) -> Result<()> {
        let handler = self.registry.get(req.protocol)?;

        let identifier = handler
            .file_identifier(&req.path, req.size, req.is_directory, &req.protocol_data)
            .unwrap_or_else(|| {
                fallback_identifier(
                    req.protocol,
                    req.hash.as_deref(),
                    req.size,
                    req.is_directory,
                )
            });
        let key = storage_key(req.protocol, req.storage_root_id, &identifier);

        debug!("tracking delete of {} under {}", req.path, key);
        self.pending.insert(
            key,
            PendingMove {
                file_id: req.file_id,
                old_path: req.path,
                storage_root_id: req.storage_root_id,
                protocol: req.protocol,
                size: req.size,
                hash: req.hash,
                is_directory: req.is_directory,
                deleted_at: Utc::now(),
                protocol_data: req.protocol_data,
            },
        );
        self.tracked_deletes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Claim the pending delete matching this create, if one exists within
    /// the protocol's move window. The take is atomic: no two callers can
    /// claim the same entry.
    pub fn detect_create(&self, req: &DetectCreateRequest) -> Result<Option<PendingMove>> {
        let handler = self.registry.get(req.protocol)?;

        let identifier = handler
            .file_identifier(&req.new_path, req.size, req.is_directory, &req.protocol_data)
            .unwrap_or_else(|| {
                fallback_identifier(
                    req.protocol,
                    req.hash.as_deref(),
                    req.size,
                    req.is_directory,
                )
            });
        let key = storage_key(req.protocol, req.storage_root_id, &identifier);

        let matched = self
            .pending
            .take_if_fresh(&key, handler.move_window(), Utc::now());

        if let Some(mv) = &matched {
            self.matched_creates.fetch_add(1, Ordering::Relaxed);
            debug!("matched create {} to deleted {}", req.new_path, mv.old_path);
        }

        Ok(matched)
    }

    /// Apply a matched move: protocol-level rename where the backend will
    /// not have seen one, then the atomic catalog rewrite. All-or-nothing on
    /// the database; any failure leaves paths untouched and records a
    /// `failed` audit event.
    pub async fn process_move(
        &self,
        client: &dyn FileSystemClient,
        mv: &PendingMove,
        new_path: &str,
    ) -> Result<RenameEvent> {
        let handler = self.registry.get(mv.protocol)?;

        if !handler.supports_realtime_notification() {
            if let Err(err) = handler
                .perform_move(client, &mv.old_path, new_path, mv.is_directory)
                .await
            {
                warn!(
                    "protocol-level move {} -> {} failed: {}",
                    mv.old_path, new_path, err
                );
                self.record_failure(mv, new_path).await;
                return Err(err);
            }

            match handler.validate_move(client, &mv.old_path, new_path).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        "backend does not reflect move {} -> {}",
                        mv.old_path, new_path
                    );
                    self.record_failure(mv, new_path).await;
                    return Err(CatalogError::Internal(format!(
                        "move validation failed for {new_path}"
                    )));
                }
                // Listing trouble after a successful rename is not worth
                // abandoning the move over.
                Err(err) => warn!("move validation errored for {}: {}", new_path, err),
            }
        }

        match self.rewrite_catalog(mv, new_path).await {
            Ok((event_id, rows)) => {
                self.processed_moves.fetch_add(1, Ordering::Relaxed);
                info!(
                    "processed move {} -> {} ({} rows)",
                    mv.old_path, new_path, rows
                );
                self.events.by_id(event_id).await?.ok_or_else(|| {
                    CatalogError::Internal(format!(
                        "rename event {event_id} vanished after commit"
                    ))
                })
            }
            Err(err) => {
                warn!(
                    "catalog rewrite {} -> {} rolled back: {}",
                    mv.old_path, new_path, err
                );
                self.record_failure(mv, new_path).await;
                Err(err)
            }
        }
    }

    /// One transaction: audit row, subtree selection parents-first, per-row
    /// path/name/parent rewrite, audit transition to `processed`.
    async fn rewrite_catalog(
        &self,
        mv: &PendingMove,
        new_path: &str,
    ) -> Result<(RenameEventId, usize)> {
        let mut tx = self.pool.begin().await?;

        let event_id = RenameEventRepository::insert_pending(&mut tx, mv, new_path).await?;

        let rows = FileRepository::subtree(&mut tx, mv.storage_root_id, &mv.old_path).await?;
        if rows.is_empty() {
            return Err(CatalogError::NotFound(format!(
                "no catalog rows at or under {}",
                mv.old_path
            )));
        }

        let count = rows.len();
        for row in rows {
            let node_path = if row.path == mv.old_path {
                new_path.to_string()
            } else {
                format!("{new_path}{}", &row.path[mv.old_path.len()..])
            };
            let node_name = CatalogFile::name_from_path(&node_path).to_string();
            // Parents sort first, so a child's new parent row is already in
            // place; a parent the catalog never ingested stays NULL.
            let parent_id = match CatalogFile::parent_path(&node_path) {
                Some(parent) => {
                    FileRepository::parent_id_by_path(&mut tx, mv.storage_root_id, parent)
                        .await?
                }
                None => None,
            };

            FileRepository::rewrite_location(&mut tx, row.id, &node_path, &node_name, parent_id)
                .await?;
        }

        RenameEventRepository::mark_processed(&mut tx, event_id).await?;
        tx.commit().await?;

        Ok((event_id, count))
    }

    async fn record_failure(&self, mv: &PendingMove, new_path: &str) {
        self.failed_moves.fetch_add(1, Ordering::Relaxed);
        // Outside the rolled-back transaction on purpose: the audit row must
        // survive the failure it documents.
        if let Err(err) = self.events.insert_failed(mv, new_path).await {
            warn!(
                "could not record failed rename event for {}: {}",
                mv.old_path, err
            );
        }
    }

    /// Remove pending entries older than their protocol's window.
    pub fn purge_expired_now(&self) -> usize {
        let registry = Arc::clone(&self.registry);
        self.pending.purge_expired(Utc::now(), move |protocol| {
            registry
                .move_window(protocol)
                .unwrap_or(Duration::from_secs(30))
        })
    }

    /// Spawn the background reaper. Idempotent; a second call is a no-op.
    pub fn start(&self) {
        let mut slot = self.worker.lock().expect("worker slot poisoned");
        if slot.is_some() {
            return;
        }

        let pending = Arc::clone(&self.pending);
        let registry = Arc::clone(&self.registry);
        let token = self.shutdown.clone();
        let interval = self.settings.cleanup_interval();

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let registry = Arc::clone(&registry);
                        let removed = pending.purge_expired(Utc::now(), move |protocol| {
                            registry
                                .move_window(protocol)
                                .unwrap_or(Duration::from_secs(30))
                        });
                        if removed > 0 {
                            debug!("reaped {} expired pending moves", removed);
                        }
                    }
                }
            }
        }));
    }

    /// Stop the reaper and wait for it. In-flight `process_move` calls run
    /// to commit or rollback on their own callers.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        let handle = self.worker.lock().expect("worker slot poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn statistics(&self) -> RenameTrackerStats {
        let (pending, pending_by_protocol, oldest_pending_secs) =
            self.pending.snapshot(Utc::now());

        RenameTrackerStats {
            pending,
            capacity: self.pending.capacity(),
            pending_by_protocol,
            oldest_pending_secs,
            tracked_deletes: self.tracked_deletes.load(Ordering::Relaxed),
            matched_creates: self.matched_creates.load(Ordering::Relaxed),
            processed_moves: self.processed_moves.load(Ordering::Relaxed),
            failed_moves: self.failed_moves.load(Ordering::Relaxed),
        }
    }

    /// Latest audit events, newest first.
    pub async fn rename_events(&self, limit: i64) -> Result<Vec<RenameEvent>> {
        self.events.recent(limit).await
    }
}

fn storage_key(protocol: StorageProtocol, root: StorageRootId, identifier: &str) -> String {
    format!("{}:{}:{}", protocol.as_str(), root.as_i64(), identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StorageRootRepository, files::NewFile};
    use crate::fs::MockFileSystemClient;
    use mediadex_model::RenameEventStatus;

    fn tracker_with(pool: PgPool, settings: RenameSettings) -> UniversalRenameTracker {
        let registry = Arc::new(ProtocolRegistry::with_defaults(&settings));
        UniversalRenameTracker::new(pool, registry, settings)
    }

    async fn seed_root(pool: &PgPool, protocol: StorageProtocol) -> StorageRootId {
        StorageRootRepository::new(pool.clone())
            .insert("main", protocol)
            .await
            .unwrap()
    }

    async fn seed_file(
        pool: &PgPool,
        root: StorageRootId,
        path: &str,
        is_directory: bool,
    ) -> FileId {
        FileRepository::new(pool.clone())
            .upsert(NewFile {
                storage_root_id: root,
                path,
                is_directory,
                size: if is_directory { 0 } else { 1024 },
                last_modified: Utc::now(),
                hash: None,
                extension: None,
                mime_type: None,
            })
            .await
            .unwrap()
    }

    fn delete_request(
        root: StorageRootId,
        protocol: StorageProtocol,
        file_id: FileId,
        path: &str,
        is_directory: bool,
    ) -> TrackDeleteRequest {
        TrackDeleteRequest {
            file_id,
            path: path.to_string(),
            storage_root_id: root,
            protocol,
            size: if is_directory { 0 } else { 1024 },
            hash: None,
            is_directory,
            protocol_data: BTreeMap::new(),
        }
    }

    fn create_request(
        root: StorageRootId,
        protocol: StorageProtocol,
        path: &str,
        is_directory: bool,
    ) -> DetectCreateRequest {
        DetectCreateRequest {
            new_path: path.to_string(),
            storage_root_id: root,
            protocol,
            size: if is_directory { 0 } else { 1024 },
            hash: None,
            is_directory,
            protocol_data: BTreeMap::new(),
        }
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn directory_move_rewrites_the_subtree(pool: PgPool) {
        let root = seed_root(&pool, StorageProtocol::Local).await;
        let dir = seed_file(&pool, root, "/a", true).await;
        let x = seed_file(&pool, root, "/a/x", false).await;
        let z = seed_file(&pool, root, "/a/y/z", false).await;

        let tracker = tracker_with(pool.clone(), RenameSettings::default());
        tracker
            .track_delete(delete_request(root, StorageProtocol::Local, dir, "/a", true))
            .unwrap();

        let mv = tracker
            .detect_create(&create_request(root, StorageProtocol::Local, "/b", true))
            .unwrap()
            .expect("create within the window must match");
        assert_eq!(mv.old_path, "/a");

        // Local delivers real-time notification; the backend already moved.
        let client = MockFileSystemClient::new();
        let event = tracker.process_move(&client, &mv, "/b").await.unwrap();
        assert_eq!(event.status, RenameEventStatus::Processed);
        assert_eq!(event.old_path, "/a");
        assert_eq!(event.new_path, "/b");
        assert!(event.processed_at.is_some());

        let files = FileRepository::new(pool.clone());
        let moved_dir = files.by_path(root, "/b").await.unwrap().unwrap();
        assert_eq!(moved_dir.id, dir);
        assert_eq!(moved_dir.storage_root_id, root);

        let moved_x = files.by_path(root, "/b/x").await.unwrap().unwrap();
        assert_eq!(moved_x.id, x);
        assert_eq!(moved_x.parent_id, Some(dir));

        // /b/y was never ingested; the orphan keeps a NULL parent.
        let moved_z = files.by_path(root, "/b/y/z").await.unwrap().unwrap();
        assert_eq!(moved_z.id, z);
        assert_eq!(moved_z.parent_id, None);

        let stale: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM files WHERE storage_root_id = $1 AND path LIKE '/a%'",
        )
        .bind(root.as_i64())
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(stale, 0);

        let stats = tracker.statistics();
        assert_eq!(stats.matched_creates, 1);
        assert_eq!(stats.processed_moves, 1);
        assert_eq!(stats.pending, 0);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn create_outside_the_window_does_not_match(pool: PgPool) {
        let root = seed_root(&pool, StorageProtocol::Local).await;
        let dir = seed_file(&pool, root, "/a", true).await;

        let mut settings = RenameSettings::default();
        settings.window_overrides_secs.insert("local".to_string(), 0);
        let tracker = tracker_with(pool.clone(), settings);

        tracker
            .track_delete(delete_request(root, StorageProtocol::Local, dir, "/a", true))
            .unwrap();

        let matched = tracker
            .detect_create(&create_request(root, StorageProtocol::Local, "/b", true))
            .unwrap();
        assert!(matched.is_none());

        // The expired entry stays until the reaper takes it.
        assert_eq!(tracker.statistics().pending, 1);
        assert_eq!(tracker.purge_expired_now(), 1);
        assert_eq!(tracker.statistics().pending, 0);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn failed_rewrite_rolls_back_and_records_the_failure(pool: PgPool) {
        let root = seed_root(&pool, StorageProtocol::Local).await;

        let tracker = tracker_with(pool.clone(), RenameSettings::default());
        // Track a path the catalog never ingested.
        tracker
            .track_delete(delete_request(
                root,
                StorageProtocol::Local,
                FileId(999),
                "/ghost",
                false,
            ))
            .unwrap();

        let mv = tracker
            .detect_create(&create_request(root, StorageProtocol::Local, "/ghost2", false))
            .unwrap()
            .unwrap();

        let client = MockFileSystemClient::new();
        let err = tracker.process_move(&client, &mv, "/ghost2").await;
        assert!(err.is_err());

        let events = tracker.rename_events(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, RenameEventStatus::Failed);
        assert_eq!(tracker.statistics().failed_moves, 1);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn smb_move_goes_through_the_backend(pool: PgPool) {
        let root = seed_root(&pool, StorageProtocol::Smb).await;
        let file = seed_file(&pool, root, "/share/movie.mkv", false).await;

        let tracker = tracker_with(pool.clone(), RenameSettings::default());
        let mut data = BTreeMap::new();
        data.insert("file_id".to_string(), "777".to_string());

        let mut delete = delete_request(root, StorageProtocol::Smb, file, "/share/movie.mkv", false);
        delete.protocol_data = data.clone();
        tracker.track_delete(delete).unwrap();

        let mut create = create_request(root, StorageProtocol::Smb, "/share/renamed.mkv", false);
        create.protocol_data = data;
        let mv = tracker.detect_create(&create).unwrap().unwrap();

        // SMB lacks real-time notification, so the tracker must replay the
        // move against the backend itself and confirm it took.
        let mut client = MockFileSystemClient::new();
        client
            .expect_rename()
            .withf(|old, new| old == "/share/movie.mkv" && new == "/share/renamed.mkv")
            .times(1)
            .returning(|_, _| Ok(()));
        client
            .expect_exists()
            .withf(|path| path == "/share/movie.mkv")
            .returning(|_| Ok(false));
        client
            .expect_exists()
            .withf(|path| path == "/share/renamed.mkv")
            .returning(|_| Ok(true));

        let event = tracker
            .process_move(&client, &mv, "/share/renamed.mkv")
            .await
            .unwrap();
        assert_eq!(event.status, RenameEventStatus::Processed);

        let files = FileRepository::new(pool.clone());
        assert!(files.by_path(root, "/share/renamed.mkv").await.unwrap().is_some());
        assert!(files.by_path(root, "/share/movie.mkv").await.unwrap().is_none());
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn backend_failure_leaves_the_catalog_untouched(pool: PgPool) {
        let root = seed_root(&pool, StorageProtocol::Smb).await;
        let file = seed_file(&pool, root, "/share/a.mkv", false).await;

        let tracker = tracker_with(pool.clone(), RenameSettings::default());
        tracker
            .track_delete(delete_request(root, StorageProtocol::Smb, file, "/share/a.mkv", false))
            .unwrap();
        let mv = tracker
            .detect_create(&create_request(root, StorageProtocol::Smb, "/share/b.mkv", false))
            .unwrap()
            .unwrap();

        let mut client = MockFileSystemClient::new();
        client.expect_rename().times(1).returning(|_, _| {
            Err(CatalogError::Internal("share unreachable".to_string()))
        });

        assert!(tracker.process_move(&client, &mv, "/share/b.mkv").await.is_err());

        let files = FileRepository::new(pool.clone());
        assert!(files.by_path(root, "/share/a.mkv").await.unwrap().is_some());
        let events = tracker.rename_events(10).await.unwrap();
        assert_eq!(events[0].status, RenameEventStatus::Failed);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn reaper_start_stop_round_trip(pool: PgPool) {
        let tracker = tracker_with(pool, RenameSettings::default());
        tracker.start();
        tracker.start(); // second call is a no-op
        tracker.stop().await;
    }
}
