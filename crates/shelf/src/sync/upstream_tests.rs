use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use shelf_api::{
    ItemError, RecordId, RemoteErrorKind, RemoteRecord, SystemFields, TransportError,
    UploadOutcome, Value,
};

use crate::config::SyncConfig;
use crate::core::{FieldKey, LocalStore, PendingKeys, RemoteStore, SyncEntity};
use crate::error::SyncError;
use crate::storage::MemoryStore;
use crate::sync::{ItemErrorHandler, UpstreamReconciler};
use crate::testing::FakeRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum NoteKey {
    Title,
    Body,
}

impl FieldKey for NoteKey {
    const ALL: &'static [Self] = &[NoteKey::Title, NoteKey::Body];

    fn remote_name(&self) -> &'static str {
        match self {
            NoteKey::Title => "title",
            NoteKey::Body => "body",
        }
    }
}

#[derive(Debug, Clone)]
struct TestNote {
    id: RecordId,
    title: String,
    body: String,
    pending: PendingKeys<NoteKey>,
    system_fields: Option<SystemFields>,
}

impl TestNote {
    fn new(id: &str) -> Self {
        Self {
            id: RecordId::new(id),
            title: format!("{} title", id),
            body: String::new(),
            pending: PendingKeys::new(),
            system_fields: None,
        }
    }

    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.pending.insert(NoteKey::Title);
    }

    fn set_body(&mut self, body: &str) {
        self.body = body.to_string();
        self.pending.insert(NoteKey::Body);
    }
}

impl SyncEntity for TestNote {
    type Key = NoteKey;

    fn record_id(&self) -> &RecordId {
        &self.id
    }

    fn field_value(&self, key: NoteKey) -> Value {
        match key {
            NoteKey::Title => Value::from(self.title.as_str()),
            NoteKey::Body => Value::from(self.body.as_str()),
        }
    }

    fn pending_remote_update_keys(&self) -> &PendingKeys<NoteKey> {
        &self.pending
    }

    fn remove_pending_remote_update_keys(&mut self, keys: &[NoteKey]) {
        self.pending.remove_all(keys);
    }

    fn system_fields(&self) -> Option<&SystemFields> {
        self.system_fields.as_ref()
    }

    fn store_system_fields(&mut self, fields: SystemFields) {
        self.system_fields = Some(fields);
    }
}

type Reconciler<R> = UpstreamReconciler<TestNote, MemoryStore<TestNote>, R>;

/// Notes already on the server, with the given ids retitled locally
async fn synced_notes(
    remote: &FakeRemote<NoteKey>,
    ids: &[&str],
) -> Arc<MemoryStore<TestNote>> {
    let mut notes = Vec::new();
    for id in ids {
        let mut note = TestNote::new(id);
        note.system_fields = Some(remote.seed(&note.remote_record_for_update()).await);
        note.set_title(&format!("{} edited", id));
        notes.push(note);
    }
    Arc::new(MemoryStore::with_entities(notes))
}

fn reconciler<R: RemoteStore<NoteKey>>(
    store: &Arc<MemoryStore<TestNote>>,
    remote: &Arc<R>,
    config: SyncConfig,
) -> Reconciler<R> {
    UpstreamReconciler::new(store.clone(), remote.clone(), config)
}

#[tokio::test]
async fn test_empty_batch_does_not_contact_remote() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::<NoteKey>::new());
    let store = Arc::new(MemoryStore::new());
    let reconciler = reconciler(&store, &remote, SyncConfig::default());

    let report = reconciler.reconcile(Vec::new()).await?;
    assert_eq!(report, Default::default());
    assert!(remote.uploads().await.is_empty());

    let report = reconciler.push_pending().await?;
    assert_eq!(report.uploaded, 0);
    assert!(remote.uploads().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_total_failure_leaves_local_state_untouched() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a", "b"]).await;
    let before = store.all().await;
    remote
        .fail_next_upload(TransportError::ServiceUnavailable {
            message: "maintenance".into(),
            retry_after_secs: Some(30),
        })
        .await;

    let result = reconciler(&store, &remote, SyncConfig::default())
        .push_pending()
        .await;

    assert!(matches!(result, Err(ref e) if e.is_transport()));
    let after = store.all().await;
    for (before, after) in before.iter().zip(&after) {
        assert_eq!(before.pending, after.pending);
        assert_eq!(before.system_fields, after.system_fields);
    }
    Ok(())
}

#[tokio::test]
async fn test_failed_commit_persists_nothing() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a"]).await;
    let id = RecordId::new("a");
    let old_tag = store.get(&id).await.unwrap().system_fields;
    store.fail_next_commit("disk full");

    let result = reconciler(&store, &remote, SyncConfig::default())
        .push_pending()
        .await;

    assert!(matches!(result, Err(SyncError::Storage(_))));
    let note = store.get(&id).await.unwrap();
    assert!(note.pending.contains(NoteKey::Title));
    assert_eq!(note.system_fields, old_tag);
    Ok(())
}

/// Remote that accepts every batch but never returns saved metadata
struct ForgetfulRemote;

#[async_trait]
impl RemoteStore<NoteKey> for ForgetfulRemote {
    async fn upload(&self, _records: &[RemoteRecord<NoteKey>]) -> UploadOutcome {
        UploadOutcome::AllSucceeded {
            saved: Default::default(),
        }
    }
}

#[tokio::test]
async fn test_record_missing_from_outcome_stays_pending() -> anyhow::Result<()> {
    let mut note = TestNote::new("a");
    note.set_body("draft");
    let store = Arc::new(MemoryStore::with_entities(vec![note]));
    let remote = Arc::new(ForgetfulRemote);

    let report = reconciler(&store, &remote, SyncConfig::default())
        .push_pending()
        .await?;

    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error.kind, RemoteErrorKind::Unknown);
    let note = store.get(&RecordId::new("a")).await.unwrap();
    assert!(note.pending.contains(NoteKey::Body));
    assert!(note.system_fields.is_none());
    Ok(())
}

#[tokio::test]
async fn test_push_pending_splits_into_batches() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a", "b", "c", "d", "e"]).await;

    let report = reconciler(&store, &remote, SyncConfig::new(2))
        .push_pending()
        .await?;

    let sizes: Vec<usize> = remote.uploads().await.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(report.uploaded, 5);
    assert_eq!(report.succeeded, 5);
    assert!(report.is_settled());
    assert!(store.fetch_pending().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_item_error_hook_receives_raw_kind() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a", "b"]).await;
    remote
        .fail_record(&RecordId::new("b"), ItemError::quota("zone full"))
        .await;

    let seen: Arc<StdMutex<Vec<(RecordId, RemoteErrorKind)>>> = Arc::default();
    let sink = seen.clone();
    let handler: Arc<dyn ItemErrorHandler> = Arc::new(move |id: &RecordId, error: &ItemError| {
        sink.lock().unwrap().push((id.clone(), error.kind));
    });

    let report = reconciler(&store, &remote, SyncConfig::default())
        .with_item_error_handler(handler)
        .push_pending()
        .await?;

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(RecordId::new("b"), RemoteErrorKind::Quota)]
    );
    assert_eq!(report.failed_ids(), vec![&RecordId::new("b")]);
    assert!(
        store
            .get(&RecordId::new("b"))
            .await
            .unwrap()
            .pending
            .contains(NoteKey::Title)
    );
    Ok(())
}

#[tokio::test]
async fn test_edit_during_upload_stays_pending() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a"]).await;
    let id = RecordId::new("a");

    let racing_store = store.clone();
    let racing_id = id.clone();
    remote.during_next_upload(move || async move {
        racing_store
            .update(&racing_id, |note| note.set_title("edited again"))
            .await
            .unwrap();
    });

    let report = reconciler(&store, &remote, SyncConfig::default())
        .push_pending()
        .await?;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.cleared_keys, 0);
    assert_eq!(report.still_pending[0].fields, vec!["title".to_string()]);

    let note = store.get(&id).await.unwrap();
    let server = remote.record(&id).await.unwrap();
    assert!(note.pending.contains(NoteKey::Title));
    assert_eq!(note.system_fields.as_ref(), server.system_fields());
    assert_eq!(server.get(&NoteKey::Title), Some(&Value::from("a edited")));

    // The next pass uploads the newer title and settles
    let report = reconciler(&store, &remote, SyncConfig::default())
        .push_pending()
        .await?;
    assert!(report.is_settled());
    assert!(store.fetch_pending().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delete_during_upload_is_skipped() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a", "b"]).await;

    let racing_store = store.clone();
    remote.during_next_upload(move || async move {
        racing_store.delete(&RecordId::new("a")).await;
    });

    let report = reconciler(&store, &remote, SyncConfig::default())
        .push_pending()
        .await?;

    assert_eq!(report.skipped_deleted, 1);
    assert_eq!(report.succeeded, 1);
    assert!(store.get(&RecordId::new("a")).await.is_none());
    assert_eq!(store.all().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_later_pass_skips_entity_deleted_during_earlier_pass() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a", "b", "c"]).await;

    let racing_store = store.clone();
    remote.during_next_upload(move || async move {
        racing_store.delete(&RecordId::new("c")).await;
    });

    let report = reconciler(&store, &remote, SyncConfig::new(2))
        .push_pending()
        .await?;

    assert_eq!(
        remote.uploads().await,
        vec![vec![RecordId::new("a"), RecordId::new("b")]]
    );
    assert_eq!(report.skipped_deleted, 1);
    assert_eq!(report.succeeded, 2);
    let server = remote.record(&RecordId::new("c")).await.unwrap();
    assert_eq!(server.get(&NoteKey::Title), Some(&Value::from("c title")));
    Ok(())
}

#[tokio::test]
async fn test_later_pass_uploads_edit_made_during_earlier_pass() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a", "b", "c"]).await;

    let racing_store = store.clone();
    remote.during_next_upload(move || async move {
        racing_store
            .update(&RecordId::new("c"), |note| note.set_title("newest"))
            .await
            .unwrap();
    });

    let report = reconciler(&store, &remote, SyncConfig::new(2))
        .push_pending()
        .await?;

    assert_eq!(remote.uploads().await.len(), 2);
    assert!(report.is_settled());
    let server = remote.record(&RecordId::new("c")).await.unwrap();
    assert_eq!(server.get(&NoteKey::Title), Some(&Value::from("newest")));
    assert!(store.fetch_pending().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_record_deleted_during_upload_reports_nothing() -> anyhow::Result<()> {
    let remote = Arc::new(FakeRemote::new());
    let store = synced_notes(&remote, &["a", "b"]).await;
    remote
        .fail_record(&RecordId::new("a"), ItemError::conflict("server record changed"))
        .await;

    let racing_store = store.clone();
    remote.during_next_upload(move || async move {
        racing_store.delete(&RecordId::new("a")).await;
    });

    let seen: Arc<StdMutex<Vec<RecordId>>> = Arc::default();
    let sink = seen.clone();
    let handler: Arc<dyn ItemErrorHandler> = Arc::new(move |id: &RecordId, _: &ItemError| {
        sink.lock().unwrap().push(id.clone());
    });

    let report = reconciler(&store, &remote, SyncConfig::default())
        .with_item_error_handler(handler)
        .push_pending()
        .await?;

    assert!(seen.lock().unwrap().is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(report.skipped_deleted, 1);
    assert_eq!(report.succeeded, 1);
    Ok(())
}
