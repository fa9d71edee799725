use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, field, info, instrument, warn};

use crate::error::CompletionError;
use crate::logger::{annotate_span, warn_if_slow};
use crate::metrics::counters::Counters;
use crate::progress::model::{
    CallerIdentity, CompletionKind, CompletionRequest, CompletionTarget, ProgressKey,
    ProgressRecord, Receipt,
};
use crate::progress::reward::resolve_reward;
use crate::progress::store::{CommitOutcome, DocumentStore};
use crate::time::now_ms;

const DEFAULT_SLOW_STORE: Duration = Duration::from_millis(100);

/// Server-authoritative completion workflow.
///
/// Stateless apart from the injected store client: every call validates,
/// checks idempotency, resolves the reward from the catalog, then commits
/// the progress record and the points increment as one unit.
pub struct CompletionService {
    store: Arc<dyn DocumentStore>,
    counters: Counters,
    slow_store: Duration,
}

impl CompletionService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            counters: Counters::default(),
            slow_store: DEFAULT_SLOW_STORE,
        }
    }

    /// Store round-trips slower than `max` are logged as warnings.
    pub fn with_slow_store_threshold(mut self, max: Duration) -> Self {
        self.slow_store = max;
        self
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub async fn complete_module(
        &self,
        caller: Option<&CallerIdentity>,
        course_id: &str,
        module_id: &str,
    ) -> Result<Receipt, CompletionError> {
        self.complete(caller, CompletionRequest::module(course_id, module_id))
            .await
    }

    pub async fn complete_activity(
        &self,
        caller: Option<&CallerIdentity>,
        course_id: &str,
        module_id: &str,
        activity_id: &str,
    ) -> Result<Receipt, CompletionError> {
        self.complete(
            caller,
            CompletionRequest::activity(course_id, module_id, activity_id),
        )
        .await
    }

    #[instrument(
        skip_all,
        target = "completion",
        fields(kind = %request.kind, user_id = field::Empty, progress_key = field::Empty)
    )]
    pub async fn complete(
        &self,
        caller: Option<&CallerIdentity>,
        request: CompletionRequest,
    ) -> Result<Receipt, CompletionError> {
        let result = self.run(caller, request).await;
        self.count(&result);
        result
    }

    async fn run(
        &self,
        caller: Option<&CallerIdentity>,
        request: CompletionRequest,
    ) -> Result<Receipt, CompletionError> {
        let kind = request.kind;

        // Auth strictly before payload validation.
        let caller = authenticate(caller, kind)?;
        let target = validate(&request)?;

        let key = ProgressKey::new(caller.user_id(), target.target_id());
        annotate_span(caller.user_id(), &key);

        // Answer checking is deferred; the completion claim is trusted.
        debug!(
            answer_supplied = request.answer.is_some(),
            "completion request accepted"
        );

        let existing = warn_if_slow(
            "store_fetch_progress",
            self.slow_store,
            self.store.fetch_progress(&key),
        )
        .await
        .map_err(|e| internal(kind, e))?;

        if existing.is_some_and(|r| r.is_completed) {
            info!("target already completed");
            return Err(CompletionError::already_completed(kind));
        }

        let module = warn_if_slow(
            "store_fetch_module",
            self.slow_store,
            self.store.fetch_module(&target.module_id),
        )
        .await
        .map_err(|e| internal(kind, e))?
        .ok_or_else(|| {
            warn!(module_id = %target.module_id, "module missing from catalog");
            CompletionError::module_not_found()
        })?;

        let reward = resolve_reward(&module, &target).inspect_err(|_| {
            warn!(module_id = %target.module_id, "activity missing from catalog module");
        })?;

        let record = ProgressRecord {
            id: key,
            user_id: caller.user_id().to_string(),
            course_id: target.course_id,
            module_id: target.module_id,
            activity_id: target.activity_id,
            is_completed: true,
            points_earned: reward,
            completed_at_ms: now_ms().map_err(|e| internal(kind, e))?,
        };

        let outcome = warn_if_slow(
            "store_commit_completion",
            self.slow_store,
            self.store.commit_completion(&record),
        )
        .await
        .map_err(|e| internal(kind, e))?;

        match outcome {
            CommitOutcome::Committed => {
                info!(points_earned = reward, "completion committed");
                Ok(Receipt::new(kind, reward))
            }
            CommitOutcome::AlreadyCompleted => {
                warn!("concurrent completion won the race; nothing written");
                Err(CompletionError::already_completed(kind))
            }
        }
    }

    fn count(&self, result: &Result<Receipt, CompletionError>) {
        let c = &self.counters;
        match result {
            Ok(receipt) => {
                Counters::bump(&c.completed, 1);
                Counters::bump(&c.points_awarded, receipt.points_earned);
            }
            Err(CompletionError::AlreadyCompleted(_)) => Counters::bump(&c.already_completed, 1),
            Err(CompletionError::NotFound(_)) => Counters::bump(&c.not_found, 1),
            Err(CompletionError::Unauthenticated(_) | CompletionError::InvalidArgument(_)) => {
                Counters::bump(&c.rejected, 1)
            }
            Err(CompletionError::Internal(_)) => Counters::bump(&c.internal, 1),
        }
    }
}

fn authenticate(
    caller: Option<&CallerIdentity>,
    kind: CompletionKind,
) -> Result<&CallerIdentity, CompletionError> {
    caller
        .filter(|c| !c.user_id().is_empty())
        .ok_or_else(|| CompletionError::unauthenticated(kind))
}

fn validate(request: &CompletionRequest) -> Result<CompletionTarget, CompletionError> {
    let missing = || CompletionError::missing_ids(request.kind);
    let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

    let course_id = present(&request.course_id).ok_or_else(missing)?;
    let module_id = present(&request.module_id).ok_or_else(missing)?;
    let activity_id = match request.kind {
        CompletionKind::Module => None,
        CompletionKind::Activity => Some(present(&request.activity_id).ok_or_else(missing)?),
    };

    Ok(CompletionTarget {
        course_id,
        module_id,
        activity_id,
    })
}

/// Logs the full store error and hands the caller a generic one.
fn internal(kind: CompletionKind, err: anyhow::Error) -> CompletionError {
    error!(error = ?err, kind = %kind, "completion failed on store error");
    CompletionError::internal(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::model::{CatalogActivity, CatalogModule};
    use crate::progress::store_memory::InMemoryDocumentStore;
    use tracing_test::traced_test;

    fn caller(id: &str) -> CallerIdentity {
        CallerIdentity::new(id)
    }

    async fn seeded_store() -> Arc<InMemoryDocumentStore> {
        let store = Arc::new(InMemoryDocumentStore::new());
        store
            .put_module(&CatalogModule {
                id: "m1".into(),
                points_reward: Some(50),
                activities: vec![],
            })
            .await
            .unwrap();
        store
            .put_module(&CatalogModule {
                id: "m2".into(),
                points_reward: Some(30),
                activities: vec![
                    CatalogActivity {
                        id: "a1".into(),
                        points_reward: Some(10),
                    },
                    CatalogActivity {
                        id: "a3".into(),
                        points_reward: Some(5),
                    },
                ],
            })
            .await
            .unwrap();
        store
    }

    async fn points(store: &InMemoryDocumentStore, user: &str) -> Option<u64> {
        store.fetch_points(user).await.unwrap()
    }

    #[tokio::test]
    async fn module_completion_awards_catalog_points_once() {
        let store = seeded_store().await;
        let svc = CompletionService::new(store.clone());
        let u1 = caller("u1");

        let receipt = svc.complete_module(Some(&u1), "c1", "m1").await.unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.points_earned, 50);
        assert_eq!(receipt.message, "Module completed! You earned 50 points.");
        assert_eq!(points(&store, "u1").await, Some(50));

        let again = svc.complete_module(Some(&u1), "c1", "m1").await;
        assert_eq!(again, Err(CompletionError::already_completed(CompletionKind::Module)));
        assert_eq!(points(&store, "u1").await, Some(50));

        assert_eq!(Counters::get(&svc.counters().completed), 1);
        assert_eq!(Counters::get(&svc.counters().already_completed), 1);
        assert_eq!(Counters::get(&svc.counters().points_awarded), 50);
    }

    #[tokio::test]
    async fn stored_record_matches_receipt() {
        let store = seeded_store().await;
        let svc = CompletionService::new(store.clone());

        let before = now_ms().unwrap();
        svc.complete_activity(Some(&caller("u1")), "c1", "m2", "a1")
            .await
            .unwrap();
        let after = now_ms().unwrap();

        let rec = store.progress(&ProgressKey::new("u1", "a1")).unwrap();
        assert!(rec.is_completed);
        assert_eq!(rec.points_earned, 10);
        assert_eq!(rec.user_id, "u1");
        assert_eq!(rec.course_id, "c1");
        assert_eq!(rec.module_id, "m2");
        assert_eq!(rec.activity_id.as_deref(), Some("a1"));
        assert!((before..=after).contains(&rec.completed_at_ms));
    }

    #[tokio::test]
    async fn unauthenticated_wins_over_missing_fields() {
        let svc = CompletionService::new(seeded_store().await);

        let err = svc
            .complete(None, CompletionRequest::new(CompletionKind::Activity))
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::unauthenticated(CompletionKind::Activity));

        let blank = caller("");
        let err = svc.complete_module(Some(&blank), "", "").await.unwrap_err();
        assert_eq!(err.code(), "unauthenticated");
        assert_eq!(Counters::get(&svc.counters().rejected), 2);
    }

    #[tokio::test]
    async fn missing_identifiers_are_invalid() {
        let svc = CompletionService::new(seeded_store().await);
        let u1 = caller("u1");

        let err = svc.complete_module(Some(&u1), "c1", "").await.unwrap_err();
        assert_eq!(err, CompletionError::missing_ids(CompletionKind::Module));

        let mut req = CompletionRequest::module("c1", "m1");
        req.course_id = None;
        assert_eq!(
            svc.complete(Some(&u1), req).await.unwrap_err().code(),
            "invalid-argument"
        );

        let err = svc
            .complete_activity(Some(&u1), "c1", "m2", "")
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::missing_ids(CompletionKind::Activity));
    }

    #[tokio::test]
    async fn unknown_module_is_not_found() {
        let store = seeded_store().await;
        let svc = CompletionService::new(store.clone());

        let err = svc
            .complete_module(Some(&caller("u1")), "c1", "nope")
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::module_not_found());
        assert_eq!(store.progress_len(), 0);
    }

    #[tokio::test]
    async fn unknown_activity_is_not_found() {
        let store = seeded_store().await;
        let svc = CompletionService::new(store.clone());

        let err = svc
            .complete_activity(Some(&caller("u1")), "c1", "m2", "a2")
            .await
            .unwrap_err();
        assert_eq!(err, CompletionError::activity_not_found());
        assert_eq!(store.progress_len(), 0);
        assert_eq!(points(&store, "u1").await, None);
        assert_eq!(Counters::get(&svc.counters().not_found), 1);
    }

    #[tokio::test]
    async fn module_and_activities_are_tracked_separately() {
        let store = seeded_store().await;
        let svc = CompletionService::new(store.clone());
        let u1 = caller("u1");

        svc.complete_activity(Some(&u1), "c1", "m2", "a1").await.unwrap();
        svc.complete_activity(Some(&u1), "c1", "m2", "a3").await.unwrap();
        svc.complete_module(Some(&u1), "c1", "m2").await.unwrap();

        assert_eq!(points(&store, "u1").await, Some(45));
        assert_eq!(store.progress_len(), 3);

        // Another user is unaffected by u1's progress.
        svc.complete_module(Some(&caller("u2")), "c1", "m2").await.unwrap();
        assert_eq!(points(&store, "u2").await, Some(30));
    }

    #[tokio::test]
    async fn answer_is_carried_but_not_judged() {
        let store = seeded_store().await;
        let svc = CompletionService::new(store.clone());

        let mut req = CompletionRequest::activity("c1", "m2", "a1");
        req.answer = Some(serde_json::json!({"choice": "definitely wrong"}));

        let receipt = svc.complete(Some(&caller("u1")), req).await.unwrap();
        assert_eq!(receipt.points_earned, 10);
    }

    #[tokio::test]
    async fn incomplete_record_does_not_block_completion() {
        let store = seeded_store().await;
        store.put_progress(ProgressRecord {
            id: ProgressKey::new("u1", "m1"),
            user_id: "u1".into(),
            course_id: "c1".into(),
            module_id: "m1".into(),
            activity_id: None,
            is_completed: false,
            points_earned: 0,
            completed_at_ms: 0,
        });
        let svc = CompletionService::new(store.clone());

        let receipt = svc.complete_module(Some(&caller("u1")), "c1", "m1").await.unwrap();
        assert_eq!(receipt.points_earned, 50);
        assert_eq!(points(&store, "u1").await, Some(50));
    }

    #[tokio::test]
    #[traced_test]
    async fn store_failure_is_internal_and_logged() {
        let store = seeded_store().await;
        store.fail_reads(true);
        let svc = CompletionService::new(store.clone());

        let err = svc
            .complete_module(Some(&caller("u1")), "c1", "m1")
            .await
            .unwrap_err();

        assert_eq!(err, CompletionError::internal(CompletionKind::Module));
        assert_eq!(err.message(), "Failed to complete module.");
        assert!(logs_contain("document store unavailable"));
        assert_eq!(Counters::get(&svc.counters().internal), 1);
    }

    #[tokio::test]
    async fn failed_increment_records_no_completion() {
        let store = seeded_store().await;
        let svc = CompletionService::new(store.clone());
        let u1 = caller("u1");

        store.fail_increments(true);
        let err = svc.complete_module(Some(&u1), "c1", "m1").await.unwrap_err();
        assert_eq!(err.code(), "internal");
        assert!(store.progress(&ProgressKey::new("u1", "m1")).is_none());
        assert_eq!(points(&store, "u1").await, None);

        // Nothing half-written blocks the retry.
        store.fail_increments(false);
        let receipt = svc.complete_module(Some(&u1), "c1", "m1").await.unwrap();
        assert_eq!(receipt.points_earned, 50);
        assert_eq!(points(&store, "u1").await, Some(50));
    }

    /// Always reports no existing progress, as a reader racing a writer would.
    struct StaleReads(Arc<InMemoryDocumentStore>);

    #[async_trait::async_trait]
    impl DocumentStore for StaleReads {
        async fn fetch_progress(&self, _: &ProgressKey) -> anyhow::Result<Option<ProgressRecord>> {
            Ok(None)
        }
        async fn fetch_module(&self, id: &str) -> anyhow::Result<Option<CatalogModule>> {
            self.0.fetch_module(id).await
        }
        async fn commit_completion(&self, r: &ProgressRecord) -> anyhow::Result<CommitOutcome> {
            self.0.commit_completion(r).await
        }
        async fn fetch_points(&self, user_id: &str) -> anyhow::Result<Option<u64>> {
            self.0.fetch_points(user_id).await
        }
        async fn put_module(&self, m: &CatalogModule) -> anyhow::Result<()> {
            self.0.put_module(m).await
        }
    }

    #[tokio::test]
    async fn racing_completion_past_the_read_check_is_rejected_at_commit() {
        let inner = seeded_store().await;
        let svc = CompletionService::new(Arc::new(StaleReads(inner.clone())));
        let u1 = caller("u1");

        svc.complete_module(Some(&u1), "c1", "m1").await.unwrap();
        let err = svc.complete_module(Some(&u1), "c1", "m1").await.unwrap_err();

        assert_eq!(err.code(), "already-exists");
        assert_eq!(points(&inner, "u1").await, Some(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn simultaneous_first_completions_grant_once() {
        let store = seeded_store().await;
        let svc = Arc::new(CompletionService::new(store.clone()));

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let s = Arc::clone(&svc);
            set.spawn(async move {
                let u1 = caller("u1");
                s.complete_module(Some(&u1), "c1", "m1").await
            });
        }

        let mut ok = 0;
        let mut already = 0;
        while let Some(res) = set.join_next().await {
            match res.expect("task panicked") {
                Ok(_) => ok += 1,
                Err(CompletionError::AlreadyCompleted(_)) => already += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(already, 7);
        assert_eq!(points(&store, "u1").await, Some(50));
    }
}
