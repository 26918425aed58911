//! Orchestrator tests against in-memory providers.
//!
//! The fakes model the provider's eventual consistency: a delete call may
//! "succeed" while the resource keeps showing up in listings. The
//! recorded call order is what the assertions care about.

use crate::{
    aws::ecr::ImageId,
    config::TableSpec,
    retry::Backoff,
    teardown::{
        delete_with_dependents, drain_and_delete_repository, is_logging_function, table_plan,
        Dependents, ImageRepository, Outcome, ParentDeletion, TablePlan,
    },
};

#[derive(Clone, Debug, PartialEq)]
enum Event {
    List(usize),
    DeleteTarget(String),
    DeleteParent,
}

#[derive(Debug, Default)]
struct FakeGateway {
    targets: Vec<String>,
    /// Targets whose delete call "succeeds" but which never leave the
    /// listing.
    sticky: Vec<String>,
    /// Targets whose first delete call errors.
    flaky: Vec<String>,
    already_failed: Vec<String>,
    /// Report `DependentsRemain` on the first parent delete even though
    /// the listing is empty (the drain raced the control plane).
    stale_parent_once: bool,
    parent_deletes: u32,
    events: Vec<Event>,
}

impl FakeGateway {
    fn with_targets(targets: &[&str]) -> Self {
        FakeGateway {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }
}

impl Dependents for FakeGateway {
    fn label(&self) -> String {
        "gateway fake".to_owned()
    }

    async fn list(&mut self) -> anyhow::Result<Vec<String>> {
        self.events.push(Event::List(self.targets.len()));
        Ok(self.targets.clone())
    }

    async fn delete_one(&mut self, id: &str) -> anyhow::Result<()> {
        self.events.push(Event::DeleteTarget(id.to_owned()));
        if self.flaky.iter().any(|t| t.as_str() == id)
            && !self.already_failed.iter().any(|t| t.as_str() == id)
        {
            self.already_failed.push(id.to_owned());
            anyhow::bail!("transient error deleting {id}");
        }
        if !self.sticky.iter().any(|t| t.as_str() == id) {
            self.targets.retain(|t| t.as_str() != id);
        }
        Ok(())
    }

    async fn delete_parent(&mut self) -> anyhow::Result<ParentDeletion> {
        self.events.push(Event::DeleteParent);
        self.parent_deletes += 1;
        if self.stale_parent_once && self.parent_deletes == 1 {
            return Ok(ParentDeletion::DependentsRemain);
        }
        Ok(ParentDeletion::Deleted)
    }
}

/// Every parent delete must directly follow a listing that came back
/// empty.
fn parent_deletes_respect_drain(events: &[Event]) -> bool {
    let mut last_list = None;
    for event in events {
        match event {
            Event::List(count) => last_list = Some(*count),
            Event::DeleteParent => {
                if last_list != Some(0) {
                    return false;
                }
            }
            Event::DeleteTarget(_) => {}
        }
    }
    true
}

#[tokio::test]
async fn targets_are_confirmed_gone_before_the_gateway_delete() {
    let _ = env_logger::builder().try_init();
    let mut gateway = FakeGateway::with_targets(&["t1", "t2"]);
    let outcome = delete_with_dependents(&mut gateway, &Backoff::immediate(3)).await;
    assert_eq!(Outcome::Deleted, outcome);
    assert!(gateway.targets.is_empty(), "all targets removed");
    assert!(
        parent_deletes_respect_drain(&gateway.events),
        "parent delete issued while a listing was non-empty: {:#?}",
        gateway.events
    );
}

#[tokio::test]
async fn undrainable_targets_abandon_the_gateway_after_three_rounds() {
    let _ = env_logger::builder().try_init();
    let mut gateway = FakeGateway::with_targets(&["t1"]);
    gateway.sticky = vec!["t1".to_owned()];
    let outcome = delete_with_dependents(&mut gateway, &Backoff::immediate(3)).await;
    assert_eq!(Outcome::Abandoned, outcome);
    assert_eq!(0, gateway.parent_deletes, "the parent was never deleted");
    let delete_rounds = gateway
        .events
        .iter()
        .filter(|e| matches!(e, Event::DeleteTarget(_)))
        .count();
    assert_eq!(3, delete_rounds, "exactly the attempt ceiling");
}

#[tokio::test]
async fn a_transient_target_failure_does_not_abort_the_drain() {
    let _ = env_logger::builder().try_init();
    let mut gateway = FakeGateway::with_targets(&["t1", "t2"]);
    gateway.flaky = vec!["t1".to_owned()];
    let outcome = delete_with_dependents(&mut gateway, &Backoff::immediate(3)).await;
    assert_eq!(Outcome::Deleted, outcome);
    assert!(gateway.targets.is_empty());
    assert!(parent_deletes_respect_drain(&gateway.events));
}

#[tokio::test]
async fn a_stale_parent_error_gets_one_more_drain_cycle() {
    let _ = env_logger::builder().try_init();
    let mut gateway = FakeGateway::with_targets(&["t1"]);
    gateway.stale_parent_once = true;
    let outcome = delete_with_dependents(&mut gateway, &Backoff::immediate(3)).await;
    assert_eq!(Outcome::Deleted, outcome);
    assert_eq!(2, gateway.parent_deletes, "one retry after the stale error");
    assert!(parent_deletes_respect_drain(&gateway.events));
}

#[derive(Clone, Debug, PartialEq)]
enum RepoEvent {
    List(usize),
    DeleteBatch(usize),
    DeleteRepository,
}

#[derive(Debug, Default)]
struct FakeRepo {
    images: Vec<ImageId>,
    /// Batch deletes report success but remove nothing.
    broken_batches: bool,
    events: Vec<RepoEvent>,
}

fn make_images(count: usize) -> Vec<ImageId> {
    (0..count)
        .map(|i| ImageId {
            digest: Some(format!("sha256:{i:04}")),
            tag: None,
        })
        .collect()
}

impl ImageRepository for FakeRepo {
    fn label(&self) -> String {
        "repository fake".to_owned()
    }

    async fn list_page(&mut self) -> anyhow::Result<Vec<ImageId>> {
        self.events.push(RepoEvent::List(self.images.len()));
        Ok(self.images.clone())
    }

    async fn delete_batch(&mut self, batch: &[ImageId]) -> anyhow::Result<()> {
        self.events.push(RepoEvent::DeleteBatch(batch.len()));
        if !self.broken_batches {
            self.images.retain(|image| !batch.contains(image));
        }
        Ok(())
    }

    async fn delete_repository(&mut self) -> anyhow::Result<bool> {
        self.events.push(RepoEvent::DeleteRepository);
        Ok(true)
    }
}

#[tokio::test]
async fn all_images_are_removed_before_the_repository_delete() {
    let _ = env_logger::builder().try_init();
    let mut repo = FakeRepo {
        images: make_images(150),
        ..Default::default()
    };
    let outcome = drain_and_delete_repository(&mut repo, &Backoff::immediate(3)).await;
    assert_eq!(Outcome::Deleted, outcome);
    assert!(repo.images.is_empty());

    // The delete call comes after a listing that confirmed zero images.
    let mut last_list = None;
    for event in &repo.events {
        match event {
            RepoEvent::List(count) => last_list = Some(*count),
            RepoEvent::DeleteRepository => assert_eq!(
                Some(0),
                last_list,
                "repository deleted while images remained: {:#?}",
                repo.events
            ),
            RepoEvent::DeleteBatch(_) => {}
        }
    }
    // 150 images split into batches of at most 100.
    let batches: Vec<usize> = repo
        .events
        .iter()
        .filter_map(|e| match e {
            RepoEvent::DeleteBatch(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(vec![100, 50], batches);
}

#[tokio::test]
async fn a_stalled_image_drain_abandons_the_repository() {
    let _ = env_logger::builder().try_init();
    let mut repo = FakeRepo {
        images: make_images(3),
        broken_batches: true,
        ..Default::default()
    };
    let outcome = drain_and_delete_repository(&mut repo, &Backoff::immediate(3)).await;
    assert_eq!(Outcome::Abandoned, outcome);
    assert!(
        !repo.events.contains(&RepoEvent::DeleteRepository),
        "the repository delete must not be issued"
    );
}

fn specs() -> Vec<TableSpec> {
    vec![
        TableSpec::new("supplysense-orders", "orderId"),
        TableSpec::with_sort_key("supplysense-inventory", "productId", "locationId"),
    ]
}

#[test]
fn tables_are_never_deleted_without_force() {
    let specs = specs();
    let refs: Vec<&TableSpec> = specs.iter().collect();
    match table_plan(false, false, &refs) {
        TablePlan::WarnOnly(names) => {
            assert_eq!(
                vec!["supplysense-orders".to_owned(), "supplysense-inventory".to_owned()],
                names,
                "the warning lists every table that would be deleted"
            );
        }
        other => panic!("expected WarnOnly, got {other:?}"),
    }
    // skip-tables wins regardless of force.
    assert_eq!(TablePlan::Skipped, table_plan(false, true, &refs));
    assert_eq!(TablePlan::Skipped, table_plan(true, true, &refs));
}

#[test]
fn tables_are_deleted_only_with_force() {
    let specs = specs();
    let refs: Vec<&TableSpec> = specs.iter().collect();
    match table_plan(true, false, &refs) {
        TablePlan::Delete(names) => assert_eq!(2, names.len()),
        other => panic!("expected Delete, got {other:?}"),
    }
}

#[test]
fn logging_functions_match_by_failed_id_or_marker() {
    let failed = vec!["ActionTopicLoggingA1B2".to_owned()];
    let markers = vec!["SNSLogging".to_owned()];
    assert!(is_logging_function(
        "SupplySenseChatStack-ActionTopicLoggingA1B2-XYZ",
        &failed,
        &markers
    ));
    assert!(is_logging_function(
        "SupplySenseChatStack-SNSLoggingHandler",
        &failed,
        &markers
    ));
    assert!(!is_logging_function(
        "SupplySenseChatStack-ChatService",
        &failed,
        &markers
    ));
}
