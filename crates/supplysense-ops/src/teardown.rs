//! The teardown orchestrator.
//!
//! Removes everything CloudFormation cannot delete on its own, then hands
//! the stacks to the CDK CLI, then (behind an explicit `--force` gate)
//! drops the DynamoDB tables. The run is best-effort: each step is
//! wrapped so a failure is reported and the next resource is attempted;
//! nothing rolls back.
//!
//! Resource classes with dependents (gateways with targets, repositories
//! with images, topics with subscriptions) share one rule: the parent
//! delete call is only issued after a *fresh listing* confirms the
//! dependents are gone. A delete call's reported success is not trusted
//! for this; the control plane is eventually consistent.

use std::{future::Future, time::Duration};

use aws_config::SdkConfig;

use crate::{
    aws::{self, agentcore, cloudformation, dynamodb, ecr, lambda, sns, ssm},
    config::{Profile, TableSpec},
    console, process,
    retry::Backoff,
};

/// Drain rounds for gateway targets before the gateway is abandoned.
const TARGETS: Backoff = Backoff::new(3, Duration::from_secs(2), Duration::from_secs(8));
/// Pause between image-drain rounds.
const IMAGES: Backoff = Backoff::new(3, Duration::from_secs(2), Duration::from_secs(4));
/// Drain rounds for topic subscriptions.
const SUBSCRIPTIONS: Backoff = Backoff::new(3, Duration::from_secs(2), Duration::from_secs(8));
/// Pauses while CloudFormation works through a recovered deletion.
const STACKS: Backoff = Backoff::new(2, Duration::from_secs(15), Duration::from_secs(30));
/// Settling time after deleting the logging Lambda functions.
const LAMBDA_PROPAGATION: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct TeardownOpts {
    /// Enables destructive deletes. Without it the run only reports what
    /// it would remove.
    pub force: bool,
    /// Leaves the DynamoDB tables (and their data) in place.
    pub skip_tables: bool,
}

/// What happened to one resource.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Deleted,
    /// The resource was already gone; success-equivalent.
    Missing,
    /// Dependents could not be drained, so the parent was never deleted.
    Abandoned,
    Failed(String),
}

/// A resource whose deletion is blocked until its dependents are removed.
///
/// Implementations bind a concrete parent (a gateway, a topic) to the
/// provider calls for its dependent class. The generic driver only ever
/// sees ids.
pub trait Dependents {
    /// Human-readable label for log lines.
    fn label(&self) -> String;

    /// A fresh listing of dependent ids from the provider.
    fn list(&mut self) -> impl Future<Output = anyhow::Result<Vec<String>>>;

    fn delete_one(&mut self, id: &str) -> impl Future<Output = anyhow::Result<()>>;

    fn delete_parent(&mut self) -> impl Future<Output = anyhow::Result<ParentDeletion>>;
}

/// What a parent delete call reported.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParentDeletion {
    Deleted,
    /// The provider's "still has dependents" error signature.
    DependentsRemain,
    Missing,
}

/// A container repository whose images are removed in batches before the
/// repository itself is deleted.
pub trait ImageRepository {
    fn label(&self) -> String;

    /// One page of image identifiers currently in the repository.
    fn list_page(&mut self) -> impl Future<Output = anyhow::Result<Vec<ecr::ImageId>>>;

    fn delete_batch(&mut self, batch: &[ecr::ImageId]) -> impl Future<Output = anyhow::Result<()>>;

    /// Deletes the repository; `false` means it was already gone.
    fn delete_repository(&mut self) -> impl Future<Output = anyhow::Result<bool>>;
}

/// Deletes dependents until a re-listing comes back empty, or the attempt
/// ceiling is reached. Per-item failures are logged and do not abort the
/// round. Returns whether the dependents are confirmed gone.
async fn drain<D: Dependents>(class: &mut D, backoff: &Backoff) -> bool {
    let label = class.label();
    let mut attempt = 0;
    loop {
        let dependents = match class.list().await {
            Ok(dependents) => dependents,
            Err(err) => {
                // Can't list them: assume the service already dropped them.
                log::warn!("could not list dependents of {label}: {err:#}");
                return true;
            }
        };
        if dependents.is_empty() {
            return true;
        }
        if attempt >= backoff.attempts {
            console::detail(format!(
                "{} dependent(s) of {label} still remain",
                dependents.len()
            ));
            return false;
        }
        log::info!(
            "deleting {} dependent(s) of {label} (round {})",
            dependents.len(),
            attempt + 1
        );
        for dependent in &dependents {
            if let Err(err) = class.delete_one(dependent).await {
                console::warning(format!("  could not delete {dependent}: {err:#}"));
            }
        }
        backoff.pause(attempt).await;
        attempt += 1;
    }
}

/// Drains a parent's dependents, then deletes the parent. If the parent
/// delete still reports dependents (the drain and the delete raced the
/// control plane), one longer pause and one more drain-and-delete cycle
/// run before giving up.
pub async fn delete_with_dependents<D: Dependents>(class: &mut D, backoff: &Backoff) -> Outcome {
    if !drain(class, backoff).await {
        console::warning(format!(
            "could not delete all dependents of {} after {} attempts",
            class.label(),
            backoff.attempts
        ));
        return Outcome::Abandoned;
    }
    match class.delete_parent().await {
        Ok(ParentDeletion::Deleted) => Outcome::Deleted,
        Ok(ParentDeletion::Missing) => Outcome::Missing,
        Ok(ParentDeletion::DependentsRemain) => {
            console::warning(format!(
                "{} still reports dependents, retrying the drain",
                class.label()
            ));
            backoff.pause(backoff.attempts).await;
            if !drain(class, backoff).await {
                return Outcome::Abandoned;
            }
            match class.delete_parent().await {
                Ok(ParentDeletion::Deleted) => Outcome::Deleted,
                Ok(ParentDeletion::Missing) => Outcome::Missing,
                Ok(ParentDeletion::DependentsRemain) => {
                    Outcome::Failed("dependents remain after retry".to_owned())
                }
                Err(err) => Outcome::Failed(format!("{err:#}")),
            }
        }
        Err(err) => Outcome::Failed(format!("{err:#}")),
    }
}

/// Batched drain for repositories: list a page, delete it in batches,
/// pause, re-list; loop until a listing comes back empty or a round makes
/// no forward progress. Only then is the repository delete issued.
pub async fn drain_and_delete_repository<R: ImageRepository>(
    repo: &mut R,
    backoff: &Backoff,
) -> Outcome {
    let label = repo.label();
    let mut deleted = 0usize;
    let mut last_remaining = usize::MAX;
    loop {
        let images = match repo.list_page().await {
            Ok(images) => images,
            Err(err) => {
                log::warn!("could not list images for {label}: {err:#}");
                break;
            }
        };
        if images.is_empty() {
            break;
        }
        if images.len() >= last_remaining {
            console::warning(format!("image drain for {label} is not making progress"));
            return Outcome::Abandoned;
        }
        last_remaining = images.len();
        console::detail(format!("deleting {} image(s) from {label}", images.len()));
        for batch in images.chunks(ecr::IMAGE_BATCH) {
            if let Err(err) = repo.delete_batch(batch).await {
                console::warning(format!("  could not delete an image batch: {err:#}"));
            }
        }
        deleted += images.len();
        backoff.pause(0).await;
    }
    if deleted > 0 {
        console::detail(format!("deleted {deleted} image(s) total"));
    }
    match repo.delete_repository().await {
        Ok(true) => Outcome::Deleted,
        Ok(false) => Outcome::Missing,
        Err(err) => Outcome::Failed(format!("{err:#}")),
    }
}

/// The table stage's disposition, decided before any call is made.
#[derive(Clone, Debug, PartialEq)]
pub enum TablePlan {
    /// `--skip-tables`: leave them alone silently-ish.
    Skipped,
    /// No `--force`: print what would be deleted, touch nothing.
    WarnOnly(Vec<String>),
    Delete(Vec<String>),
}

/// Decides the table stage. Deletion requires `force` no matter what the
/// other flags say.
pub fn table_plan(force: bool, skip_tables: bool, tables: &[&TableSpec]) -> TablePlan {
    if skip_tables {
        return TablePlan::Skipped;
    }
    let names: Vec<String> = tables.iter().map(|spec| spec.name.clone()).collect();
    if force {
        TablePlan::Delete(names)
    } else {
        TablePlan::WarnOnly(names)
    }
}

/// Matches the Lambda functions left behind by the buggy logging custom
/// resources: anything named after a failed logical id or one of the
/// configured marker fragments.
pub fn is_logging_function(name: &str, failed_ids: &[String], markers: &[String]) -> bool {
    failed_ids.iter().any(|id| name.contains(id.as_str()))
        || markers.iter().any(|marker| name.contains(marker.as_str()))
}

#[derive(Debug, Default)]
pub struct TeardownReport {
    pub deleted: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl TeardownReport {
    fn record(&mut self, label: String, outcome: Outcome) {
        match outcome {
            Outcome::Deleted => {
                console::success(format!("deleted {label}"));
                self.deleted.push(label);
            }
            Outcome::Missing => {
                console::info(format!("{label} was already gone"));
                self.missing.push(label);
            }
            Outcome::Abandoned => {
                console::error(format!("abandoned {label}: dependents could not be deleted"));
                self.failed
                    .push((label, "dependents could not be deleted".to_owned()));
            }
            Outcome::Failed(reason) => {
                console::error(format!("failed to delete {label}: {reason}"));
                self.failed.push((label, reason));
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summarize(&self) {
        console::info(format!(
            "{} deleted, {} already gone, {} failed",
            self.deleted.len(),
            self.missing.len(),
            self.failed.len()
        ));
        for (label, reason) in &self.failed {
            console::detail(format!("failed: {label} ({reason})"));
        }
    }
}

// ---------------------------------------------------------------------------
// Provider-backed resource classes
// ---------------------------------------------------------------------------

struct GatewayDependents<'a> {
    cfg: &'a SdkConfig,
    gateway: agentcore::Gateway,
}

impl Dependents for GatewayDependents<'_> {
    fn label(&self) -> String {
        format!("gateway {} ({})", self.gateway.name, self.gateway.id)
    }

    async fn list(&mut self) -> anyhow::Result<Vec<String>> {
        agentcore::list_gateway_targets(self.cfg, &self.gateway.id).await
    }

    async fn delete_one(&mut self, id: &str) -> anyhow::Result<()> {
        agentcore::delete_gateway_target(self.cfg, &self.gateway.id, id).await
    }

    async fn delete_parent(&mut self) -> anyhow::Result<ParentDeletion> {
        Ok(
            match agentcore::delete_gateway(self.cfg, &self.gateway.id).await? {
                agentcore::GatewayDeletion::Deleted => ParentDeletion::Deleted,
                agentcore::GatewayDeletion::TargetsRemain => ParentDeletion::DependentsRemain,
                agentcore::GatewayDeletion::Missing => ParentDeletion::Missing,
            },
        )
    }
}

struct TopicDependents<'a> {
    cfg: &'a SdkConfig,
    arn: String,
}

impl Dependents for TopicDependents<'_> {
    fn label(&self) -> String {
        format!("topic {}", self.arn)
    }

    async fn list(&mut self) -> anyhow::Result<Vec<String>> {
        sns::list_subscriptions(self.cfg, &self.arn).await
    }

    async fn delete_one(&mut self, id: &str) -> anyhow::Result<()> {
        sns::unsubscribe(self.cfg, id).await
    }

    async fn delete_parent(&mut self) -> anyhow::Result<ParentDeletion> {
        Ok(if sns::delete_topic(self.cfg, &self.arn).await? {
            ParentDeletion::Deleted
        } else {
            ParentDeletion::Missing
        })
    }
}

struct EcrRepository<'a> {
    cfg: &'a SdkConfig,
    name: String,
}

impl ImageRepository for EcrRepository<'_> {
    fn label(&self) -> String {
        format!("repository {}", self.name)
    }

    async fn list_page(&mut self) -> anyhow::Result<Vec<ecr::ImageId>> {
        ecr::list_images(self.cfg, &self.name).await
    }

    async fn delete_batch(&mut self, batch: &[ecr::ImageId]) -> anyhow::Result<()> {
        ecr::batch_delete_images(self.cfg, &self.name, batch).await
    }

    async fn delete_repository(&mut self) -> anyhow::Result<bool> {
        ecr::delete_repository(self.cfg, &self.name, true).await
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

async fn delete_gateways(cfg: &SdkConfig, profile: &Profile, report: &mut TeardownReport) {
    console::header("Deleting AgentCore gateways");
    let gateways = match agentcore::list_gateways(cfg).await {
        Ok(gateways) => gateways,
        Err(err) => {
            console::warning(format!("could not list gateways: {err:#}"));
            console::warning("this may be normal if AgentCore is not available in this region");
            return;
        }
    };
    for gateway in gateways {
        if !gateway.name.contains(&profile.resource_marker) {
            continue;
        }
        console::info(format!(
            "deleting gateway {} ({})",
            gateway.name, gateway.id
        ));
        let mut class = GatewayDependents { cfg, gateway };
        let label = class.label();
        let outcome = delete_with_dependents(&mut class, &TARGETS).await;
        report.record(label, outcome);
    }
}

async fn delete_runtimes(cfg: &SdkConfig, profile: &Profile, report: &mut TeardownReport) {
    console::header("Deleting AgentCore runtimes");
    let runtimes = match agentcore::list_runtimes(cfg).await {
        Ok(runtimes) => runtimes,
        Err(err) => {
            console::warning(format!("could not list agent runtimes: {err:#}"));
            console::warning("this may be normal if AgentCore is not available in this region");
            return;
        }
    };
    for runtime in runtimes {
        if !runtime.name.contains(&profile.resource_marker) {
            continue;
        }
        console::info(format!(
            "deleting runtime {} ({})",
            runtime.name, runtime.id
        ));
        let label = format!("runtime {}", runtime.name);
        let outcome = match agentcore::delete_runtime(cfg, &runtime.id).await {
            Ok(true) => Outcome::Deleted,
            Ok(false) => Outcome::Missing,
            Err(err) => Outcome::Failed(format!("{err:#}")),
        };
        report.record(label, outcome);
    }
}

async fn delete_repositories(cfg: &SdkConfig, profile: &Profile, report: &mut TeardownReport) {
    console::header("Deleting ECR repositories");
    let names = match ecr::list_repositories(cfg).await {
        Ok(names) => names,
        Err(err) => {
            console::error(format!("could not list repositories: {err:#}"));
            return;
        }
    };
    for name in names {
        if !Profile::matches_any(&name, &profile.repository_prefixes) {
            continue;
        }
        console::info(format!("deleting repository {name}"));
        let mut repo = EcrRepository { cfg, name };
        let label = repo.label();
        let outcome = drain_and_delete_repository(&mut repo, &IMAGES).await;
        report.record(label, outcome);
    }
}

async fn delete_topics(cfg: &SdkConfig, profile: &Profile, report: &mut TeardownReport) {
    console::header("Deleting SNS topics");
    let arns = match sns::list_topics(cfg).await {
        Ok(arns) => arns,
        Err(err) => {
            console::error(format!("could not list topics: {err:#}"));
            return;
        }
    };
    for arn in arns {
        if !Profile::matches_any(&arn, &profile.topic_prefixes) {
            continue;
        }
        console::info(format!("deleting topic {arn}"));
        let mut class = TopicDependents { cfg, arn };
        let label = class.label();
        let outcome = delete_with_dependents(&mut class, &SUBSCRIPTIONS).await;
        report.record(label, outcome);
    }
}

async fn delete_parameters(cfg: &SdkConfig, profile: &Profile, report: &mut TeardownReport) {
    console::header("Deleting SSM parameters");
    let names = match ssm::parameters_by_path(cfg, &profile.parameter_path).await {
        Ok(names) => names,
        Err(err) => {
            console::warning(format!("could not list parameters: {err:#}"));
            return;
        }
    };
    if names.is_empty() {
        console::info(format!("no parameters under {}", profile.parameter_path));
        return;
    }
    for name in names {
        let label = format!("parameter {name}");
        let outcome = match ssm::delete_parameter(cfg, &name).await {
            Ok(true) => Outcome::Deleted,
            Ok(false) => Outcome::Missing,
            Err(err) => Outcome::Failed(format!("{err:#}")),
        };
        report.record(label, outcome);
    }
}

/// Deletes the stacks through the CDK CLI, recovering any that land in
/// `DELETE_FAILED` on the known-buggy custom resources.
async fn delete_stacks(cfg: &SdkConfig, profile: &Profile, report: &mut TeardownReport) {
    console::header("Deleting CDK stacks");
    for stack in &profile.stacks {
        console::info(format!("destroying stack {stack}"));
        match process::run(
            "npx",
            &["cdk", "destroy", stack.as_str(), "--force"],
            &profile.project_dir,
        )
        .await
        {
            Ok(()) => {
                console::success(format!("stack {stack} deleted"));
                report.deleted.push(format!("stack {stack}"));
            }
            Err(err) => {
                console::warning(format!("could not destroy {stack}: {err:#}"));
                if stack == &profile.broken_stack {
                    recover_failed_stack(cfg, profile, stack, report).await;
                } else {
                    report.failed.push((format!("stack {stack}"), format!("{err:#}")));
                }
            }
        }
    }
    // Anything still sitting in DELETE_FAILED gets the recovery treatment.
    for stack in &profile.stacks {
        match cloudformation::stack_status(cfg, stack).await {
            Ok(Some(status)) if status == "DELETE_FAILED" => {
                console::warning(format!("stack {stack} is in DELETE_FAILED state"));
                recover_failed_stack(cfg, profile, stack, report).await;
            }
            Ok(_) => {}
            Err(err) => log::warn!("could not check status of {stack}: {err:#}"),
        }
    }
}

/// Recovery for a stack that refuses to delete: purge the orphaned
/// repository, find the custom resources whose deletion failed, remove
/// the Lambda functions backing them, then delete the stack with those
/// logical ids retained so the rest can finish.
async fn recover_failed_stack(
    cfg: &SdkConfig,
    profile: &Profile,
    stack: &str,
    report: &mut TeardownReport,
) {
    if let Some(repo) = &profile.orphaned_repository {
        console::info(format!("purging orphaned repository {repo}"));
        let mut repository = EcrRepository {
            cfg,
            name: repo.clone(),
        };
        let outcome = drain_and_delete_repository(&mut repository, &IMAGES).await;
        log::debug!("orphaned repository purge finished: {outcome:?}");
    }

    let events = match cloudformation::recent_events(cfg, stack).await {
        Ok(events) => events,
        Err(err) => {
            console::warning(format!("could not read events for {stack}: {err:#}"));
            Vec::new()
        }
    };
    let failed = cloudformation::failed_custom_resources(&events);

    if failed.is_empty() {
        console::info("no failed custom resources found, retrying a plain delete");
        if let Err(err) = cloudformation::delete_stack(cfg, stack).await {
            console::warning(format!("delete-stack failed for {stack}: {err:#}"));
            report
                .failed
                .push((format!("stack {stack}"), format!("{err:#}")));
            return;
        }
        console::info("waiting for stack deletion");
        STACKS.pause(1).await;
        return;
    }

    console::info(format!(
        "found {} failed custom resource(s): {}",
        failed.len(),
        failed.join(", ")
    ));

    // The logging custom resources leave their Lambda functions behind;
    // CloudFormation cannot delete the resource while they exist.
    match lambda::list_function_names(cfg).await {
        Ok(functions) => {
            let mut removed = false;
            for name in functions {
                if is_logging_function(&name, &failed, &profile.logging_function_markers) {
                    console::info(format!("  deleting function {name}"));
                    match lambda::delete_function(cfg, &name).await {
                        Ok(true) => removed = true,
                        Ok(false) => {}
                        Err(err) => {
                            console::warning(format!("  could not delete {name}: {err:#}"))
                        }
                    }
                }
            }
            if removed {
                console::info("waiting for function deletion to propagate");
                tokio::time::sleep(LAMBDA_PROPAGATION).await;
            }
        }
        Err(err) => console::warning(format!("could not list functions: {err:#}")),
    }

    console::info(format!(
        "retaining {} resource(s) and deleting the rest of {stack}",
        failed.len()
    ));
    if let Err(err) = cloudformation::delete_stack_retaining(cfg, stack, &failed).await {
        log::warn!("retained delete rejected ({err:#}), retrying a plain delete");
        if let Err(err) = cloudformation::delete_stack(cfg, stack).await {
            console::warning(format!("delete-stack failed for {stack}: {err:#}"));
            report
                .failed
                .push((format!("stack {stack}"), format!("{err:#}")));
            return;
        }
    }
    console::info("waiting for stack deletion");
    STACKS.pause(1).await;
}

async fn delete_tables(
    cfg: &SdkConfig,
    profile: &Profile,
    opts: &TeardownOpts,
    report: &mut TeardownReport,
) {
    match table_plan(opts.force, opts.skip_tables, &profile.tables.all()) {
        TablePlan::Skipped => {
            console::warning("skipping DynamoDB table deletion (--skip-tables)");
        }
        TablePlan::WarnOnly(names) => {
            console::header("Deleting DynamoDB tables");
            console::warning("this would delete all SupplySense tables and their data:");
            for name in &names {
                console::detail(format!("- {name}"));
            }
            console::warning("re-run with --force to proceed");
        }
        TablePlan::Delete(names) => {
            console::header("Deleting DynamoDB tables");
            for name in names {
                let label = format!("table {name}");
                let outcome = match dynamodb::delete_table(cfg, &name).await {
                    Ok(true) => Outcome::Deleted,
                    Ok(false) => Outcome::Missing,
                    Err(err) => Outcome::Failed(format!("{err:#}")),
                };
                report.record(label, outcome);
            }
        }
    }
}

/// Runs the whole teardown sequence. Individual failures end up in the
/// report, not in the `Err` channel; completing with failures is still
/// exit-code 0 territory.
pub async fn run(
    cfg: &SdkConfig,
    profile: &Profile,
    opts: &TeardownOpts,
) -> crate::Result<TeardownReport> {
    console::header("SupplySense cleanup");
    console::info(format!("region: {}", aws::region(cfg)));
    console::info(format!("force: {}", if opts.force { "yes" } else { "no" }));
    console::info(format!(
        "skip tables: {}",
        if opts.skip_tables { "yes" } else { "no" }
    ));

    if !opts.force {
        console::warning("this will delete every SupplySense resource:");
        for stack in &profile.stacks {
            console::detail(format!("stack     {stack}"));
        }
        for prefix in &profile.repository_prefixes {
            console::detail(format!("registry  {prefix}*"));
        }
        for prefix in &profile.topic_prefixes {
            console::detail(format!("topic     {prefix}*"));
        }
        console::detail(format!("params    {}/**", profile.parameter_path));
        if !opts.skip_tables {
            console::warning("tables that would be deleted:");
            for table in profile.tables.all() {
                console::detail(format!("- {}", table.name));
            }
        }
        console::warning("re-run with --force to proceed");
        return Ok(TeardownReport::default());
    }

    let mut report = TeardownReport::default();

    // Gateways go first: their targets block everything downstream of the
    // agent stack. Then runtimes, then the resources CloudFormation
    // cannot empty on its own, then the stacks themselves.
    delete_gateways(cfg, profile, &mut report).await;
    delete_runtimes(cfg, profile, &mut report).await;
    delete_repositories(cfg, profile, &mut report).await;
    delete_topics(cfg, profile, &mut report).await;
    delete_parameters(cfg, profile, &mut report).await;
    delete_stacks(cfg, profile, &mut report).await;
    delete_tables(cfg, profile, opts, &mut report).await;

    console::header("Cleanup complete");
    report.summarize();
    console::info("some resources may take a few minutes to finish deleting");
    Ok(report)
}
