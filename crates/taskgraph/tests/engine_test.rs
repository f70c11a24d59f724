//! Convergence tests: scheduling, delta handling, targets and context states

mod common;

use common::{FakeCloud, Widget};
use serde_json::json;
use std::sync::Arc;
use taskgraph::{
    Action, ConfigError, Context, ContextState, EngineError, Lifecycle, RunOptions, Target, TargetKind,
    TaskError, TaskOutcome,
};

fn context(target: TargetKind, cloud: &Arc<FakeCloud>, widgets: Vec<Widget>) -> Context<FakeCloud> {
    Context::new(
        Target::new(target),
        Arc::clone(cloud),
        widgets.into_iter().map(Widget::task).collect(),
    )
}

fn action(outcome: Option<&TaskOutcome>) -> Action {
    outcome.and_then(TaskOutcome::applied).map(|a| a.action).unwrap()
}

#[tokio::test]
async fn test_dependencies_complete_before_dependents_start() {
    let cloud = FakeCloud::new();
    let widgets = vec![
        Widget::new("vpc").delayed(20),
        Widget::new("subnet-a").parent("vpc").delayed(5),
        Widget::new("subnet-b").parent("vpc"),
        Widget::new("route").parent("subnet-a").color("blue"),
        Widget::new("other").delayed(10),
    ];
    let mut ctx = context(TargetKind::Direct, &cloud, widgets);

    let report = ctx.run(RunOptions::default()).await.unwrap();
    assert!(report.is_converged());
    assert_eq!(ctx.state(), ContextState::Converged);

    for (dependency, dependent) in [("vpc", "subnet-a"), ("vpc", "subnet-b"), ("subnet-a", "route")] {
        assert!(
            cloud.position(&format!("render:{}", dependency)) < cloud.position(&format!("find:{}", dependent)),
            "{} started before {} completed: {:?}",
            dependent,
            dependency,
            cloud.events()
        );
    }

    // Dependents were created against the resolved parent id
    let vpc_id = report.resolved["vpc"].id.clone().unwrap();
    assert_eq!(cloud.by_name("subnet-a").unwrap().parent, Some(vpc_id));
    assert_eq!(action(report.outcome("route")), Action::Created);
    assert_eq!(report.changed().len(), 5);
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let cloud = FakeCloud::new();
    let widgets = || vec![Widget::new("vpc").color("red"), Widget::new("subnet").parent("vpc")];

    context(TargetKind::Direct, &cloud, widgets())
        .run(RunOptions::default())
        .await
        .unwrap();
    let renders_after_first = cloud.renders().len();
    assert_eq!(cloud.count(), 2);

    let report = context(TargetKind::Direct, &cloud, widgets())
        .run(RunOptions::default())
        .await
        .unwrap();

    assert_eq!(cloud.renders().len(), renders_after_first);
    assert_eq!(cloud.count(), 2);
    assert!(report.changed().is_empty());
    for name in ["vpc", "subnet"] {
        let applied = report.outcome(name).and_then(TaskOutcome::applied).unwrap();
        assert_eq!(applied.action, Action::Unchanged);
        assert_eq!(applied.changes, None);
    }
    assert_eq!(report.resolved["subnet"].id, cloud.by_name("subnet").map(|w| w.id));
}

#[tokio::test]
async fn test_immutable_field_change_is_rejected_without_rendering() {
    let cloud = FakeCloud::new();
    cloud.insert("vpc", "small", None);

    let mut ctx = context(
        TargetKind::Direct,
        &cloud,
        vec![Widget::new("vpc").size("large"), Widget::new("subnet").parent("vpc")],
    );
    let err = ctx.run(RunOptions::default()).await.unwrap_err();

    let failure = err.run_failure().unwrap();
    assert_eq!(failure.failures.len(), 1);
    assert_eq!(failure.failures[0].task, "vpc");
    assert_eq!(failure.failures[0].kind, "Widget");
    assert_eq!(
        failure.failures[0].error,
        TaskError::ImmutableField {
            field: "size".to_string()
        }
    );
    assert_eq!(failure.skipped, vec!["subnet".to_string()]);
    assert!(cloud.renders().is_empty());
    assert_eq!(cloud.by_name("vpc").unwrap().size, "small");
    assert_eq!(ctx.state(), ContextState::Failed);
}

#[tokio::test]
async fn test_failure_skips_dependents_and_independent_branches_converge() {
    let cloud = FakeCloud::new();
    let widgets = vec![
        Widget::new("broken").failing(),
        Widget::new("child").parent("broken"),
        Widget::new("grandchild").parent("child"),
        Widget::new("healthy").delayed(10),
        Widget::new("healthy-child").parent("healthy"),
    ];
    let mut ctx = context(TargetKind::Direct, &cloud, widgets);

    let err = ctx.run(RunOptions::default()).await.unwrap_err();
    let EngineError::Failed(failure) = &err else {
        panic!("expected run failure, got {:?}", err);
    };

    assert_eq!(failure.failures.len(), 1);
    assert_eq!(failure.failures[0].task, "broken");
    assert!(matches!(failure.failures[0].error, TaskError::Lookup(_)));
    assert_eq!(failure.skipped, vec!["child".to_string(), "grandchild".to_string()]);

    let report = &failure.report;
    assert_eq!(
        report.outcome("grandchild"),
        Some(&TaskOutcome::Skipped {
            blocked_by: "broken".to_string()
        })
    );
    assert_eq!(action(report.outcome("healthy")), Action::Created);
    assert_eq!(action(report.outcome("healthy-child")), Action::Created);
    assert!(report.resolved.contains_key("healthy-child"));
    assert!(!report.resolved.contains_key("child"));

    // Skipped tasks never started
    assert!(!cloud.events().iter().any(|e| e.ends_with(":child")));
    assert!(err.to_string().contains("broken (Widget)"));
}

#[tokio::test]
async fn test_panicking_task_is_reported_as_failure() {
    let cloud = FakeCloud::new();
    let mut ctx = context(
        TargetKind::Direct,
        &cloud,
        vec![Widget::new("bomb").panicking(), Widget::new("fine")],
    );

    let err = ctx.run(RunOptions::default()).await.unwrap_err();
    let failure = err.run_failure().unwrap();
    assert_eq!(failure.failures.len(), 1);
    assert_eq!(
        failure.failures[0].error,
        TaskError::Panicked("widget bomb exploded".to_string())
    );
    assert_eq!(action(failure.report.outcome("fine")), Action::Created);
}

#[tokio::test]
async fn test_max_workers_bounds_concurrency() {
    let cloud = FakeCloud::new();
    let widgets: Vec<Widget> = (0..4).map(|i| Widget::new(&format!("w{}", i)).delayed(20)).collect();
    context(TargetKind::Direct, &cloud, widgets)
        .run(RunOptions::with_max_workers(1))
        .await
        .unwrap();
    assert_eq!(cloud.peak_concurrency(), 1);

    let cloud = FakeCloud::new();
    let widgets: Vec<Widget> = (0..4).map(|i| Widget::new(&format!("w{}", i)).delayed(20)).collect();
    context(TargetKind::Direct, &cloud, widgets)
        .run(RunOptions::with_max_workers(4))
        .await
        .unwrap();
    assert!(cloud.peak_concurrency() > 1);

    assert_eq!(RunOptions::with_max_workers(0).max_workers, 1);
    assert_eq!(RunOptions::default().max_workers, 8);
}

#[tokio::test]
async fn test_context_state_machine() {
    let cloud = FakeCloud::new();
    let mut ctx = context(TargetKind::Direct, &cloud, vec![Widget::new("a")]);
    assert_eq!(ctx.state(), ContextState::Built);
    ctx.add_task(Widget::new("b")).unwrap();

    assert_eq!(ctx.plan().unwrap().len(), 2);
    assert_eq!(ctx.state(), ContextState::Planned);
    assert!(matches!(
        ctx.add_task(Widget::new("c")),
        Err(EngineError::InvalidState {
            state: ContextState::Planned,
            ..
        })
    ));
    assert!(matches!(ctx.plan(), Err(EngineError::InvalidState { .. })));

    ctx.run(RunOptions::default()).await.unwrap();
    assert_eq!(ctx.state(), ContextState::Converged);

    let err = ctx.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            state: ContextState::Converged,
            operation: "run"
        }
    ));
}

#[tokio::test]
async fn test_configuration_error_fails_the_context() {
    let cloud = FakeCloud::new();
    let mut ctx = context(
        TargetKind::Direct,
        &cloud,
        vec![Widget::new("a").parent("b"), Widget::new("b").parent("a")],
    );

    let err = ctx.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Config(ConfigError::Cycle { ref path }) if path == "a -> b -> a"
    ));
    assert_eq!(ctx.state(), ContextState::Failed);
    assert!(cloud.events().is_empty());
    assert!(matches!(
        ctx.run(RunOptions::default()).await,
        Err(EngineError::InvalidState {
            state: ContextState::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_exists_and_validates_lifecycle() {
    let cloud = FakeCloud::new();
    let mut ctx = context(
        TargetKind::Direct,
        &cloud,
        vec![Widget::new("missing").with_lifecycle(Lifecycle::ExistsAndValidates)],
    );
    let err = ctx.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(err.run_failure().unwrap().failures[0].error, TaskError::NotFound(_)));

    cloud.insert("drifted", "small", Some("red"));
    let mut ctx = context(
        TargetKind::Direct,
        &cloud,
        vec![Widget::new("drifted")
            .color("blue")
            .with_lifecycle(Lifecycle::ExistsAndValidates)],
    );
    let err = ctx.run(RunOptions::default()).await.unwrap_err();
    let failure = err.run_failure().unwrap();
    assert!(matches!(&failure.failures[0].error, TaskError::Validation(msg) if msg.contains("color")));
    assert_eq!(cloud.by_name("drifted").unwrap().color.as_deref(), Some("red"));
}

#[tokio::test]
async fn test_warn_if_changes_leaves_drift_alone() {
    let cloud = FakeCloud::new();
    cloud.insert("drifted", "small", Some("red"));

    let report = context(
        TargetKind::Direct,
        &cloud,
        vec![Widget::new("drifted")
            .color("blue")
            .with_lifecycle(Lifecycle::ExistsAndWarnIfChanges)],
    )
    .run(RunOptions::default())
    .await
    .unwrap();

    let applied = report.outcome("drifted").and_then(TaskOutcome::applied).unwrap();
    assert_eq!(applied.action, Action::DriftIgnored);
    assert!(applied.changes.as_ref().unwrap().contains("color"));
    assert!(cloud.renders().is_empty());
    assert_eq!(cloud.by_name("drifted").unwrap().color.as_deref(), Some("red"));
}

#[tokio::test]
async fn test_ignore_lifecycle_does_nothing() {
    let cloud = FakeCloud::new();
    let report = context(
        TargetKind::Direct,
        &cloud,
        vec![Widget::new("ignored").failing().with_lifecycle(Lifecycle::Ignore)],
    )
    .run(RunOptions::default())
    .await
    .unwrap();

    assert_eq!(action(report.outcome("ignored")), Action::Ignored);
    assert!(cloud.events().is_empty());
}

#[tokio::test]
async fn test_shared_resource_must_exist_for_direct_target() {
    let cloud = FakeCloud::new();
    let mut ctx = context(
        TargetKind::Direct,
        &cloud,
        vec![Widget::new("existing").shared(Some("w-404"))],
    );
    let err = ctx.run(RunOptions::default()).await.unwrap_err();
    assert!(matches!(err.run_failure().unwrap().failures[0].error, TaskError::NotFound(_)));
    assert_eq!(cloud.count(), 0);
}

#[tokio::test]
async fn test_dry_run_records_plan_without_rendering() {
    let cloud = FakeCloud::new();
    cloud.insert("vpc", "small", Some("red"));

    let mut ctx = context(
        TargetKind::DryRun,
        &cloud,
        vec![
            Widget::new("vpc").color("blue"),
            Widget::new("subnet").parent("vpc"),
            Widget::new("same"),
        ],
    );
    cloud.insert("same", "small", None);
    let report = ctx.run(RunOptions::default()).await.unwrap();

    assert!(cloud.renders().is_empty());
    assert_eq!(action(report.outcome("vpc")), Action::Planned);
    assert_eq!(report.changed(), vec!["subnet", "vpc"]);

    let Target::DryRun(plan) = ctx.target() else {
        panic!("expected dry-run target");
    };
    let planned = plan.changes();
    assert_eq!(planned.len(), 2);
    assert_eq!(planned[0].task, "subnet");
    assert!(planned[0].create);
    assert_eq!(planned[1].task, "vpc");
    assert!(!planned[1].create);
    assert_eq!(planned[1].changes.fields().collect::<Vec<_>>(), vec!["color"]);
    assert!(plan.summary().contains("Will create resources:"));
}

#[tokio::test]
async fn test_terraform_target_links_dependencies() {
    let cloud = FakeCloud::new();
    let mut ctx = context(
        TargetKind::Terraform,
        &cloud,
        vec![Widget::new("vpc").size("large"), Widget::new("subnet").parent("vpc")],
    );
    let report = ctx.run(RunOptions::default()).await.unwrap();

    assert_eq!(action(report.outcome("subnet")), Action::Rendered);
    assert_eq!(cloud.count(), 0);
    assert_eq!(
        ctx.target().document().unwrap(),
        json!({
            "resource": {
                "widget": {
                    "vpc": {"size": "large", "color": null, "parent": null},
                    "subnet": {"size": "small", "color": null, "parent": "${widget.vpc.id}"}
                }
            }
        })
    );
}

#[tokio::test]
async fn test_terraform_target_discovers_shared_ids() {
    let cloud = FakeCloud::new();
    let id = cloud.insert("existing", "small", None);
    let mut ctx = context(
        TargetKind::Terraform,
        &cloud,
        vec![
            Widget::new("existing").shared(None),
            Widget::new("nowhere").shared(None),
            Widget::new("child").parent("existing"),
        ],
    );
    let report = ctx.run(RunOptions::default()).await.unwrap();

    assert_eq!(report.resolved["existing"].id.as_deref(), Some(id.as_str()));
    assert_eq!(report.resolved["nowhere"].id, None);
    let Target::Terraform(tf) = ctx.target() else {
        panic!("expected terraform target");
    };
    assert_eq!(tf.resource("widget", "child").unwrap()["parent"], json!(id));
}

#[tokio::test]
async fn test_cloudformation_target_uses_refs() {
    let cloud = FakeCloud::new();
    let mut ctx = context(
        TargetKind::CloudFormation,
        &cloud,
        vec![Widget::new("vpc"), Widget::new("subnet").parent("vpc")],
    );
    ctx.run(RunOptions::default()).await.unwrap();

    let doc = ctx.target().document().unwrap();
    assert_eq!(
        doc["Resources"]["TestWidgetsubnet"],
        json!({
            "Type": "Test::Widget",
            "Properties": {"Size": "small", "Parent": {"Ref": "TestWidgetvpc"}}
        })
    );
}
