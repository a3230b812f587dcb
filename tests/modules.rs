//! Integration tests for module discovery, ordering and delegation

mod common;

use cohesion::config::{collect_configs, order_configs, Inclusion, PATHSPEC_LABEL};
use cohesion::error::{CohesionError, ExecutionError, RegistryError};
use cohesion::runner::{ExecParams, Selection};
use common::{engine, RecordingRunner, Workspace};
use futures::StreamExt;
use std::collections::BTreeMap;

fn monorepo() -> Workspace {
    let ws = Workspace::new();
    ws.write(
        "cohesion.yml",
        r#"
modules:
  - patterns: ["apps/*"]
    labels:
      kind: app
  - patterns: ["libs/*"]
    labels:
      kind: lib
      team: platform
tasks:
  - name: build
    actions:
      - type: delegate
"#,
    );
    ws.write(
        "apps/web/cohesion.yml",
        r#"
labels:
  team: [web]
  env: [prod, east]
modules: ["plugins/*"]
tasks:
  - name: build
    actions: ["build web"]
"#,
    );
    ws.write(
        "apps/web/plugins/charts/cohesion.yml",
        "tasks:\n  - name: build\n    actions: [\"build charts\"]\n",
    );
    ws.write(
        "libs/core/cohesion.yml",
        "tasks:\n  - name: build\n    actions: [\"build core\"]\n",
    );
    ws.write(
        "libs/ui/cohesion.yml",
        "labels:\n  env: [prod]\ntasks:\n  - name: build\n    actions: [\"build ui\"]\n",
    );
    ws.write("libs/empty/README.md", "no config here");
    ws
}

fn pathspecs(configs: &[std::sync::Arc<cohesion::config::Config>]) -> Vec<String> {
    configs
        .iter()
        .map(|c| c.pathspec().unwrap_or(".").to_string())
        .collect()
}

#[tokio::test]
async fn test_discovery_is_depth_first() {
    let ws = monorepo();
    let root = ws.load("cohesion.yml").await;

    let configs = collect_configs(&root).await.unwrap();
    assert_eq!(
        pathspecs(&configs),
        vec!["apps/web", "plugins/charts", "libs/core", "libs/ui"]
    );

    assert_eq!(configs[0].path, ws.join("apps/web"));
    assert_eq!(configs[0].depth(), 1);
    assert_eq!(configs[1].depth(), 2);
    assert_eq!(configs[1].parent().unwrap().path, ws.join("apps/web"));
}

#[tokio::test]
async fn test_discovery_stream_is_lazy() {
    let ws = monorepo();
    let root = ws.load("cohesion.yml").await;

    let first: Vec<_> = root.resolve_configs().take(1).collect().await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].as_ref().unwrap().pathspec(), Some("apps/web"));
}

#[tokio::test]
async fn test_label_precedence() {
    let ws = monorepo();
    let root = ws.load("cohesion.yml").await;
    let configs = collect_configs(&root).await.unwrap();

    // Own labels win over the reference's
    let web = &configs[0];
    assert_eq!(web.label("team"), ["web"]);
    assert_eq!(web.label("kind"), ["app"]);
    assert_eq!(web.label(PATHSPEC_LABEL), ["apps/web"]);

    let core = &configs[2];
    assert_eq!(core.label("team"), ["platform"]);
    assert_eq!(core.label("kind"), ["lib"]);
}

#[tokio::test]
async fn test_pathspec_label_is_always_overwritten() {
    let ws = Workspace::new();
    ws.write("cohesion.yml", "modules: [svc]\n");
    ws.write(
        "svc/cohesion.yml",
        "labels:\n  \"cohesion:pathspec\": [elsewhere]\n",
    );

    let root = ws.load("cohesion.yml").await;
    let configs = collect_configs(&root).await.unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].label(PATHSPEC_LABEL), ["svc"]);
}

#[tokio::test]
async fn test_cyclic_patterns_terminate() {
    let ws = Workspace::new();
    ws.write("cohesion.yml", "modules: [\"a\", \"b\"]\n");
    ws.write("a/cohesion.yml", "modules: [\"../b\", \"..\"]\n");
    ws.write("b/cohesion.yml", "modules: [\"../a\"]\n");

    let root = ws.load("cohesion.yml").await;
    let configs = collect_configs(&root).await.unwrap();

    let files: Vec<_> = configs.iter().map(|c| c.path.clone()).collect();
    assert_eq!(files, vec![ws.join("a"), ws.join("b")]);
}

#[tokio::test]
async fn test_ordering_and_inclusion() {
    let ws = monorepo();
    let root = ws.load("cohesion.yml").await;
    let configs = collect_configs(&root).await.unwrap();

    let mut rules = BTreeMap::new();
    rules.insert("libs/ui".to_string(), vec!["libs/core".to_string()]);
    rules.insert("apps/*".to_string(), vec!["libs/*".to_string()]);
    let ordered = order_configs(configs, &rules).unwrap();
    assert_eq!(
        pathspecs(&ordered),
        vec!["plugins/charts", "libs/core", "libs/ui", "apps/web"]
    );

    let prod = Inclusion::from_groups(vec![("env", vec!["prod"])]);
    assert_eq!(pathspecs(&prod.filter(ordered.clone())), vec!["libs/ui", "apps/web"]);

    let prod_east = Inclusion::from_groups(vec![("env", vec!["prod,east"])]);
    assert_eq!(pathspecs(&prod_east.filter(ordered)), vec!["apps/web"]);
}

#[tokio::test]
async fn test_delegate_fans_out_in_discovery_order() {
    let ws = monorepo();
    let root = ws.load("cohesion.yml").await;
    let runner = RecordingRunner::new();
    let engine = engine(&root, &runner);

    engine
        .exec(&root, &Selection::parse("build"), &ExecParams::new())
        .await
        .unwrap();

    assert_eq!(
        runner.commands(),
        vec!["build web", "build charts", "build core", "build ui"]
    );

    let labels: Vec<_> = runner
        .requests()
        .into_iter()
        .map(|r| r.label.unwrap_or_default())
        .collect();
    assert_eq!(
        labels,
        vec![
            "build/apps/web.build",
            "build/plugins/charts.build",
            "build/libs/core.build",
            "build/libs/ui.build"
        ]
    );
}

#[tokio::test]
async fn test_delegate_reports_dependency_cycles() {
    let ws = Workspace::new();
    ws.write(
        "cohesion.yml",
        r#"
modules: ["svc/*"]
dependencies:
  svc/a: [svc/b]
  svc/b: [svc/a]
tasks:
  - name: deploy
    actions:
      - type: delegate
"#,
    );
    ws.write("svc/a/cohesion.yml", "tasks:\n  - name: deploy\n    actions: [\"deploy a\"]\n");
    ws.write("svc/b/cohesion.yml", "tasks:\n  - name: deploy\n    actions: [\"deploy b\"]\n");

    let root = ws.load("cohesion.yml").await;
    let runner = RecordingRunner::new();
    let engine = engine(&root, &runner);

    let result = engine
        .exec(&root, &Selection::parse("deploy"), &ExecParams::new())
        .await;
    match result {
        Err(CohesionError::Execution(ExecutionError::DependencyCycle(members))) => {
            assert_eq!(members, vec!["svc/a", "svc/b"]);
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
    assert!(runner.commands().is_empty());
}

fn node_module(ws: &Workspace) {
    ws.write(
        "cohesion.yml",
        r#"
modules: ["packages/*"]
tasks:
  - name: build
    actions:
      - type: delegate
"#,
    );
    ws.write(
        "packages/web/cohesion.yml",
        r#"
plugins:
  - module: node
tasks:
  - name: build
    actions:
      - type: node.script
        script: build
"#,
    );
    ws.write(
        "packages/web/package.json",
        r#"{ "name": "web", "packageManager": "pnpm@9.1.0" }"#,
    );
}

#[tokio::test]
async fn test_delegated_module_loads_its_own_plugins() {
    let ws = Workspace::new();
    node_module(&ws);

    let root = ws.load("cohesion.yml").await;
    assert!(root.plugins.is_empty());
    let runner = RecordingRunner::new();
    let engine = engine(&root, &runner);

    engine
        .exec(&root, &Selection::parse("build"), &ExecParams::new())
        .await
        .unwrap();

    assert_eq!(runner.commands(), vec!["pnpm run build"]);
    assert_eq!(runner.requests()[0].cwd, ws.join("packages/web"));
}

#[tokio::test]
async fn test_module_plugins_do_not_leak_to_siblings() {
    let ws = Workspace::new();
    node_module(&ws);
    ws.write(
        "packages/zz-api/cohesion.yml",
        "tasks:\n  - name: build\n    actions:\n      - { type: node.script, script: build }\n",
    );

    let root = ws.load("cohesion.yml").await;
    let runner = RecordingRunner::new();
    let engine = engine(&root, &runner);

    let result = engine
        .exec(&root, &Selection::parse("build"), &ExecParams::new())
        .await;
    assert!(matches!(
        result,
        Err(CohesionError::Registry(RegistryError::UnknownActionType(kind))) if kind == "node.script"
    ));
    assert_eq!(runner.commands(), vec!["pnpm run build"]);
}
