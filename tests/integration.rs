use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use persona_core::activation::RoleActivator;
use persona_core::compose::CompositionStatus;
use persona_core::dpml::Tag;
use persona_core::error::{PersonaError, PersonaResult};
use persona_core::protocol::{DirectoryProtocol, Location, ProtocolResolver, ProtocolTable};
use persona_core::registry::{
    DirectoryScanner, ManifestSource, RegistrySource, RegistryState, ResourceDescriptor,
    ResourceRegistry, StaticSource,
};
use persona_core::resource::ResourceManager;
use persona_core::storage::{MemoryStore, ResourceStore};

// ─── Fixtures ───────────────────────────────────────────────────────────────

const ANALYSIS: &str = "<thought>\n<reasoning>\n## Decomposition\nSplit the problem into **small parts**.\n</reasoning>\n</thought>";
const REVIEW: &str = "<execution>\n<process>\n1. Read the diff\n2. Run the tests\n3. Leave comments\n</process>\n</execution>";

/// Counts bootstraps of the wrapped source.
struct CountingSource {
    inner: Arc<dyn RegistrySource>,
    calls: AtomicUsize,
}

#[async_trait]
impl RegistrySource for CountingSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn discover(&self) -> PersonaResult<Vec<ResourceDescriptor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.inner.discover().await
    }
}

struct Engine {
    activator: RoleActivator,
    scans: Arc<CountingSource>,
}

fn engine(roles: &[(&str, &str)]) -> Engine {
    let package = MemoryStore::with_root("/opt/persona")
        .with_file("resource/thought/analysis.thought.md", ANALYSIS)
        .with_file("resource/execution/review.execution.md", REVIEW)
        .with_file("resource/thought/cycle-a.thought.md", "A sees @thought://cycle-b")
        .with_file("resource/thought/cycle-b.thought.md", "B sees @thought://cycle-a");
    for (id, content) in roles {
        package.insert(&format!("resource/role/{id}/{id}.role.md"), *content);
    }
    let package: Arc<dyn ResourceStore> = Arc::new(package);
    let project: Arc<dyn ResourceStore> = Arc::new(
        MemoryStore::with_root("/work/app")
            .with_file("finance.md", "Revenue grew 12% in Q3.")
            .with_file(
                "registry.json",
                r#"{"resources":[{"id":"finance","protocol":"knowledge","reference":"@project://finance.md"}]}"#,
            ),
    );

    let scans = Arc::new(CountingSource {
        inner: Arc::new(DirectoryScanner::new("package", package.clone(), "resource")),
        calls: AtomicUsize::new(0),
    });
    let registry = ResourceRegistry::new()
        .with_source(scans.clone())
        .with_source(Arc::new(ManifestSource::new(
            "project-manifest",
            project.clone(),
            "registry.json",
        )));
    let resources = ResourceManager::new(Arc::new(registry))
        .with_protocol(Arc::new(DirectoryProtocol::new("package", package)))
        .with_protocol(Arc::new(DirectoryProtocol::new("project", project)));

    Engine {
        activator: RoleActivator::new(Arc::new(resources)),
        scans,
    }
}

// ─── Composition ────────────────────────────────────────────────────────────

#[tokio::test]
async fn reference_only_blocks_hoist_into_flat_sets() {
    let engine = engine(&[(
        "dev",
        "<role>\n<knowledge>@thought://analysis</knowledge>\n<principle>@execution://review</principle>\n</role>",
    )]);
    let activation = engine.activator.activate("dev").await.unwrap();
    let role = &activation.role;

    assert_eq!(role.thoughts.iter().collect::<Vec<_>>(), vec!["analysis"]);
    assert_eq!(role.executions.iter().collect::<Vec<_>>(), vec!["review"]);
    assert_eq!(role.knowledge, vec!["dev".to_string()]);
    assert_eq!(role.status, CompositionStatus::Composed);

    let text = &role.composed_text;
    let thought = text.find("Split the problem").unwrap();
    let execution = text.find("1. Read the diff").unwrap();
    assert!(thought < execution);
    assert!(!text.contains("@thought://analysis"));
    assert!(!text.contains("@execution://review"));
}

#[tokio::test]
async fn prose_block_inlines_without_hoisting() {
    let engine = engine(&[(
        "analyst",
        "<role>\n<knowledge>@project://finance.md background info</knowledge>\n\
         <personality>Thinks in numbers. @thought://analysis</personality>\n</role>",
    )]);
    let role = engine.activator.activate("analyst").await.unwrap().role;

    assert_eq!(
        role.sections.get(&Tag::Knowledge).map(String::as_str),
        Some("Revenue grew 12% in Q3. background info")
    );
    assert!(role.sections[&Tag::Personality].contains("Split the problem"));
    assert!(role.thoughts.is_empty());
    assert!(role.executions.is_empty());
    assert_eq!(role.knowledge, vec!["analyst".to_string()]);
}

#[tokio::test]
async fn unknown_protocol_is_contained() {
    let engine = engine(&[(
        "dev",
        "<role><principle>@ghost://x @execution://review</principle>\
         <knowledge>Ledger: @knowledge://finance</knowledge></role>",
    )]);
    let role = engine.activator.activate("dev").await.unwrap().role;

    assert_eq!(role.status, CompositionStatus::PartiallyFailed);
    assert_eq!(role.failures.len(), 1);
    assert_eq!(role.failures[0].reference, "@ghost://x");
    assert!(role.failures[0].error.contains("Protocol not found: ghost"));
    assert!(role.composed_text.contains("[unresolved: Could not resolve @ghost://x"));
    assert!(role.composed_text.contains("3. Leave comments"));
    assert!(role.composed_text.contains("Ledger: Revenue grew 12% in Q3."));
}

#[tokio::test]
async fn mutual_references_terminate_with_suppression() {
    let role = "<role><personality>Start: @thought://cycle-a</personality></role>";
    let engine = engine(&[("loop", role)]);
    let role = engine.activator.activate("loop").await.unwrap().role;

    assert_eq!(role.sections[&Tag::Personality], "Start: A sees B sees");
    assert_eq!(role.suppressed.len(), 1);
    assert_eq!(role.suppressed[0].to_string(), "thought://cycle-a");
    assert_eq!(role.status, CompositionStatus::Composed);
}

#[tokio::test]
async fn dedup_is_scoped_to_one_activation() {
    let engine = engine(&[("dev", "<role><principle>@execution://review</principle></role>")]);
    let first = engine.activator.activate("dev").await.unwrap();
    let second = engine.activator.activate("dev").await.unwrap();
    assert!(first.role.composed_text.contains("2. Run the tests"));
    assert!(second.role.composed_text.contains("2. Run the tests"));
    assert!(second.role.suppressed.is_empty());
}

#[tokio::test]
async fn lazy_references_stay_pointers() {
    let engine = engine(&[(
        "dev",
        "<role><knowledge>See @?knowledge://finance when asked.</knowledge>\
         <principle>@?execution://review</principle></role>",
    )]);
    let role = engine.activator.activate("dev").await.unwrap().role;
    assert_eq!(role.sections[&Tag::Knowledge], "See @?knowledge://finance when asked.");
    assert!(role.executions.is_empty());
}

// ─── Activation & priming ───────────────────────────────────────────────────

#[tokio::test]
async fn activation_primes_concepts_and_procedures() {
    let engine = engine(&[(
        "dev",
        "<role><personality>**Pragmatic** engineer.</personality>\
         <principle>@thought://analysis @execution://review</principle></role>",
    )]);
    let activation = engine.activator.activate("dev").await.unwrap();

    let prime = activation.prime.as_deref().unwrap();
    assert!(prime.starts_with("mindmap\n  root((dev))\n"));
    assert!(prime.contains("Pragmatic"));
    assert!(prime.contains("small parts"));

    assert!(activation.procedural.starts_with("flowchart LR\n"));
    assert!(activation.procedural.contains("subgraph flow1[\"execution://review\"]"));
    assert!(activation.procedural.contains(
        "flow1_1[\"Read the diff\"] --> flow1_2[\"Run the tests\"] --> flow1_3[\"Leave comments\"]"
    ));
}

#[tokio::test]
async fn missing_role_and_malformed_role_fail() {
    let engine = engine(&[("broken", "<role><personality>never closed</role>")]);

    let err = engine.activator.activate("nobody").await.unwrap_err();
    assert!(matches!(err, PersonaError::ResourceNotFound { .. }));

    let err = engine.activator.activate("broken").await.unwrap_err();
    assert!(matches!(err, PersonaError::Parse { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_first_activations_bootstrap_once() {
    let role = "<role><principle>@execution://review</principle></role>";
    let engine = Arc::new(engine(&[("dev", role)]));
    assert_eq!(
        engine.activator.resources().registry().state(),
        RegistryState::Uninitialized
    );

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.activator.activate("dev").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(engine.scans.calls.load(Ordering::SeqCst), 1);
    assert!(engine.activator.resources().registry().is_ready());
}

// ─── Generic resolve entrypoint ─────────────────────────────────────────────

#[tokio::test]
async fn resolve_entrypoint_covers_every_family() {
    let engine = engine(&[]);
    let resources = engine.activator.resources();

    let finance = resources.resolve("@knowledge://finance").await.unwrap();
    assert_eq!(finance.content, "Revenue grew 12% in Q3.");
    assert_eq!(finance.location.absolute(), "/work/app/finance.md");

    let review = resources.resolve("@!execution://review").await.unwrap();
    assert!(review.content.contains("<process>"));

    assert!(matches!(
        resources.resolve("@package://../etc/passwd").await.unwrap_err(),
        PersonaError::InvalidReference(_)
    ));
    assert!(matches!(
        resources.resolve("thought://missing").await.unwrap_err(),
        PersonaError::ResourceNotFound { .. }
    ));
}

#[tokio::test]
async fn bare_path_descriptors_read_from_the_package_root() {
    let package: Arc<dyn ResourceStore> =
        Arc::new(MemoryStore::new().with_file("thought/plain.md", "PLAIN CONTENT"));
    let registry = ResourceRegistry::new().with_source(Arc::new(StaticSource::new(
        "static",
        vec![ResourceDescriptor::new("thought", "plain", "thought/plain.md")],
    )));
    let resources = ResourceManager::new(Arc::new(registry))
        .with_protocol(Arc::new(DirectoryProtocol::new("package", package)));

    let plain = resources.resolve("@thought://plain").await.unwrap();
    assert_eq!(plain.content, "PLAIN CONTENT");
    assert_eq!(plain.location.protocol, "package");
}

/// A protocol registered after setup: `memo://name` reads `memos/<name>.md`
/// from the project store.
struct MemoProtocol {
    store: Arc<dyn ResourceStore>,
}

#[async_trait]
impl ProtocolResolver for MemoProtocol {
    fn name(&self) -> &str {
        "memo"
    }

    async fn resolve(&self, path: &str, _table: &ProtocolTable) -> PersonaResult<Location> {
        let file = format!("memos/{path}.md");
        if !self.store.exists(&file).await? {
            return Err(PersonaError::not_found("memo", path));
        }
        Ok(Location::new("memo", file, self.store.clone()))
    }
}

#[tokio::test]
async fn protocols_can_be_registered_at_runtime() {
    let engine = engine(&[("dev", "<role><knowledge>Note: @memo://standup</knowledge></role>")]);

    let before = engine.activator.activate("dev").await.unwrap().role;
    assert_eq!(before.status, CompositionStatus::PartiallyFailed);

    let memos: Arc<dyn ResourceStore> =
        Arc::new(MemoryStore::new().with_file("memos/standup.md", "Daily at 9."));
    engine
        .activator
        .resources()
        .register_protocol(Arc::new(MemoProtocol { store: memos }));

    let after = engine.activator.activate("dev").await.unwrap().role;
    assert_eq!(after.status, CompositionStatus::Composed);
    assert_eq!(after.sections[&Tag::Knowledge], "Note: Daily at 9.");
}

// ─── On-disk roots ──────────────────────────────────────────────────────────

#[cfg(feature = "native")]
#[tokio::test]
async fn config_roots_layer_with_user_precedence() {
    use persona_core::config::EngineConfig;

    let dir = tempfile::tempdir().unwrap();
    let package = dir.path().join("package");
    let user = dir.path().join("user");
    std::fs::create_dir_all(package.join("resource/role")).unwrap();
    std::fs::create_dir_all(package.join("resource/thought")).unwrap();
    std::fs::create_dir_all(user.join("resource/thought")).unwrap();
    std::fs::write(
        package.join("resource/role/dev.role.md"),
        "# Developer\nShips code.\n<role><principle>@thought://style</principle></role>",
    )
    .unwrap();
    std::fs::write(package.join("resource/thought/style.thought.md"), "Package style.").unwrap();
    std::fs::write(user.join("resource/thought/style.thought.md"), "User style.").unwrap();

    let yaml = format!(
        "package_root: {}\nuser_root: {}\ncompose:\n  max_depth: 4\n",
        package.display(),
        user.display()
    );
    let config = EngineConfig::from_yaml_str(&yaml).unwrap();
    let activator = RoleActivator::from_config(&config).unwrap();

    let role = activator.activate("dev").await.unwrap().role;
    assert_eq!(role.name, "Developer");
    assert_eq!(role.description, "Ships code.");
    assert!(role.composed_text.contains("User style."));
    assert!(!role.composed_text.contains("Package style."));
}

#[cfg(feature = "native")]
#[tokio::test]
async fn manifest_bare_paths_resolve_under_their_own_root() {
    use persona_core::config::EngineConfig;

    let dir = tempfile::tempdir().unwrap();
    let package = dir.path().join("package");
    let project = dir.path().join("project");
    std::fs::create_dir_all(package.join("resource/role")).unwrap();
    std::fs::create_dir_all(project.join("notes")).unwrap();
    std::fs::write(
        package.join("resource/role/dev.role.md"),
        "<role><knowledge>Terms: @knowledge://glossary</knowledge></role>",
    )
    .unwrap();
    std::fs::write(project.join("notes/glossary.md"), "ARR means annual recurring revenue.")
        .unwrap();
    std::fs::write(
        project.join("registry.json"),
        r#"{"resources":[{"id":"glossary","protocol":"knowledge","reference":"notes/glossary.md"}]}"#,
    )
    .unwrap();

    let yaml = format!(
        "package_root: {}\nproject_root: {}\n",
        package.display(),
        project.display()
    );
    let config = EngineConfig::from_yaml_str(&yaml).unwrap();
    let activator = RoleActivator::from_config(&config).unwrap();

    let role = activator.activate("dev").await.unwrap().role;
    assert_eq!(role.status, CompositionStatus::Composed);
    assert_eq!(
        role.sections[&Tag::Knowledge],
        "Terms: ARR means annual recurring revenue."
    );
}
