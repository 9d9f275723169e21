use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use modrules_common::dependency::ResolveOptions;
use modrules_common::error::DescriptorErrorKind;
use modrules_common::model::{ModuleId, TargetContext};
use modrules_core::{check_references, load_dir, resolve_parallel};

const ASSET_DUMP: &str = r#"{
    "includePaths": [],
    "privateIncludePaths": [],
    "publicDependencies": ["Core", "CoreUObject", "Engine", "Json", "AssetRegistry", "GameplayTags", "EnhancedInput"],
    "privateDependencies": ["AssetRegistry", "Json", "JsonUtilities", "UnrealEd", "InputCore"],
    "conditionalDependencies": [
        { "predicate": "editorBuild == true", "modules": ["BlueprintGraph"], "visibility": "private" }
    ],
    "dynamicDependencies": [],
    "pchUsage": "useExplicitOrSharedPchs"
}"#;

const ASSET_DUMP_FIXED: &str = r#"
publicDependencies = ["Core", "CoreUObject", "Engine", "Json", "AssetRegistry", "GameplayTags", "EnhancedInput"]
privateDependencies = ["JsonUtilities", "UnrealEd", "InputCore"]

[[conditionalDependencies]]
predicate = "editorBuild == true"
modules = ["BlueprintGraph"]
visibility = "private"
"#;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn names(set: &BTreeSet<ModuleId>) -> Vec<&str> {
    set.iter().map(ModuleId::as_str).collect()
}

#[tokio::test]
async fn asset_dump_rules_are_rejected_for_duplicate_visibility() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Source/AssetDump/AssetDump.module.json", ASSET_DUMP);

    let set = load_dir(dir.path()).await.unwrap();
    assert_eq!(set.len(), 1);
    assert!(set.failures.is_empty());

    let descriptor = &set.find("AssetDump").unwrap().descriptor;
    let errors = descriptor.validate();
    let dupes: Vec<&str> = errors
        .iter()
        .filter(|e| e.kind == DescriptorErrorKind::DuplicateVisibility)
        .map(|e| e.subject.as_str())
        .collect();
    assert_eq!(dupes, vec!["AssetRegistry", "Json"]);
}

#[tokio::test]
async fn loads_resolves_and_checks_a_tree() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Source/AssetDump/AssetDump.module.toml", ASSET_DUMP_FIXED);
    write(
        dir.path(),
        "Source/DumpTools/DumpTools.module.json",
        r#"{ "publicDependencies": ["AssetDump"], "dynamicDependencies": ["LiveCoding"] }"#,
    );
    write(dir.path(), "Source/Broken/Broken.module.json", "{ not json");
    write(dir.path(), "Source/README.md", "not a descriptor");

    let set = load_dir(dir.path()).await.unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.failures.len(), 1);
    assert!(set.failures[0].path.ends_with("Broken.module.json"));

    let descriptors: Vec<_> = set.descriptors().cloned().map(Arc::new).collect();
    let editor = Arc::new(TargetContext::builder().editor_build(true).build());
    let resolution = resolve_parallel(descriptors, editor, ResolveOptions::default(), 2);
    assert!(resolution.is_success());

    let asset_dump = resolution.get("AssetDump").unwrap();
    assert_eq!(
        names(&asset_dump.resolved_private),
        vec!["BlueprintGraph", "InputCore", "JsonUtilities", "UnrealEd"]
    );

    let externals: BTreeSet<ModuleId> = [
        "Core",
        "CoreUObject",
        "Engine",
        "Json",
        "AssetRegistry",
        "GameplayTags",
        "EnhancedInput",
        "JsonUtilities",
        "UnrealEd",
        "InputCore",
        "BlueprintGraph",
    ]
    .into_iter()
    .map(ModuleId::from)
    .collect();
    let unknown = check_references(set.descriptors(), &resolution, &externals);
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].module.as_str(), "DumpTools");
    assert_eq!(unknown[0].reference.as_str(), "LiveCoding");
}

#[tokio::test]
async fn missing_root_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_dir(&dir.path().join("nope")).await.is_err());
}
