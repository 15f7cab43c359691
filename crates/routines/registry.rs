use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use routine_actions::{ActionRegistry, TemplateRegistry};
use walkdir::WalkDir;

use crate::compile::{compile_routine_file, CompiledRoutine};
use crate::error::LoaderError;
use crate::file::{ConfigParam, RoutineFile, SentryRecord};

struct State {
    valid: IndexMap<String, Arc<CompiledRoutine>>,
    invalid: IndexMap<String, String>,
}

/// Eagerly walks a base directory for routine files and indexes the
/// compiled result under a slashed namespace path, keeping the full set
/// guarded by a single reader-writer lock so `Get` never blocks behind a
/// reload and never observes a half-populated state.
///
/// Deliberately does not own an [`ActionRegistry`]/[`TemplateRegistry`]
/// itself — both are borrowed for the duration of `load`/`reload`, since
/// neither is safe to share by clone (the template registry in particular
/// carries no internal locking, by design, for its read-only-after-startup
/// discipline).
pub struct RoutineRegistry {
    base_dir: PathBuf,
    state: RwLock<State>,
}

impl RoutineRegistry {
    /// Walks `base_dir` recursively, compiling every `.yml`/`.yaml` file
    /// found. Routines that fail to parse or validate are indexed under
    /// the invalid map rather than aborting the whole load.
    #[must_use]
    pub fn load(base_dir: impl Into<PathBuf>, actions: &ActionRegistry, templates: &TemplateRegistry) -> Self {
        let base_dir = base_dir.into();
        let (valid, invalid) = walk_and_compile(&base_dir, actions, templates);
        Self {
            base_dir,
            state: RwLock::new(State { valid, invalid }),
        }
    }

    /// Re-walks the base directory and atomically swaps the populated
    /// maps, so in-flight `Get` calls never observe a partially-reloaded
    /// state.
    pub fn reload(&self, actions: &ActionRegistry, templates: &TemplateRegistry) {
        let (valid, invalid) = walk_and_compile(&self.base_dir, actions, templates);
        let mut state = self.state.write();
        state.valid = valid;
        state.invalid = invalid;
    }

    /// Looks up a compiled routine by its slashed namespace.
    pub fn get(&self, namespace: &str) -> Result<Arc<CompiledRoutine>, LoaderError> {
        self.state
            .read()
            .valid
            .get(namespace)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(namespace.to_string()))
    }

    /// Looks up a compiled routine together with its declared sentries,
    /// for the manager to register at bot startup.
    pub fn get_with_sentries(&self, namespace: &str) -> Result<(Arc<CompiledRoutine>, Vec<SentryRecord>), LoaderError> {
        let routine = self.get(namespace)?;
        let sentries = routine.sentries.clone();
        Ok((routine, sentries))
    }

    /// The declared sentries for a routine, without its full step tree.
    pub fn get_sentries(&self, namespace: &str) -> Result<Vec<SentryRecord>, LoaderError> {
        Ok(self.get(namespace)?.sentries.clone())
    }

    /// The declared config params for a routine.
    pub fn get_config(&self, namespace: &str) -> Result<Vec<ConfigParam>, LoaderError> {
        Ok(self.get(namespace)?.config.clone())
    }

    /// Every successfully compiled routine's namespace.
    #[must_use]
    pub fn list_valid(&self) -> Vec<String> {
        self.state.read().valid.keys().cloned().collect()
    }

    /// Every routine that failed to load, paired with its error message.
    #[must_use]
    pub fn list_invalid(&self) -> Vec<(String, String)> {
        self.state
            .read()
            .invalid
            .iter()
            .map(|(namespace, err)| (namespace.clone(), err.clone()))
            .collect()
    }

    /// Namespaces of every valid routine carrying `tag`.
    #[must_use]
    pub fn list_by_tag(&self, tag: &str) -> Vec<String> {
        self.state
            .read()
            .valid
            .iter()
            .filter(|(_, routine)| routine.tags.iter().any(|t| t == tag))
            .map(|(namespace, _)| namespace.clone())
            .collect()
    }

    /// True if the named routine is valid and carries `tag`.
    #[must_use]
    pub fn has_tag(&self, namespace: &str, tag: &str) -> bool {
        self.state
            .read()
            .valid
            .get(namespace)
            .is_some_and(|routine| routine.tags.iter().any(|t| t == tag))
    }

    /// Namespaces of every valid routine under `prefix` (e.g. `"combat"`
    /// matches `"combat/battle_loop"`).
    #[must_use]
    pub fn list_by_namespace(&self, prefix: &str) -> Vec<String> {
        let prefix_with_slash = format!("{prefix}/");
        self.state
            .read()
            .valid
            .keys()
            .filter(|namespace| namespace.starts_with(&prefix_with_slash) || namespace.as_str() == prefix)
            .cloned()
            .collect()
    }
}

fn namespace_for(base_dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base_dir).unwrap_or(path);
    let without_extension = relative.with_extension("");
    without_extension
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_lowercase())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_routine_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn walk_and_compile(
    base_dir: &Path,
    actions: &ActionRegistry,
    templates: &TemplateRegistry,
) -> (IndexMap<String, Arc<CompiledRoutine>>, IndexMap<String, String>) {
    let mut valid = IndexMap::new();
    let mut invalid = IndexMap::new();

    for entry in WalkDir::new(base_dir).into_iter().filter_map(Result::ok) {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_routine_file(path) {
            continue;
        }
        let namespace = namespace_for(base_dir, path);

        match load_one(path, actions, templates) {
            Ok(compiled) => {
                valid.insert(namespace, Arc::new(compiled));
            }
            Err(err) => {
                tracing::warn!(namespace = %namespace, error = %err, "routine failed to load");
                invalid.insert(namespace, err.to_string());
            }
        }
    }

    (valid, invalid)
}

fn load_one(path: &Path, actions: &ActionRegistry, templates: &TemplateRegistry) -> Result<CompiledRoutine, LoaderError> {
    let content = fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: RoutineFile = serde_yaml::from_str(&content).map_err(|source| LoaderError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    compile_routine_file(&file, actions, templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_routine(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn loads_valid_and_invalid_routines_under_namespaces() {
        let dir = tempdir().unwrap();
        write_routine(
            dir.path(),
            "combat/battle_loop.yaml",
            r#"
routine_name: "Battle Loop"
tags: ["combat"]
steps:
  - action: Click
    x: 1
    y: 1
"#,
        );
        write_routine(
            dir.path(),
            "broken.yaml",
            r#"
routine_name: "Broken"
steps:
  - action: Bogus
"#,
        );

        let actions = ActionRegistry::with_builtins();
        let templates = TemplateRegistry::new();
        let registry = RoutineRegistry::load(dir.path(), &actions, &templates);

        assert!(registry.get("combat/battle_loop").is_ok());
        assert!(registry.has_tag("combat/battle_loop", "combat"));
        assert_eq!(registry.list_by_namespace("combat"), vec!["combat/battle_loop".to_string()]);
        assert_eq!(registry.list_invalid().len(), 1);
        assert!(registry.get("broken").is_err());
    }

    #[test]
    fn reload_picks_up_new_files() {
        let dir = tempdir().unwrap();
        let actions = ActionRegistry::with_builtins();
        let templates = TemplateRegistry::new();
        let registry = RoutineRegistry::load(dir.path(), &actions, &templates);
        assert!(registry.list_valid().is_empty());

        write_routine(
            dir.path(),
            "farm.yaml",
            r#"
routine_name: "Farm"
steps:
  - action: Click
    x: 1
    y: 1
"#,
        );
        registry.reload(&actions, &templates);
        assert_eq!(registry.list_valid(), vec!["farm".to_string()]);
    }
}
