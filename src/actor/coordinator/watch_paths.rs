use std::path::PathBuf;

use crate::actor::fs::WatchRoot;
use crate::config::WatchConfig;
use crate::project::Project;

/// Source directories recursively; `elm.json`, `elm-watch.json` and input
/// directories for their direct entries only.
pub(super) fn collect_watch_roots(project: &Project, config: &WatchConfig) -> Vec<WatchRoot> {
    let mut roots: Vec<WatchRoot> = project
        .all_source_dirs()
        .into_iter()
        .map(WatchRoot::recursive)
        .collect();

    let shallow = project
        .groups()
        .filter_map(|g| g.elm_json.as_path().parent().map(PathBuf::from))
        .chain(config.config_path.parent().map(PathBuf::from))
        .chain(
            project
                .targets()
                .flat_map(|t| t.inputs.iter())
                .filter_map(|input| input.parent().map(PathBuf::from)),
        );
    roots.extend(shallow.map(WatchRoot::shallow));

    dedupe_roots(roots)
}

/// Drop duplicates and roots already covered by a recursive root.
fn dedupe_roots(roots: Vec<WatchRoot>) -> Vec<WatchRoot> {
    let recursive: Vec<PathBuf> = roots
        .iter()
        .filter(|r| r.recursive)
        .map(|r| r.path.clone())
        .collect();

    let mut kept: Vec<WatchRoot> = Vec::new();
    for root in roots {
        let covered = recursive
            .iter()
            .any(|dir| root.path.starts_with(dir) && (dir != &root.path || !root.recursive));
        if covered || kept.iter().any(|k| k.path == root.path) {
            continue;
        }
        kept.push(root);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_and_covered_roots_are_dropped() {
        let roots = vec![
            WatchRoot::recursive(PathBuf::from("/app/src")),
            WatchRoot::recursive(PathBuf::from("/app/src/Page")),
            WatchRoot::recursive(PathBuf::from("/shared")),
            WatchRoot::shallow(PathBuf::from("/app")),
            WatchRoot::shallow(PathBuf::from("/app/src")),
            WatchRoot::shallow(PathBuf::from("/app")),
        ];

        let kept = dedupe_roots(roots);
        assert_eq!(
            kept,
            vec![
                WatchRoot::recursive(PathBuf::from("/app/src")),
                WatchRoot::recursive(PathBuf::from("/shared")),
                WatchRoot::shallow(PathBuf::from("/app")),
            ]
        );
    }

    #[test]
    fn duplicate_recursive_root_kept_once() {
        let roots = vec![
            WatchRoot::recursive(PathBuf::from("/app/src")),
            WatchRoot::recursive(PathBuf::from("/app/src")),
        ];
        assert_eq!(dedupe_roots(roots).len(), 1);
    }
}
