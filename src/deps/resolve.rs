//! Mapping between module names and files in source directories.

use std::path::{Path, PathBuf};

use super::scanner::ModuleName;

/// Every path the module could live at, one per source directory.
///
/// Paths that do not exist are still returned: creating one of them later
/// must mark the importing targets dirty.
pub fn candidates<'a>(
    module: &'a ModuleName,
    source_dirs: &'a [PathBuf],
) -> impl Iterator<Item = PathBuf> + 'a {
    let relative = module.relative_path();
    source_dirs.iter().map(move |dir| dir.join(&relative))
}

/// Module defined by `path`, if it sits inside one of the source directories.
pub fn module_for_path(path: &Path, source_dirs: &[PathBuf]) -> Option<ModuleName> {
    if path.extension().is_none_or(|ext| ext != "elm") {
        return None;
    }
    source_dirs.iter().find_map(|dir| {
        let relative = path.strip_prefix(dir).ok()?.with_extension("");
        let dotted = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?
            .join(".");
        ModuleName::parse(&dotted)
    })
}
