//! Export maps for the ASan runtimes
//!
//! The platform build links against `libclang_rt.asan-<arch>-android.so`
//! through a version script listing the symbols the runtime exports.

use crate::error::{BuildError, BuildResult};
use object::{Object, ObjectSymbol};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Version node used in generated map files
const VERSION_NODE: &str = "LIBCLANG_RT_ASAN";

/// Names of globally visible symbols defined in the dynamic symbol table
pub fn exported_symbols(data: &[u8]) -> Result<Vec<String>, object::Error> {
    let file = object::File::parse(data)?;
    let mut names = BTreeSet::new();
    for symbol in file.dynamic_symbols() {
        if !symbol.is_global() || !symbol.is_definition() {
            continue;
        }
        let name = symbol.name()?;
        if !name.is_empty() {
            names.insert(name.to_string());
        }
    }
    Ok(names.into_iter().collect())
}

/// Render a version script exporting `symbols`
pub fn render_map(symbols: &[String]) -> String {
    let mut map = format!("{} {{\n  global:\n", VERSION_NODE);
    for symbol in symbols {
        map.push_str("    ");
        map.push_str(symbol);
        map.push_str(";\n");
    }
    map.push_str("  local:\n    *;\n};\n");
    map
}

/// Write the export map of `lib` to `map`; returns the symbol count
pub fn create_map_file(lib: &Path, map: &Path) -> BuildResult<usize> {
    let data = fs::read(lib).map_err(|e| BuildError::io(lib, e))?;
    let symbols = exported_symbols(&data).map_err(|e| BuildError::InvalidArtifact {
        path: lib.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(map, render_map(&symbols)).map_err(|e| BuildError::io(map, e))?;
    log::debug!("wrote {} ({} symbols)", map.display(), symbols.len());
    Ok(symbols.len())
}
