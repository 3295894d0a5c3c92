//! Search index over per-file scans.

use std::collections::BTreeMap;

use super::scan::FileScan;
use crate::models::analysis::{FileIndexEntry, SearchIndex};

fn add(map: &mut BTreeMap<String, Vec<String>>, key: &str, path: &str) {
    let files = map.entry(key.to_string()).or_default();
    if !files.iter().any(|f| f == path) {
        files.push(path.to_string());
    }
}

/// Build the forward (file -> symbols) and inverse (symbol -> files,
/// keyword -> files) maps.
pub fn build(scans: &BTreeMap<String, FileScan>) -> SearchIndex {
    let mut index = SearchIndex::default();
    for (path, scan) in scans {
        for name in &scan.functions {
            add(&mut index.functions, name, path);
        }
        for name in &scan.classes {
            add(&mut index.classes, name, path);
        }
        for name in &scan.components {
            add(&mut index.components, name, path);
        }
        for word in &scan.keywords {
            add(&mut index.keywords, word, path);
        }
        index.files.insert(
            path.clone(),
            FileIndexEntry {
                language: scan.language.map(|l| l.name().to_string()),
                functions: scan.functions.clone(),
                classes: scan.classes.clone(),
                components: scan.components.clone(),
                imports: scan.imports.clone(),
                exports: scan.exports.clone(),
                keywords: scan.keywords.clone(),
            },
        );
    }
    index
}

/// One line per file, `path: symbols | keywords`, for prompts.
pub fn summary(index: &SearchIndex, max_files: usize) -> String {
    index
        .files
        .iter()
        .take(max_files)
        .map(|(path, entry)| {
            let symbols: Vec<&str> = entry.symbols().take(12).collect();
            let keywords: Vec<&str> = entry.keywords.iter().take(8).map(String::as_str).collect();
            format!("{path}: {} | {}", symbols.join(", "), keywords.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scan::scan_all;

    #[test]
    fn test_build_inverse_maps() {
        let scans = scan_all(&[
            (
                "src/auth/login.ts".to_string(),
                "export function login() {}\nexport function logout() {}\n".to_string(),
            ),
            (
                "src/auth/session.ts".to_string(),
                "export class Session {}\nexport function login() {}\n".to_string(),
            ),
        ]);
        let index = build(&scans);
        assert_eq!(
            index.functions["login"],
            vec!["src/auth/login.ts", "src/auth/session.ts"]
        );
        assert_eq!(index.classes["Session"], vec!["src/auth/session.ts"]);
        assert!(index.keywords["auth"].len() == 2);
        assert_eq!(index.files["src/auth/login.ts"].language.as_deref(), Some("typescript"));

        let text = summary(&index, 1);
        assert!(text.starts_with("src/auth/login.ts: login, logout"));
        assert_eq!(text.lines().count(), 1);
    }
}
