//! Regex-level source scanning.
//!
//! Imports, exports and symbol definitions are recovered line by line with
//! per-language patterns. Nothing is parsed into a syntax tree, so nested or
//! unusual constructs may be missed.

use camino::Utf8Path;
use rayon::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::language::LangId;
use crate::models::analysis::{DependencyMap, ExternalDependency};
use crate::store::Manifest;

/// Symbols and references recovered from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileScan {
    pub language: Option<LangId>,
    /// Raw import specifiers, in source order, deduplicated.
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub components: Vec<String>,
    pub keywords: Vec<String>,
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("static regex"));
    };
}

// ----- ECMAScript -----
pattern!(ES_IMPORT_FROM, r#"^\s*(?:import|export)\b[^'"]*?\bfrom\s+['"]([^'"]+)['"]"#);
pattern!(ES_IMPORT_BARE, r#"^\s*import\s+['"]([^'"]+)['"]"#);
pattern!(ES_REQUIRE, r#"\b(?:require|import)\(\s*['"]([^'"]+)['"]\s*\)"#);
pattern!(
    ES_EXPORT_DECL,
    r"^\s*export\s+(?:default\s+)?(?:declare\s+)?(?:async\s+)?(?:function\*?|class|const|let|var|interface|type|enum|abstract\s+class)\s+([A-Za-z_$][\w$]*)"
);
pattern!(ES_EXPORT_LIST, r"^\s*export\s*\{([^}]*)\}");
pattern!(ES_EXPORT_DEFAULT_NAME, r"^\s*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$");
pattern!(ES_FUNCTION, r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\*?\s+([A-Za-z_$][\w$]*)");
pattern!(
    ES_ARROW,
    r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=>"
);
pattern!(ES_CLASS, r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)");

// ----- Python -----
pattern!(PY_IMPORT, r"^\s*import\s+([\w.]+)");
pattern!(PY_FROM, r"^\s*from\s+([\w.]+)\s+import\b");
pattern!(PY_DEF, r"^(?:async\s+)?def\s+([A-Za-z_]\w*)");
pattern!(PY_CLASS, r"^class\s+([A-Za-z_]\w*)");

// ----- Rust -----
pattern!(RS_USE, r"^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([\w:]+)");
pattern!(RS_MOD, r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_]\w*)\s*;");
pattern!(RS_FN, r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_]\w*)");
pattern!(RS_TYPE, r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+([A-Za-z_]\w*)");
pattern!(RS_PUB, r"^\s*pub\s+(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:fn|struct|enum|trait|type|const|static|mod)\s+([A-Za-z_]\w*)");

// ----- Go -----
pattern!(GO_IMPORT_ONE, r#"^\s*import\s+(?:\w+\s+)?"([^"]+)""#);
pattern!(GO_IMPORT_LINE, r#"^\s*(?:\w+\s+)?"([^"]+)"\s*$"#);
pattern!(GO_FUNC, r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_]\w*)");
pattern!(GO_TYPE, r"^type\s+([A-Za-z_]\w*)\s+(?:struct|interface)\b");

// ----- JVM / C# / PHP / Ruby / Swift / C family -----
pattern!(JVM_IMPORT, r"^\s*(?:import|using)\s+(?:static\s+)?([\w.]+)\s*;?");
pattern!(PHP_USE, r"^\s*use\s+([\w\\]+)\s*;");
pattern!(RB_REQUIRE, r#"^\s*require(?:_relative)?\s+['"]([^'"]+)['"]"#);
pattern!(C_INCLUDE, r#"^\s*#\s*include\s+[<"]([^>"]+)[>"]"#);
pattern!(
    GENERIC_CLASS,
    r"^\s*(?:public\s+|private\s+|protected\s+|internal\s+|open\s+|final\s+|abstract\s+|sealed\s+|data\s+|static\s+|partial\s+)*(?:class|interface|struct|enum|object|protocol)\s+([A-Za-z_]\w*)"
);
pattern!(
    GENERIC_FN,
    r"^\s*(?:public\s+|private\s+|protected\s+|internal\s+|static\s+|override\s+|suspend\s+)*(?:fun|func|def|function)\s+([A-Za-z_]\w*)"
);

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "after", "before", "when", "from", "that", "this", "into",
    "not", "are", "was", "were", "has", "have", "but", "all", "any", "can", "should", "would",
    "could", "does", "did", "its", "our", "your", "their", "then", "than", "there", "which",
    "while", "where", "what", "who", "how", "why", "also", "only", "some", "add", "new",
    "src", "lib", "index", "mod", "main",
];

/// Query tokens: lowercase, split on non-alphanumerics, at least three
/// characters, stop words removed. Order of first occurrence is kept.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3 && !STOP_WORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Split an identifier or path on case changes and separators, then
/// [`tokenize`] the words.
pub fn identifier_words(ident: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(ident.len() + 8);
    let mut prev: Option<char> = None;
    for c in ident.chars() {
        if let Some(p) = prev
            && c.is_uppercase()
            && (p.is_lowercase() || p.is_ascii_digit())
        {
            spaced.push(' ');
        }
        spaced.push(c);
        prev = Some(c);
    }
    tokenize(&spaced)
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

fn is_component_file(path: &str) -> bool {
    path.ends_with(".tsx") || path.ends_with(".jsx") || path.ends_with(".vue") || path.ends_with(".svelte")
}

fn starts_upper(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Scan one file.
pub fn scan_source(path: &str, content: &str) -> FileScan {
    let language = LangId::from_path(Utf8Path::new(path));
    let mut scan = FileScan {
        language,
        ..FileScan::default()
    };
    let component_file = is_component_file(path);
    let mut in_go_import_block = false;

    for line in content.lines() {
        match language {
            Some(lang) if lang.is_ecmascript() => {
                for re in [&*ES_IMPORT_FROM, &*ES_IMPORT_BARE] {
                    if let Some(c) = re.captures(line) {
                        push_unique(&mut scan.imports, &c[1]);
                    }
                }
                for c in ES_REQUIRE.captures_iter(line) {
                    push_unique(&mut scan.imports, &c[1]);
                }
                if let Some(c) = ES_EXPORT_DECL.captures(line) {
                    push_unique(&mut scan.exports, &c[1]);
                } else if let Some(c) = ES_EXPORT_DEFAULT_NAME.captures(line) {
                    push_unique(&mut scan.exports, &c[1]);
                } else if let Some(c) = ES_EXPORT_LIST.captures(line) {
                    for item in c[1].split(',') {
                        // `a as b` exports `b`
                        let name = item.rsplit(" as ").next().unwrap_or(item).trim();
                        if !name.is_empty() && name != "type" {
                            push_unique(&mut scan.exports, name.trim_start_matches("type "));
                        }
                    }
                }
                let function = ES_FUNCTION
                    .captures(line)
                    .or_else(|| ES_ARROW.captures(line))
                    .map(|c| c[1].to_string());
                if let Some(name) = function {
                    if component_file && starts_upper(&name) {
                        push_unique(&mut scan.components, &name);
                    } else {
                        push_unique(&mut scan.functions, &name);
                    }
                }
                if let Some(c) = ES_CLASS.captures(line) {
                    push_unique(&mut scan.classes, &c[1]);
                }
            }
            Some(LangId::Python) => {
                for re in [&*PY_IMPORT, &*PY_FROM] {
                    if let Some(c) = re.captures(line) {
                        push_unique(&mut scan.imports, &c[1]);
                    }
                }
                if let Some(c) = PY_DEF.captures(line) {
                    push_unique(&mut scan.functions, &c[1]);
                    if !c[1].starts_with('_') {
                        push_unique(&mut scan.exports, &c[1]);
                    }
                }
                if let Some(c) = PY_CLASS.captures(line) {
                    push_unique(&mut scan.classes, &c[1]);
                    push_unique(&mut scan.exports, &c[1]);
                }
            }
            Some(LangId::Rust) => {
                if let Some(c) = RS_USE.captures(line) {
                    push_unique(&mut scan.imports, c[1].trim_end_matches("::"));
                }
                if let Some(c) = RS_MOD.captures(line) {
                    push_unique(&mut scan.imports, &format!("self::{}", &c[1]));
                }
                if let Some(c) = RS_FN.captures(line) {
                    push_unique(&mut scan.functions, &c[1]);
                }
                if let Some(c) = RS_TYPE.captures(line) {
                    push_unique(&mut scan.classes, &c[1]);
                }
                if let Some(c) = RS_PUB.captures(line) {
                    push_unique(&mut scan.exports, &c[1]);
                }
            }
            Some(LangId::Go) => {
                let trimmed = line.trim();
                if in_go_import_block {
                    if trimmed.starts_with(')') {
                        in_go_import_block = false;
                    } else if let Some(c) = GO_IMPORT_LINE.captures(line) {
                        push_unique(&mut scan.imports, &c[1]);
                    }
                } else if trimmed.starts_with("import (") {
                    in_go_import_block = true;
                } else if let Some(c) = GO_IMPORT_ONE.captures(line) {
                    push_unique(&mut scan.imports, &c[1]);
                }
                if let Some(c) = GO_FUNC.captures(line) {
                    push_unique(&mut scan.functions, &c[1]);
                    if starts_upper(&c[1]) {
                        push_unique(&mut scan.exports, &c[1]);
                    }
                }
                if let Some(c) = GO_TYPE.captures(line) {
                    push_unique(&mut scan.classes, &c[1]);
                    if starts_upper(&c[1]) {
                        push_unique(&mut scan.exports, &c[1]);
                    }
                }
            }
            Some(lang) => {
                let import = match lang {
                    LangId::Php => PHP_USE.captures(line),
                    LangId::Ruby => RB_REQUIRE.captures(line),
                    LangId::C | LangId::Cpp => C_INCLUDE.captures(line),
                    _ => JVM_IMPORT.captures(line),
                };
                if let Some(c) = import {
                    push_unique(&mut scan.imports, &c[1]);
                }
                if let Some(c) = GENERIC_CLASS.captures(line) {
                    push_unique(&mut scan.classes, &c[1]);
                    push_unique(&mut scan.exports, &c[1]);
                }
                if let Some(c) = GENERIC_FN.captures(line) {
                    push_unique(&mut scan.functions, &c[1]);
                }
            }
            None => {}
        }
    }

    let mut keywords = BTreeSet::new();
    keywords.extend(identifier_words(path));
    for name in scan
        .functions
        .iter()
        .chain(&scan.classes)
        .chain(&scan.components)
    {
        keywords.extend(identifier_words(name));
    }
    scan.keywords = keywords.into_iter().collect();
    scan
}

/// Scan many files in parallel. Output is keyed by path.
pub fn scan_all(files: &[(String, String)]) -> BTreeMap<String, FileScan> {
    files
        .par_iter()
        .map(|(path, content)| (path.clone(), scan_source(path, content)))
        .collect()
}

// ---------------------------------------------------------------------------
// Specifier resolution
// ---------------------------------------------------------------------------

const RESOLVE_SUFFIXES: &[&str] = &[
    "", ".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".vue", ".py", ".rs", ".go",
    "/index.ts", "/index.tsx", "/index.js", "/index.jsx", "/__init__.py", "/mod.rs",
];

/// Lexically normalize `a/./b/../c` to `a/c`. Escaping the root yields `None`.
fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            p => parts.push(p),
        }
    }
    Some(parts.join("/"))
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        rel.to_string()
    } else {
        format!("{dir}/{rel}")
    }
}

fn lookup_candidate(base: &str, files: &BTreeSet<&str>) -> Option<String> {
    RESOLVE_SUFFIXES
        .iter()
        .map(|suffix| format!("{base}{suffix}"))
        .find(|candidate| files.contains(candidate.as_str()))
}

/// Resolve an import specifier of `from` to a repository file, if it names one.
pub fn resolve_specifier(from: &str, specifier: &str, files: &BTreeSet<&str>) -> Option<String> {
    let dir = parent_dir(from);
    let lang = LangId::from_path(Utf8Path::new(from));

    if specifier.starts_with("./") || specifier.starts_with("../") {
        return lookup_candidate(&normalize(&join(dir, specifier))?, files);
    }
    if let Some(rest) = specifier.strip_prefix("@/").or_else(|| specifier.strip_prefix("~/")) {
        return lookup_candidate(&format!("src/{rest}"), files);
    }

    match lang {
        Some(LangId::Python) => {
            let dots = specifier.chars().take_while(|&c| c == '.').count();
            let module = specifier[dots..].replace('.', "/");
            if dots > 0 {
                let mut base = dir.to_string();
                for _ in 1..dots {
                    base = parent_dir(&base).to_string();
                }
                lookup_candidate(&join(&base, &module), files)
            } else {
                lookup_candidate(&module, files).or_else(|| lookup_candidate(&join(dir, &module), files))
            }
        }
        Some(LangId::Rust) => {
            let mut segments = specifier.split("::");
            let head = segments.next()?;
            let rest: Vec<&str> = segments.collect();
            let base = match head {
                "crate" => "src".to_string(),
                "self" => match from.rsplit('/').next() {
                    Some("mod.rs" | "lib.rs" | "main.rs") => dir.to_string(),
                    _ => from.trim_end_matches(".rs").to_string(),
                },
                "super" => parent_dir(dir).to_string(),
                _ => return None,
            };
            // Longest module prefix that names a file wins.
            (1..=rest.len())
                .rev()
                .find_map(|n| lookup_candidate(&join(&base, &rest[..n].join("/")), files))
        }
        Some(LangId::Go | LangId::Java | LangId::Kotlin | LangId::CSharp) => {
            let as_path = specifier.replace('.', "/");
            files
                .iter()
                .find(|f| parent_dir(f).ends_with(&as_path) || f.starts_with(&format!("{as_path}.")))
                .map(|f| f.to_string())
        }
        Some(LangId::C | LangId::Cpp) => {
            lookup_candidate(&join(dir, specifier), files).or_else(|| lookup_candidate(specifier, files))
        }
        _ => None,
    }
}

/// Top-level package name of a bare ECMAScript specifier (`@scope/pkg/x` → `@scope/pkg`).
fn package_name(specifier: &str) -> Option<&str> {
    if specifier.starts_with('.') || specifier.starts_with('/') {
        return None;
    }
    let mut parts = specifier.splitn(3, '/');
    let first = parts.next()?;
    if first.starts_with('@') {
        let second = parts.next()?;
        Some(&specifier[..first.len() + 1 + second.len()])
    } else {
        Some(first)
    }
}

/// Assemble the dependency map from per-file scans and the manifest.
pub fn dependency_map(
    scans: &BTreeMap<String, FileScan>,
    files: &[String],
    manifest: Option<&Manifest>,
) -> DependencyMap {
    let file_set: BTreeSet<&str> = files.iter().map(String::as_str).collect();
    let mut deps = DependencyMap::default();

    for (path, scan) in scans {
        if !scan.imports.is_empty() {
            deps.imports.insert(path.clone(), scan.imports.clone());
        }
        if !scan.exports.is_empty() {
            deps.exports.insert(path.clone(), scan.exports.clone());
        }
        let mut internal: Vec<String> = scan
            .imports
            .iter()
            .filter_map(|spec| resolve_specifier(path, spec, &file_set))
            .filter(|target| target != path)
            .collect();
        internal.sort();
        internal.dedup();
        if !internal.is_empty() {
            deps.internal.insert(path.clone(), internal);
        }
        for name in scan
            .functions
            .iter()
            .chain(&scan.classes)
            .chain(&scan.components)
        {
            deps.symbols
                .entry(name.clone())
                .or_insert_with(|| path.clone());
        }
    }

    match manifest {
        Some(manifest) => {
            for (name, version) in &manifest.dependencies {
                deps.external.push(ExternalDependency {
                    name: name.clone(),
                    version: version.clone(),
                    dev: false,
                });
            }
            for (name, version) in &manifest.dev_dependencies {
                deps.external.push(ExternalDependency {
                    name: name.clone(),
                    version: version.clone(),
                    dev: true,
                });
            }
        }
        // Without a manifest, bare ECMAScript specifiers still name packages.
        None => {
            let mut seen = BTreeSet::new();
            for scan in scans.values().filter(|s| s.language.is_some_and(LangId::is_ecmascript)) {
                for name in scan.imports.iter().filter_map(|s| package_name(s)) {
                    if !name.starts_with("@/") && seen.insert(name.to_string()) {
                        deps.external.push(ExternalDependency {
                            name: name.to_string(),
                            version: "*".to_string(),
                            dev: false,
                        });
                    }
                }
            }
        }
    }
    deps
}
