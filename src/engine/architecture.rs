//! Architecture detection from manifest dependency names and well-known
//! file names. Each table is checked in order; the first hit wins.

use std::collections::BTreeMap;

use crate::language::{LangId, is_code_file};
use crate::models::analysis::{ArchitectureInfo, LanguageStats, RepoStructure};
use crate::store::{Manifest, ManifestKind};

const FRAMEWORKS: &[(&str, &str)] = &[
    ("react", "React"),
    ("vue", "Vue.js"),
    ("@angular/core", "Angular"),
    ("svelte", "Svelte"),
    ("next", "Next.js"),
    ("nuxt", "Nuxt.js"),
    ("express", "Express.js"),
    ("fastify", "Fastify"),
    ("axum", "Axum"),
    ("actix-web", "Actix Web"),
];

const TEST_FRAMEWORKS: &[(&str, &str)] = &[
    ("jest", "Jest"),
    ("mocha", "Mocha"),
    ("jasmine", "Jasmine"),
    ("vitest", "Vitest"),
    ("cypress", "Cypress"),
    ("playwright", "Playwright"),
    ("@playwright/test", "Playwright"),
];

const STYLING: &[(&str, &str)] = &[
    ("styled-components", "styled-components"),
    ("@emotion/", "Emotion"),
    ("tailwindcss", "Tailwind CSS"),
    ("sass", "Sass"),
    ("less", "Less"),
];

const STATE_MANAGEMENT: &[(&str, &str)] = &[
    ("redux", "Redux"),
    ("@reduxjs/toolkit", "Redux"),
    ("mobx", "MobX"),
    ("zustand", "Zustand"),
    ("recoil", "Recoil"),
    ("jotai", "Jotai"),
    ("valtio", "Valtio"),
];

const ROUTING: &[(&str, &str)] = &[
    ("react-router-dom", "React Router"),
    ("vue-router", "Vue Router"),
    ("@angular/router", "Angular Router"),
    ("next", "Next.js"),
];

/// Root file name (or `prefix.*` pattern) -> build tool.
const BUILD_TOOLS: &[(&str, &str)] = &[
    ("webpack.config.js", "Webpack"),
    ("vite.config.*", "Vite"),
    ("rollup.config.js", "Rollup"),
    ("gulpfile.js", "Gulp"),
    ("Gruntfile.js", "Grunt"),
    ("tsconfig.json", "TypeScript"),
    ("Cargo.toml", "Cargo"),
];

const PACKAGE_MANAGERS: &[(&str, &str)] = &[
    ("pnpm-lock.yaml", "pnpm"),
    ("yarn.lock", "yarn"),
    ("package-lock.json", "npm"),
    ("Cargo.lock", "cargo"),
];

const ENTRY_POINTS: &[&str] = &[
    "main.rs", "lib.rs", "main.ts", "main.tsx", "main.js", "index.ts", "index.tsx", "index.js",
    "index.jsx", "App.tsx", "App.jsx", "app.ts", "app.js", "server.ts", "server.js",
    "main.py", "app.py", "__main__.py", "manage.py", "main.go",
];

const CONFIG_FILES: &[&str] = &[
    "package.json", "tsconfig.json", "Cargo.toml", "pyproject.toml", "setup.py", "go.mod",
    "Makefile", "Dockerfile", "docker-compose.yml", ".env.example", "babel.config.js",
    ".eslintrc", ".eslintrc.js", ".eslintrc.json", ".prettierrc", "jest.config.js",
    "jest.config.ts",
];

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Dependency names match exactly, or by prefix for entries ending in `/`.
fn lookup<'a>(table: &[(&str, &'a str)], names: &[&str]) -> Option<&'a str> {
    table.iter().find_map(|(needle, label)| {
        names
            .iter()
            .any(|name| {
                if needle.ends_with('/') {
                    name.starts_with(needle)
                } else {
                    name == needle
                }
            })
            .then_some(*label)
    })
}

fn lookup_root_file<'a>(table: &[(&str, &'a str)], files: &[String]) -> Option<&'a str> {
    table.iter().find_map(|(pattern, label)| {
        files
            .iter()
            .filter(|f| !f.contains('/'))
            .any(|f| match pattern.strip_suffix('*') {
                Some(prefix) => f.starts_with(prefix),
                None => f == pattern,
            })
            .then_some(*label)
    })
}

/// Detect the architecture profile.
pub fn detect(files: &[String], manifest: Option<&Manifest>) -> ArchitectureInfo {
    let names: Vec<&str> = manifest.map(|m| m.all_names().collect()).unwrap_or_default();

    let styling = lookup(STYLING, &names).map(str::to_string).or_else(|| {
        let has_ext = |ext: &str| files.iter().any(|f| f.ends_with(ext));
        if has_ext(".scss") {
            Some("SCSS".to_string())
        } else if has_ext(".less") {
            Some("Less".to_string())
        } else if has_ext(".css") {
            Some("CSS".to_string())
        } else {
            None
        }
    });

    let test_framework = lookup(TEST_FRAMEWORKS, &names)
        .or_else(|| match manifest.map(|m| m.kind) {
            Some(ManifestKind::Cargo) => Some("cargo test"),
            _ => None,
        })
        .map(str::to_string);

    ArchitectureInfo {
        framework: lookup(FRAMEWORKS, &names).map(str::to_string),
        build_tool: lookup_root_file(BUILD_TOOLS, files)
            .unwrap_or("Unknown")
            .to_string(),
        package_manager: lookup_root_file(PACKAGE_MANAGERS, files)
            .unwrap_or("npm")
            .to_string(),
        test_framework,
        styling,
        state_management: lookup(STATE_MANAGEMENT, &names).map(str::to_string),
        routing: lookup(ROUTING, &names).map(str::to_string),
    }
}

/// Count newline-terminated lines, plus a trailing partial line.
pub fn count_lines(content: &str) -> usize {
    let bytes = content.as_bytes();
    let newlines = memchr::memchr_iter(b'\n', bytes).count();
    match bytes.last() {
        None => 0,
        Some(b'\n') => newlines,
        Some(_) => newlines + 1,
    }
}

/// Build the structure summary. Line counts cover `contents` only.
pub fn structure(files: &[String], contents: &BTreeMap<String, String>) -> RepoStructure {
    let mut languages: BTreeMap<String, LanguageStats> = BTreeMap::new();
    let mut directories = std::collections::BTreeSet::new();

    for path in files {
        let mut dir = path.as_str();
        while let Some((parent, _)) = dir.rsplit_once('/') {
            directories.insert(parent.to_string());
            dir = parent;
        }
        if !is_code_file(path) {
            continue;
        }
        let Some(lang) = LangId::from_path(camino::Utf8Path::new(path)) else {
            continue;
        };
        let stats = languages.entry(lang.name().to_string()).or_default();
        stats.files += 1;
        if let Some(content) = contents.get(path) {
            stats.lines += count_lines(content);
        }
    }

    // Ties resolve to the alphabetically first language.
    let primary_language = languages
        .iter()
        .max_by(|(a_name, a), (b_name, b)| {
            a.files
                .cmp(&b.files)
                .then(a.lines.cmp(&b.lines))
                .then(b_name.cmp(a_name))
        })
        .map(|(name, _)| name.clone());

    RepoStructure {
        files: files.to_vec(),
        directories: directories.into_iter().collect(),
        languages,
        primary_language,
        entry_points: files
            .iter()
            .filter(|f| ENTRY_POINTS.contains(&file_name(f)))
            .cloned()
            .collect(),
        config_files: files
            .iter()
            .filter(|f| {
                let name = file_name(f);
                CONFIG_FILES.contains(&name) || name.contains(".config.")
            })
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_react_stack() {
        let manifest = Manifest::from_package_json(
            r#"{"dependencies":{"react":"18","react-router-dom":"6","zustand":"4","@emotion/react":"11"},"devDependencies":{"vitest":"1"}}"#,
        )
        .unwrap();
        let info = detect(
            &files(&["vite.config.ts", "pnpm-lock.yaml", "src/App.tsx"]),
            Some(&manifest),
        );
        assert_eq!(info.framework.as_deref(), Some("React"));
        assert_eq!(info.build_tool, "Vite");
        assert_eq!(info.package_manager, "pnpm");
        assert_eq!(info.test_framework.as_deref(), Some("Vitest"));
        assert_eq!(info.styling.as_deref(), Some("Emotion"));
        assert_eq!(info.state_management.as_deref(), Some("Zustand"));
        assert_eq!(info.routing.as_deref(), Some("React Router"));
    }

    #[test]
    fn test_detect_without_manifest() {
        let info = detect(&files(&["src/site.scss", "src/main.ts"]), None);
        assert_eq!(info.framework, None);
        assert_eq!(info.build_tool, "Unknown");
        assert_eq!(info.package_manager, "npm");
        assert_eq!(info.styling.as_deref(), Some("SCSS"));
    }

    #[test]
    fn test_nested_lockfile_is_ignored() {
        let info = detect(&files(&["vendor/yarn.lock"]), None);
        assert_eq!(info.package_manager, "npm");
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines(""), 0);
        assert_eq!(count_lines("a"), 1);
        assert_eq!(count_lines("a\nb\n"), 2);
        assert_eq!(count_lines("a\nb"), 2);
    }

    #[test]
    fn test_structure_histogram() {
        let list = files(&["src/index.ts", "src/auth/login.ts", "scripts/build.py", "package.json"]);
        let mut contents = BTreeMap::new();
        contents.insert("src/index.ts".to_string(), "a\nb\n".to_string());
        let s = structure(&list, &contents);
        assert_eq!(s.languages["typescript"].files, 2);
        assert_eq!(s.languages["typescript"].lines, 2);
        assert_eq!(s.primary_language.as_deref(), Some("typescript"));
        assert_eq!(s.directories, vec!["scripts", "src", "src/auth"]);
        assert_eq!(s.entry_points, vec!["src/index.ts"]);
        assert_eq!(s.config_files, vec!["package.json"]);
    }
}
