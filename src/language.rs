use camino::Utf8Path;

/// Source language detected from a file extension.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum LangId {
    Rust,
    C,
    Cpp,
    Python,
    Javascript,
    Typescript,
    Go,
    Php,
    Java,
    Kotlin,
    Swift,
    Ruby,
    #[serde(rename = "csharp")]
    CSharp,
}

impl std::fmt::Display for LangId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl LangId {
    pub const ALL: [LangId; 13] = [
        Self::Rust,
        Self::C,
        Self::Cpp,
        Self::Python,
        Self::Javascript,
        Self::Typescript,
        Self::Go,
        Self::Php,
        Self::Java,
        Self::Kotlin,
        Self::Swift,
        Self::Ruby,
        Self::CSharp,
    ];

    /// Detect language from file extension.
    pub fn from_path(path: &Utf8Path) -> Option<Self> {
        let ext = path.extension()?.to_ascii_lowercase();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "rs" => Some(Self::Rust),
            "c" | "h" => Some(Self::C),
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(Self::Cpp),
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::Javascript),
            "ts" | "mts" | "cts" | "tsx" => Some(Self::Typescript),
            "go" => Some(Self::Go),
            "php" => Some(Self::Php),
            "java" => Some(Self::Java),
            "kt" | "kts" => Some(Self::Kotlin),
            "swift" => Some(Self::Swift),
            "rb" => Some(Self::Ruby),
            "cs" => Some(Self::CSharp),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Python => "python",
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Go => "go",
            Self::Php => "php",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::Swift => "swift",
            Self::Ruby => "ruby",
            Self::CSharp => "csharp",
        }
    }

    /// Whether the JS family import/export grammar applies.
    pub fn is_ecmascript(self) -> bool {
        matches!(self, Self::Javascript | Self::Typescript)
    }
}

/// True when `path` has a recognised source extension.
pub fn is_code_file(path: &str) -> bool {
    LangId::from_path(Utf8Path::new(path)).is_some()
}

/// True for files following a test naming or placement convention.
pub fn is_test_file(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    lower.contains(".test.")
        || lower.contains(".spec.")
        || lower.contains("__tests__/")
        || lower.starts_with("test/")
        || lower.starts_with("tests/")
        || lower.contains("/test/")
        || lower.contains("/tests/")
        || (file_name.starts_with("test_") && file_name.ends_with(".py"))
        || file_name.ends_with("_test.go")
}

/// True for dependency manifests, lockfiles and data/config formats.
pub fn is_manifest_or_data(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    matches!(
        file_name,
        "package.json"
            | "package-lock.json"
            | "yarn.lock"
            | "pnpm-lock.yaml"
            | "cargo.toml"
            | "cargo.lock"
            | "go.mod"
            | "go.sum"
            | "requirements.txt"
            | "pyproject.toml"
    ) || [".md", ".json", ".yml", ".yaml", ".toml", ".lock"]
        .iter()
        .any(|ext| file_name.ends_with(ext))
}
