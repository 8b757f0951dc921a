use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::ToolchainConfig;
use crate::types::ExecutionError;

/// Class name used when no `public class` declaration is found.
const DEFAULT_JAVA_CLASS: &str = "Main";

#[allow(clippy::expect_used)] // literal patterns, exercised by the tests below
fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

static JAVA_COMMENT: LazyLock<Regex> = LazyLock::new(|| regex(r"(?s)/\*.*?\*/|//[^\n]*"));
static JAVA_PUBLIC_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    regex(r"\bpublic\s+(?:(?:final|abstract|strictfp)\s+)*class\s+([A-Za-z_$][A-Za-z0-9_$]*)")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    Python,
    Cpp,
    Java,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::JavaScript,
        Language::Python,
        Language::Cpp,
        Language::Java,
    ];

    /// Tag used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Cpp => "cpp",
            Self::Java => "java",
        }
    }

    /// Lay out the artifacts and commands for one execution.
    ///
    /// `workspace` is the sandbox's working directory; every step runs with it
    /// as the current directory.
    pub fn plan(self, source: &str, workspace: &Path, toolchains: &ToolchainConfig) -> Plan {
        match self {
            Self::JavaScript => Plan {
                source_file: "code.js".into(),
                build: None,
                run: Step::new(&toolchains.node, ["code.js"]),
            },
            Self::Python => Plan {
                source_file: "code.py".into(),
                build: None,
                run: Step::new(&toolchains.python, ["code.py"]),
            },
            Self::Cpp => Plan {
                source_file: "code.cpp".into(),
                build: Some(Step::new(
                    &toolchains.cxx,
                    ["-std=c++17", "-O2", "-pipe", "-o", "code", "code.cpp"],
                )),
                run: Step::new(&workspace.join("code").to_string_lossy(), []),
            },
            Self::Java => {
                let class_name = java_class_name(source);
                let source_file = format!("{class_name}.java");
                let classpath = workspace.to_string_lossy();
                Plan {
                    build: Some(Step::new(
                        &toolchains.javac,
                        ["-encoding", "UTF-8", source_file.as_str()],
                    )),
                    run: Step::new(
                        &toolchains.java,
                        ["-cp", classpath.as_ref(), class_name.as_str()],
                    ),
                    source_file,
                }
            }
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|language| language.as_str() == s)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(s.to_string()))
    }
}

/// One program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    pub args: Vec<String>,
}

impl Step {
    fn new<'a>(program: &str, args: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// File name the source is written to inside the workspace.
    pub source_file: String,
    /// Compile step; `None` for interpreted languages.
    pub build: Option<Step>,
    pub run: Step,
}

/// Best-effort extraction of the public class name from Java source.
///
/// `javac` requires a public class to live in a file of the same name. Comments
/// are ignored, but string literals are not parsed, so unusual sources can
/// still pick the wrong name; the resulting `javac` error is reported as a
/// compile error.
pub fn java_class_name(source: &str) -> String {
    let stripped = JAVA_COMMENT.replace_all(source, " ");
    JAVA_PUBLIC_CLASS
        .captures(&stripped)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_JAVA_CLASS.to_string())
}
