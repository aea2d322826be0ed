//! Structural tests for the layering rules.
//!
//! These scan `src/` so a stray import fails the build's tests rather than
//! a code review.

use std::path::{Path, PathBuf};

fn src() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("src")
}

/// Collect all `.rs` files under a directory recursively.
fn collect_rs_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                files.extend(collect_rs_files(&path));
            } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
                files.push(path);
            }
        }
    }
    files
}

/// Track brace depth and report whether a line sits inside a
/// `#[cfg(test)]` block.
#[derive(Default)]
struct CfgTestTracker {
    in_test_block: bool,
    brace_depth: i32,
    test_block_start_depth: i32,
}

impl CfgTestTracker {
    fn process_line(&mut self, line: &str) -> bool {
        if line.trim().contains("#[cfg(test)]") {
            self.in_test_block = true;
            self.test_block_start_depth = self.brace_depth;
        }
        for ch in line.chars() {
            match ch {
                '{' => self.brace_depth += 1,
                '}' => {
                    self.brace_depth -= 1;
                    if self.in_test_block && self.brace_depth <= self.test_block_start_depth {
                        self.in_test_block = false;
                    }
                }
                _ => {}
            }
        }
        self.in_test_block
    }
}

/// Production lines of every file under `dir` matching `forbidden`, as
/// `path:line: text`. Comments and `#[cfg(test)]` blocks are skipped.
fn violations(dir: &Path, forbidden: impl Fn(&str) -> bool) -> Vec<String> {
    let mut found = Vec::new();
    for file in collect_rs_files(dir) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        let rel = file
            .strip_prefix(env!("CARGO_MANIFEST_DIR"))
            .unwrap_or(&file)
            .display()
            .to_string()
            .replace('\\', "/");
        let mut tracker = CfgTestTracker::default();
        for (i, line) in content.lines().enumerate() {
            let in_test = tracker.process_line(line);
            let trimmed = line.trim();
            if in_test || trimmed.starts_with("//") || trimmed.starts_with('*') {
                continue;
            }
            if forbidden(line) {
                found.push(format!("{rel}:{}: {trimmed}", i + 1));
            }
        }
    }
    found
}

#[test]
fn domain_is_pure() {
    let found = violations(&src().join("domain"), |line| {
        [
            "crate::infra",
            "crate::application",
            "crate::commands",
            "crate::output",
            "tokio::",
            "std::fs",
            "std::process",
            "std::net",
        ]
        .iter()
        .any(|f| line.contains(f))
    });
    assert!(
        found.is_empty(),
        "domain/ must not perform I/O or depend on outer layers:\n{}",
        found.join("\n")
    );
}

#[test]
fn application_depends_only_on_domain_and_ports() {
    let found = violations(&src().join("application"), |line| {
        ["crate::infra", "crate::commands", "crate::output", "crate::app::"]
            .iter()
            .any(|f| line.contains(f))
    });
    assert!(
        found.is_empty(),
        "application/ must not import infra, commands, or output:\n{}",
        found.join("\n")
    );
}

#[test]
fn infra_has_no_imports_from_commands_or_output() {
    let found = violations(&src().join("infra"), |line| {
        line.contains("crate::commands") || line.contains("crate::output")
    });
    assert!(
        found.is_empty(),
        "infra/ must not import from commands/ or output/:\n{}",
        found.join("\n")
    );
}

#[test]
fn infra_has_no_print_macros_outside_tests() {
    let found = violations(&src().join("infra"), |line| {
        line.contains("println!") || line.contains("eprintln!")
    });
    assert!(
        found.is_empty(),
        "infra/ must not use println!/eprintln! outside #[cfg(test)]:\n{}",
        found.join("\n")
    );
}

#[test]
fn no_tokio_command_runner_new_outside_infra() {
    let found: Vec<String> = violations(&src(), |line| line.contains("TokioCommandRunner::new"))
        .into_iter()
        .filter(|v| !v.contains("src/infra/") && !v.starts_with("src/app.rs"))
        .collect();
    assert!(
        found.is_empty(),
        "TokioCommandRunner is wired once, in AppContext:\n{}",
        found.join("\n")
    );
}

#[test]
fn services_take_ports_not_infra_types() {
    let concrete = [
        "SshTransport",
        "JsonInstanceRepository",
        "FileSecretsStore",
        "HttpKnowledgeSearch",
        "RemoteRepairAgent",
        "TelegramNotifier",
        "TokioCommandRunner",
    ];
    let found = violations(&src().join("application").join("services"), |line| {
        concrete.iter().any(|c| line.contains(c))
    });
    assert!(
        found.is_empty(),
        "services must be generic over port traits:\n{}",
        found.join("\n")
    );
}

#[test]
fn command_handlers_accept_app_context() {
    let mut missing = Vec::new();
    for file in collect_rs_files(&src().join("commands")) {
        let Ok(content) = std::fs::read_to_string(&file) else {
            continue;
        };
        if content.contains("pub async fn run(") && !content.contains("app: &AppContext") {
            missing.push(file.display().to_string());
        }
    }
    assert!(
        missing.is_empty(),
        "async command handlers must receive &AppContext:\n{}",
        missing.join("\n")
    );
}

#[test]
fn remote_scripts_are_built_in_domain_only() {
    let found = violations(&src(), |line| {
        line.contains("---CHECK---") || line.contains("---RESULT---")
    });
    assert!(
        found.is_empty(),
        "wire delimiters belong in hatchery-common constants:\n{}",
        found.join("\n")
    );
}
