//! Startup script templates.
//!
//! A template is an executable script whose first line names an absolute
//! interpreter. Every occurrence of [`CLUSTER_PLACEHOLDER`] is replaced with
//! the cluster name, quoted as a single shell word, when the script is
//! rendered for a run. Place the placeholder where a shell word is expected;
//! a quoted word inside a comment is not protected by the quoting.

use std::borrow::Cow;
use std::io;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use shell_escape::unix::escape;
use thiserror::Error;

/// Label the startup script is stored under unless configured otherwise.
pub const DEFAULT_STARTUP_SCRIPT_LABEL: &str = "linode-demo";

/// Token replaced with the quoted cluster name on render.
pub const CLUSTER_PLACEHOLDER: &str = "@CLUSTER_NAME@";

const BUILTIN_TEMPLATE: &str = "#!/bin/bash\n\
                                # pelican bootstrap\n\
                                export CLUSTER_NAME=@CLUSTER_NAME@\n\
                                apt-get update\n";

/// Errors raised while loading a startup script template.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum StartupScriptError {
    /// Raised when the template is empty or only whitespace.
    #[error("startup script must not be empty")]
    Empty,
    /// Raised when the first line is not an interpreter line.
    #[error("startup script must start with '#!', found '{first_line}'")]
    MissingInterpreter {
        /// First line of the template.
        first_line: String,
    },
    /// Raised when the interpreter line names a relative path.
    #[error("startup script interpreter '{interpreter}' must be an absolute path")]
    RelativeInterpreter {
        /// Interpreter named on the first line.
        interpreter: String,
    },
    /// Raised when the template file cannot be read.
    #[error("failed to read startup script `{path}`: {message}")]
    Unreadable {
        /// Path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Validated startup script body with an optional cluster placeholder.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptTemplate {
    body: String,
}

impl Default for ScriptTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ScriptTemplate {
    /// Returns the bootstrap script used when none is configured. It exports
    /// the cluster name and refreshes the package index.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            body: BUILTIN_TEMPLATE.to_owned(),
        }
    }

    /// Validates `body` as a template.
    ///
    /// # Errors
    ///
    /// Returns [`StartupScriptError`] when the body is blank or its first
    /// line does not name an absolute interpreter.
    pub fn parse(body: impl Into<String>) -> Result<Self, StartupScriptError> {
        let body = body.into();
        interpreter_of(&body)?;
        Ok(Self { body })
    }

    /// Reads and validates a template file.
    ///
    /// # Errors
    ///
    /// Returns [`StartupScriptError::Unreadable`] when the file cannot be
    /// read, otherwise the errors of [`ScriptTemplate::parse`].
    pub fn read(path: &Utf8Path) -> Result<Self, StartupScriptError> {
        let body = read_file(path).map_err(|err| StartupScriptError::Unreadable {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        Self::parse(body)
    }

    /// Returns the interpreter named on the first line.
    #[must_use]
    pub fn interpreter(&self) -> &str {
        interpreter_of(&self.body).unwrap_or_default()
    }

    /// Returns the unrendered template.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Substitutes the quoted cluster name for every placeholder.
    #[must_use]
    pub fn render(&self, cluster: &str) -> String {
        let quoted = escape(Cow::Borrowed(cluster));
        self.body.replace(CLUSTER_PLACEHOLDER, &quoted)
    }
}

/// Describes the script when it is first registered.
#[must_use]
pub fn script_description(cluster: &str) -> String {
    format!("Startup script for cluster {cluster}")
}

fn interpreter_of(body: &str) -> Result<&str, StartupScriptError> {
    if body.trim().is_empty() {
        return Err(StartupScriptError::Empty);
    }
    let first_line = body.lines().next().unwrap_or_default();
    let Some(command) = first_line.strip_prefix("#!") else {
        return Err(StartupScriptError::MissingInterpreter {
            first_line: first_line.to_owned(),
        });
    };
    let interpreter = command.split_whitespace().next().unwrap_or_default();
    if !interpreter.starts_with('/') {
        return Err(StartupScriptError::RelativeInterpreter {
            interpreter: interpreter.to_owned(),
        });
    }
    Ok(interpreter)
}

fn read_file(path: &Utf8Path) -> io::Result<String> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path names no file"))?;
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    Dir::open_ambient_dir(parent, ambient_authority())?.read_to_string(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;
    use tempfile::TempDir;

    fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .unwrap_or_else(|path| panic!("temp dir should be utf8: {}", path.display()))
    }

    #[test]
    fn builtin_template_exports_the_quoted_cluster() {
        let script = ScriptTemplate::builtin().render("c1");
        assert_eq!(
            script,
            "#!/bin/bash\n# pelican bootstrap\nexport CLUSTER_NAME=c1\napt-get update\n"
        );
    }

    #[test]
    fn newline_in_cluster_name_stays_inside_the_quoted_word() {
        let script = ScriptTemplate::builtin().render("c1\ntouch /tmp/pwned");
        assert!(
            script.contains("export CLUSTER_NAME='c1\ntouch /tmp/pwned'\n"),
            "script: {script}"
        );
        assert!(
            script.lines().all(|line| line != "touch /tmp/pwned"),
            "injected command on its own line: {script}"
        );
    }

    #[test]
    fn metacharacters_are_quoted() {
        let script = ScriptTemplate::builtin().render("c1; rm -rf /");
        assert!(script.contains("export CLUSTER_NAME='c1; rm -rf /'\n"));
    }

    #[test]
    fn every_placeholder_is_substituted() {
        let template = ScriptTemplate::parse("#!/bin/sh\necho @CLUSTER_NAME@ @CLUSTER_NAME@\n")
            .unwrap_or_else(|err| panic!("template should parse: {err}"));
        assert_eq!(template.render("web"), "#!/bin/sh\necho web web\n");
        assert!(template.body().contains(CLUSTER_PLACEHOLDER));
        assert_eq!(template.interpreter(), "/bin/sh");
    }

    #[rstest]
    #[case("", StartupScriptError::Empty)]
    #[case(" \n\t", StartupScriptError::Empty)]
    #[case(
        "echo hi\n",
        StartupScriptError::MissingInterpreter { first_line: String::from("echo hi") }
    )]
    #[case(
        " #!/bin/bash\n",
        StartupScriptError::MissingInterpreter { first_line: String::from(" #!/bin/bash") }
    )]
    #[case(
        "#!bash\necho hi\n",
        StartupScriptError::RelativeInterpreter { interpreter: String::from("bash") }
    )]
    fn invalid_templates_are_rejected(#[case] body: &str, #[case] expected: StartupScriptError) {
        assert_eq!(ScriptTemplate::parse(body), Err(expected));
    }

    #[test]
    fn interpreter_arguments_are_allowed() {
        let template = ScriptTemplate::parse("#!/usr/bin/env bash\ntrue\n")
            .unwrap_or_else(|err| panic!("template should parse: {err}"));
        assert_eq!(template.interpreter(), "/usr/bin/env");
    }

    #[test]
    fn template_is_read_from_file() {
        let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = utf8_dir(&dir);
        std::fs::write(root.join("bootstrap.sh"), "#!/bin/bash\necho @CLUSTER_NAME@\n")
            .unwrap_or_else(|err| panic!("write script: {err}"));

        let template = ScriptTemplate::read(&root.join("bootstrap.sh"))
            .unwrap_or_else(|err| panic!("template should load: {err}"));
        assert_eq!(template.render("c1"), "#!/bin/bash\necho c1\n");
    }

    #[test]
    fn file_contents_are_validated() {
        let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = utf8_dir(&dir);
        std::fs::write(root.join("notes.txt"), "apt-get update\n")
            .unwrap_or_else(|err| panic!("write script: {err}"));

        let err = ScriptTemplate::read(&root.join("notes.txt")).expect_err("no interpreter");
        assert!(matches!(err, StartupScriptError::MissingInterpreter { .. }));
    }

    #[test]
    fn missing_file_reports_the_path() {
        let dir = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let path = utf8_dir(&dir).join("absent.sh");
        let err = ScriptTemplate::read(&path).expect_err("file is absent");
        let StartupScriptError::Unreadable { path: ref reported, .. } = err else {
            panic!("expected Unreadable, got {err:?}");
        };
        assert_eq!(reported, path.as_str());
    }
}
