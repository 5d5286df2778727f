//! Command construction.
//!
//! The argument vector is always built as discrete arguments and handed to the
//! OS directly; nothing is ever interpreted by a shell.
//!
//! The tool runs inside its workspace, so relative paths (a program path with a
//! separator, path-valued options, the reference) are made absolute against the
//! caller's working directory at build time.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{SandboxError, SandboxResult};
use crate::staging::StagedInput;

/// Value of a valued option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionValue {
    Literal(OsString),
    /// A file path, made absolute when the command is built.
    Path(PathBuf),
    /// The resolved reference file of the invocation.
    Reference,
}

/// One optional argument, emitted in template order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOption {
    Switch(String),
    Valued { flag: String, value: OptionValue },
}

impl ToolOption {
    pub fn switch(flag: impl Into<String>) -> Self {
        ToolOption::Switch(flag.into())
    }

    pub fn literal(flag: impl Into<String>, value: impl Into<OsString>) -> Self {
        ToolOption::Valued {
            flag: flag.into(),
            value: OptionValue::Literal(value.into()),
        }
    }

    pub fn path(flag: impl Into<String>, value: impl Into<PathBuf>) -> Self {
        ToolOption::Valued {
            flag: flag.into(),
            value: OptionValue::Path(value.into()),
        }
    }

    pub fn reference(flag: impl Into<String>) -> Self {
        ToolOption::Valued {
            flag: flag.into(),
            value: OptionValue::Reference,
        }
    }

    fn needs_reference(&self) -> bool {
        matches!(
            self,
            ToolOption::Valued {
                value: OptionValue::Reference,
                ..
            }
        )
    }
}

/// Shape of a tool invocation:
/// `program <output_flag> <output_prefix> [options...] [staged inputs...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    pub output_flag: String,
    pub output_prefix: String,
    pub options: Vec<ToolOption>,
}

impl CommandTemplate {
    pub fn new(
        program: impl Into<String>,
        output_flag: impl Into<String>,
        output_prefix: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            output_flag: output_flag.into(),
            output_prefix: output_prefix.into(),
            options: Vec::new(),
        }
    }

    pub fn option(mut self, option: ToolOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn requires_reference(&self) -> bool {
        self.options.iter().any(ToolOption::needs_reference)
    }
}

/// A fully resolved argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl CommandLine {
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// Rendering for logs only.
impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'') {
                write!(f, " '{}'", arg.replace('\'', r"'\''"))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Build the argument vector for a template.
pub fn build(
    template: &CommandTemplate,
    reference: Option<&Path>,
    staged: &[StagedInput],
) -> SandboxResult<CommandLine> {
    if template.program.trim().is_empty() {
        return Err(SandboxError::configuration("tool program must not be empty"));
    }

    let mut args: Vec<OsString> = vec![
        template.output_flag.clone().into(),
        template.output_prefix.clone().into(),
    ];

    for option in &template.options {
        match option {
            ToolOption::Switch(flag) => args.push(flag.into()),
            ToolOption::Valued { flag, value } => {
                args.push(flag.into());
                match value {
                    OptionValue::Literal(v) => args.push(v.clone()),
                    OptionValue::Path(p) => args.push(absolute(p)?.into_os_string()),
                    OptionValue::Reference => {
                        let path = reference.ok_or_else(|| {
                            SandboxError::configuration(format!(
                                "option {flag} needs a reference file but none was resolved"
                            ))
                        })?;
                        args.push(absolute(path)?.into_os_string());
                    }
                }
            }
        }
    }

    args.extend(staged.iter().map(|input| input.path.clone().into_os_string()));

    Ok(CommandLine {
        program: program_path(&template.program)?,
        args,
    })
}

/// Bare names are left for `PATH` lookup; anything with a separator is a path.
fn program_path(program: &str) -> SandboxResult<OsString> {
    let path = Path::new(program);
    if path.components().count() > 1 {
        Ok(absolute(path)?.into_os_string())
    } else {
        Ok(OsStr::new(program).to_owned())
    }
}

fn absolute(path: &Path) -> SandboxResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        SandboxError::configuration(format!(
            "cannot resolve {} against the working directory: {e}",
            path.display()
        ))
    })?;
    Ok(cwd.join(path))
}
