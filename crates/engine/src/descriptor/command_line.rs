//! Structured construction of the per-node job command line.
//!
//! A job command line is a `;`-separated sequence of shell commands. Rather than
//! concatenating strings, each command is an ordered list of typed words:
//! literals are quoted on render, while environment references (`$NAME`,
//! `$NAME/path`) are emitted bare so the container's shell expands them.
//! `mpirun` arguments are grouped into [`MpiArg`] units so toggles such as the
//! fake-data override add or remove exactly one unit.

use std::fmt;

use batchai_util::quote_shell_word;

/// One word of a shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellWord {
    /// Literal text, quoted when it contains shell metacharacters.
    Literal(String),
    /// Expansion of an environment variable: `$NAME`.
    Variable(String),
    /// Variable followed by a literal path: `$NAME/suffix`.
    VariablePath { variable: String, path: String },
}

impl ShellWord {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// `$variable/path`; a leading `/` is added to `path` when missing.
    pub fn variable_path(variable: impl Into<String>, path: impl AsRef<str>) -> Self {
        let path = path.as_ref();
        let path = if path.starts_with('/') { path.to_string() } else { format!("/{path}") };
        Self::VariablePath {
            variable: variable.into(),
            path,
        }
    }

    /// Environment variable this word expands, if any.
    pub fn referenced_variable(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::Variable(name) | Self::VariablePath { variable: name, .. } => Some(name.as_str()),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Literal(text) => quote_shell_word(text).into_owned(),
            Self::Variable(name) => format!("${name}"),
            Self::VariablePath { variable, path } => format!("${variable}{}", quote_shell_word(path)),
        }
    }
}

/// A single shell command: program plus ordered words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    program: String,
    words: Vec<ShellWord>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            words: Vec::new(),
        }
    }

    pub fn word(mut self, word: ShellWord) -> Self {
        self.words.push(word);
        self
    }

    pub fn literal(self, text: impl Into<String>) -> Self {
        self.word(ShellWord::literal(text))
    }

    pub fn variable(self, name: impl Into<String>) -> Self {
        self.word(ShellWord::variable(name))
    }

    pub fn extend(mut self, words: impl IntoIterator<Item = ShellWord>) -> Self {
        self.words.extend(words);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn words(&self) -> &[ShellWord] {
        &self.words
    }

    pub fn render(&self) -> String {
        std::iter::once(quote_shell_word(&self.program).into_owned())
            .chain(self.words.iter().map(ShellWord::render))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One logical `mpirun` argument. Each unit renders to one or more words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MpiArg {
    /// `-np <count>`
    Processes(u64),
    /// `--hostfile $VARIABLE`
    HostFile { variable: String },
    /// `<flag> <value>`, e.g. `-bind-to none`
    Option { flag: String, value: String },
    /// `-mca <parameter> <value>`
    Mca { parameter: String, value: String },
    /// `-x NAME`: forward the launcher's variable to every rank.
    Export { name: String },
    /// `-x NAME=VALUE`
    ExportValue { name: String, value: String },
    /// `-env NAME=VALUE`: set a variable for every rank.
    Env { name: String, value: String },
    /// Bare switch such as `--allow-run-as-root`.
    Switch(String),
}

impl MpiArg {
    pub fn option(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Option {
            flag: flag.into(),
            value: value.into(),
        }
    }

    pub fn mca(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Mca {
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    pub fn export(name: impl Into<String>) -> Self {
        Self::Export { name: name.into() }
    }

    pub fn export_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ExportValue {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn env(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Env {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn switch(flag: impl Into<String>) -> Self {
        Self::Switch(flag.into())
    }

    pub fn words(&self) -> Vec<ShellWord> {
        match self {
            Self::Processes(count) => vec![ShellWord::literal("-np"), ShellWord::literal(count.to_string())],
            Self::HostFile { variable } => vec![ShellWord::literal("--hostfile"), ShellWord::variable(variable.clone())],
            Self::Option { flag, value } => vec![ShellWord::literal(flag.clone()), ShellWord::literal(value.clone())],
            Self::Mca { parameter, value } => vec![
                ShellWord::literal("-mca"),
                ShellWord::literal(parameter.clone()),
                ShellWord::literal(value.clone()),
            ],
            Self::Export { name } => vec![ShellWord::literal("-x"), ShellWord::literal(name.clone())],
            Self::ExportValue { name, value } => vec![ShellWord::literal("-x"), ShellWord::literal(format!("{name}={value}"))],
            Self::Env { name, value } => vec![ShellWord::literal("-env"), ShellWord::literal(format!("{name}={value}"))],
            Self::Switch(flag) => vec![ShellWord::literal(flag.clone())],
        }
    }

    /// Variable names this unit forwards to or sets on the ranks.
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Self::Export { name } | Self::ExportValue { name, .. } | Self::Env { name, .. } => Some(name.as_str()),
            Self::HostFile { variable } => Some(variable.as_str()),
            Self::Processes(_) | Self::Option { .. } | Self::Mca { .. } | Self::Switch(_) => None,
        }
    }
}

impl fmt::Display for MpiArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.words().iter().map(ShellWord::render).collect();
        f.write_str(&rendered.join(" "))
    }
}

/// An `mpirun` invocation: ordered launcher arguments plus the launched program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpiRunCommand {
    args: Vec<MpiArg>,
    program: ShellCommand,
}

impl MpiRunCommand {
    pub fn new(program: ShellCommand) -> Self {
        Self {
            args: Vec::new(),
            program,
        }
    }

    pub fn arg(mut self, arg: MpiArg) -> Self {
        self.args.push(arg);
        self
    }

    /// Appends `arg` only when `enabled`.
    pub fn arg_if(self, enabled: bool, arg: MpiArg) -> Self {
        if enabled { self.arg(arg) } else { self }
    }

    pub fn args(&self) -> &[MpiArg] {
        &self.args
    }

    pub fn program(&self) -> &ShellCommand {
        &self.program
    }

    /// Value of the first `-np` unit.
    pub fn process_count(&self) -> Option<u64> {
        self.args.iter().find_map(|arg| match arg {
            MpiArg::Processes(count) => Some(*count),
            _ => None,
        })
    }

    /// Flatten into a plain shell command.
    pub fn to_shell_command(&self) -> ShellCommand {
        let mut words: Vec<ShellWord> = self.args.iter().flat_map(MpiArg::words).collect();
        words.push(ShellWord::literal(self.program.program()));
        words.extend(self.program.words().iter().cloned());
        ShellCommand::new("mpirun").extend(words)
    }
}

/// A `;`-separated sequence of shell commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    commands: Vec<ShellCommand>,
}

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, command: ShellCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn commands(&self) -> &[ShellCommand] {
        &self.commands
    }

    /// Every environment variable expanded anywhere in the line, in order.
    pub fn referenced_variables(&self) -> Vec<&str> {
        self.commands
            .iter()
            .flat_map(|command| command.words())
            .filter_map(ShellWord::referenced_variable)
            .collect()
    }

    pub fn render(&self) -> String {
        self.commands.iter().map(ShellCommand::render).collect::<Vec<_>>().join("; ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
