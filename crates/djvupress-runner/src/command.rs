use std::ffi::OsString;
use std::path::PathBuf;

/// One subprocess invocation contract: program, arguments, environment
/// overrides, and optional working directory.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub envs: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
}

impl ToolCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Split a full argument vector (`argv[0]` is the program) into a
    /// command. Returns `None` for an empty vector.
    #[must_use]
    pub fn from_argv(argv: Vec<OsString>) -> Option<Self> {
        let mut parts = argv.into_iter();
        let program = PathBuf::from(parts.next()?);
        Some(Self {
            program,
            args: parts.collect(),
            envs: Vec::new(),
            current_dir: None,
        })
    }

    #[must_use]
    pub fn with_envs(mut self, envs: Vec<(OsString, OsString)>) -> Self {
        self.envs = envs;
        self
    }

    /// Human-readable rendering for logs and error reports.
    #[must_use]
    pub fn rendered(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }

    /// The `PATH` this command will be resolved against: the override if one
    /// was set, the ambient value otherwise.
    #[must_use]
    pub fn search_path(&self) -> String {
        self.envs
            .iter()
            .find(|(key, _)| key == "PATH")
            .map(|(_, value)| value.clone())
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }
}
