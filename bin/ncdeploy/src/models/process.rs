use std::collections::BTreeMap;

/// An external command to execute.
///
/// Environment entries are handed to the child process only,
/// they are never rendered by [`Display`](std::fmt::Display).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessCmd {
  pub program: String,
  pub args: Vec<String>,
  pub envs: BTreeMap<String, String>,
}

impl ProcessCmd {
  pub fn new(program: &str) -> Self {
    Self {
      program: program.to_owned(),
      ..Default::default()
    }
  }

  /// Build a command from a `[program, args..]` list as found in the config
  pub fn from_parts(parts: &[String]) -> Option<Self> {
    let (program, args) = parts.split_first()?;
    Some(Self::new(program).args(args))
  }

  pub fn arg<T>(mut self, arg: T) -> Self
  where
    T: Into<String>,
  {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, T>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn env(mut self, key: &str, value: &str) -> Self {
    self.envs.insert(key.to_owned(), value.to_owned());
    self
  }
}

impl std::fmt::Display for ProcessCmd {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {arg}")?;
    }
    Ok(())
  }
}

/// What a finished process left behind
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutput {
  /// Exit code, `-1` when the process was killed by a signal
  pub code: i32,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  pub fn ok(stdout: &str) -> Self {
    Self {
      code: 0,
      stdout: stdout.to_owned(),
      stderr: String::new(),
    }
  }

  pub fn failed(code: i32, stderr: &str) -> Self {
    Self {
      code,
      stdout: String::new(),
      stderr: stderr.to_owned(),
    }
  }

  pub fn success(&self) -> bool {
    self.code == 0
  }

  /// Stdout followed by stderr
  pub fn combined(&self) -> String {
    match (self.stdout.trim_end(), self.stderr.trim_end()) {
      ("", err) => err.to_owned(),
      (out, "") => out.to_owned(),
      (out, err) => format!("{out}\n{err}"),
    }
  }

  /// Last `n` lines of the combined output
  pub fn tail(&self, n: usize) -> String {
    let combined = self.combined();
    let lines = combined.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
  }
}

impl From<std::process::Output> for ProcessOutput {
  fn from(output: std::process::Output) -> Self {
    Self {
      code: output.status.code().unwrap_or(-1),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
  }
}
