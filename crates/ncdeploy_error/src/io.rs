use std::io::ErrorKind;

/// An io error carrying the operation it happened in.
#[derive(Debug)]
pub struct IoError {
  pub context: Option<String>,
  pub inner: std::io::Error,
}

impl Clone for IoError {
  fn clone(&self) -> Self {
    Self {
      context: self.context.clone(),
      inner: std::io::Error::new(self.inner.kind(), self.inner.to_string()),
    }
  }
}

impl IoError {
  pub fn new<T>(context: T, inner: std::io::Error) -> Self
  where
    T: Into<String>,
  {
    Self {
      context: Some(context.into()),
      inner,
    }
  }

  pub fn without_context(inner: std::io::Error) -> Self {
    Self {
      context: None,
      inner,
    }
  }

  fn with_kind<C, M>(kind: ErrorKind, context: C, message: M) -> Self
  where
    C: ToString,
    M: ToString,
  {
    Self::new(
      context.to_string(),
      std::io::Error::new(kind, message.to_string()),
    )
  }

  pub fn invalid_data<C, M>(context: C, message: M) -> Self
  where
    C: ToString,
    M: ToString,
  {
    Self::with_kind(ErrorKind::InvalidData, context, message)
  }

  pub fn invalid_input<C, M>(context: C, message: M) -> Self
  where
    C: ToString,
    M: ToString,
  {
    Self::with_kind(ErrorKind::InvalidInput, context, message)
  }

  pub fn not_found<C, M>(context: C, message: M) -> Self
  where
    C: ToString,
    M: ToString,
  {
    Self::with_kind(ErrorKind::NotFound, context, message)
  }

  pub fn other<C, M>(context: C, message: M) -> Self
  where
    C: ToString,
    M: ToString,
  {
    Self::with_kind(ErrorKind::Other, context, message)
  }

  pub fn kind(&self) -> ErrorKind {
    self.inner.kind()
  }

  pub fn context(&self) -> Option<&str> {
    self.context.as_deref()
  }

  pub fn into_inner(self) -> std::io::Error {
    self.inner
  }
}

impl std::fmt::Display for IoError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut message = if self.inner.raw_os_error().is_some() {
      // Errors straight from the OS: drop the " (os error X)" suffix
      // so messages read the same on every system.
      strip_errno(&self.inner)
    } else {
      self.inner.to_string()
    };
    capitalize(&mut message);
    match &self.context {
      Some(ctx) => write!(f, "{ctx}: {message}"),
      None => write!(f, "{message}"),
    }
  }
}

impl std::error::Error for IoError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.inner)
  }
}

/// Capitalize the first character of an ASCII string.
fn capitalize(text: &mut str) {
  if let Some(first) = text.get_mut(..1) {
    first.make_ascii_uppercase();
  }
}

/// Strip the trailing " (os error XX)" from io error strings.
fn strip_errno(err: &std::io::Error) -> String {
  let mut msg = err.to_string();
  if let Some(pos) = msg.find(" (os error ") {
    msg.truncate(pos);
  }
  msg
}

pub type IoResult<T, E = IoError> = Result<T, E>;

/// Attach a context to an error while converting it into an [`IoError`].
pub trait FromIo<T> {
  fn map_err_context<C>(self, context: impl FnOnce() -> C) -> T
  where
    C: ToString + std::fmt::Display;
}

impl FromIo<IoError> for IoError {
  fn map_err_context<C>(self, context: impl FnOnce() -> C) -> IoError
  where
    C: ToString + std::fmt::Display,
  {
    IoError {
      context: Some((context)().to_string()),
      inner: self.into_inner(),
    }
  }
}

impl FromIo<Box<IoError>> for std::io::Error {
  fn map_err_context<C>(self, context: impl FnOnce() -> C) -> Box<IoError>
  where
    C: ToString + std::fmt::Display,
  {
    Box::new(IoError {
      context: Some((context)().to_string()),
      inner: self,
    })
  }
}

impl From<Box<IoError>> for IoError {
  fn from(f: Box<IoError>) -> Self {
    *f
  }
}

impl From<std::io::Error> for IoError {
  fn from(f: std::io::Error) -> Self {
    Self::without_context(f)
  }
}

impl From<IoError> for std::io::Error {
  fn from(f: IoError) -> Self {
    f.inner
  }
}

#[cfg(feature = "serde_yaml")]
impl FromIo<Box<IoError>> for serde_yaml::Error {
  fn map_err_context<C>(self, context: impl FnOnce() -> C) -> Box<IoError>
  where
    C: ToString + std::fmt::Display,
  {
    Box::new(IoError {
      context: Some((context)().to_string()),
      inner: std::io::Error::new(ErrorKind::InvalidData, self),
    })
  }
}
