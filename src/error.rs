use core::fmt;

/// Pipeline phase where a [`CardError`] originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorPhase {
    /// Font registry or renderer construction.
    Init,
    /// Caller-supplied render options.
    Options,
    /// Title image decoding.
    Decode,
    /// Final image encoding.
    Encode,
    /// Filesystem access.
    Io,
}

impl ErrorPhase {
    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Options => "options",
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed actual-vs-limit context for rejected sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorLimitContext {
    /// Limit kind identifier.
    pub kind: &'static str,
    /// Value supplied by the caller.
    pub actual: u64,
    /// Limit that was crossed.
    pub limit: u64,
}

impl ErrorLimitContext {
    pub fn new(kind: &'static str, actual: u64, limit: u64) -> Self {
        Self {
            kind,
            actual,
            limit,
        }
    }
}

/// Structured error for card rendering.
///
/// Only configuration-level problems surface as errors: missing fonts,
/// invalid options, undecodable title images, and encoder failures. Markup
/// and layout problems are recovered where they happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardError {
    /// Processing phase where this error originated.
    pub phase: ErrorPhase,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: Box<str>,
    /// Optional file path context.
    pub path: Option<Box<str>>,
    /// Optional typed actual-vs-limit context.
    pub limit: Option<Box<ErrorLimitContext>>,
}

impl CardError {
    pub fn new(phase: ErrorPhase, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase,
            code,
            message: message.into().into_boxed_str(),
            path: None,
            limit: None,
        }
    }

    /// Fatal initialization error (required font missing or unreadable).
    pub fn init(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorPhase::Init, code, message)
    }

    /// Rejected caller option.
    pub fn invalid_option(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorPhase::Options, code, message)
    }

    pub fn decode(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorPhase::Decode, code, message)
    }

    pub fn encode(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorPhase::Encode, code, message)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into().into_boxed_str());
        self
    }

    pub fn with_phase(mut self, phase: ErrorPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_limit(mut self, kind: &'static str, actual: u64, limit: u64) -> Self {
        self.limit = Some(Box::new(ErrorLimitContext::new(kind, actual, limit)));
        self
    }

    /// True when the error is a fatal font/registry initialization failure.
    pub fn is_fatal_init(&self) -> bool {
        self.phase == ErrorPhase::Init
    }
}

impl fmt::Display for CardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.phase, self.code, self.message)?;
        if let Some(path) = self.path.as_deref() {
            write!(f, " [path={}]", path)?;
        }
        if let Some(limit) = self.limit.as_deref() {
            write!(
                f,
                " [limit_kind={} actual={} limit={}]",
                limit.kind, limit.actual, limit.limit
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for CardError {}

impl From<std::io::Error> for CardError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorPhase::Io, "IO", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_phase_code_and_context() {
        let err = CardError::invalid_option("WIDTH_TOO_SMALL", "card width too small")
            .with_limit("min_width", 40, 200);
        let rendered = err.to_string();
        assert!(rendered.starts_with("options:WIDTH_TOO_SMALL: card width too small"));
        assert!(rendered.contains("[limit_kind=min_width actual=40 limit=200]"));
    }

    #[test]
    fn path_context_is_rendered() {
        let err = CardError::init("FONT_MISSING", "required font not found")
            .with_path("/fonts/Regular.ttf");
        assert!(err.is_fatal_init());
        assert!(err.to_string().ends_with("[path=/fonts/Regular.ttf]"));
    }

    #[test]
    fn io_errors_map_to_io_phase() {
        let err: CardError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.phase, ErrorPhase::Io);
        assert_eq!(err.code, "IO");
    }
}
