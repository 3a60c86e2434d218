use std::io::{self, Write as _};

/// Trait for handling diagnostic output from the runtime core.
///
/// Every piece of diagnostic text - exception messages, source context,
/// tracebacks, pre-runtime errors - flows through an implementation of this
/// trait. The default implementation `StderrWriter` writes to stderr;
/// `CollectStringWriter` captures output for tests and embedders that want
/// to surface diagnostics themselves.
pub trait DiagnosticWriter {
    /// Writes a chunk of diagnostic text verbatim.
    ///
    /// Callers are responsible for newlines; implementations must not add
    /// separators or terminators of their own.
    fn write_text(&mut self, text: &str);
}

/// Default `DiagnosticWriter` that writes to stderr.
#[derive(Debug, Default)]
pub struct StderrWriter;

impl DiagnosticWriter for StderrWriter {
    fn write_text(&mut self, text: &str) {
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }
}

/// A `DiagnosticWriter` that collects all output into a string.
///
/// Useful for testing diagnostic formats or capturing output
/// programmatically.
#[derive(Debug, Default)]
pub struct CollectStringWriter(String);

impl CollectStringWriter {
    /// Creates a new empty `CollectStringWriter`.
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl DiagnosticWriter for CollectStringWriter {
    fn write_text(&mut self, text: &str) {
        self.0.push_str(text);
    }
}

/// `DiagnosticWriter` that ignores all output.
///
/// Useful for suppressing diagnostics during benchmarking.
#[derive(Debug, Default)]
pub struct NoWriter;

impl DiagnosticWriter for NoWriter {
    fn write_text(&mut self, _text: &str) {}
}
