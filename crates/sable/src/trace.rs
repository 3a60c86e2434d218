use smallvec::SmallVec;

use crate::io::DiagnosticWriter;

/// Source position recorded for one bytecode offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    /// Zero-based line within the source text.
    pub line: u32,
    /// Zero-based column within the line.
    pub col: u32,
    /// Index of the attached source this offset was compiled from.
    pub source: u16,
}

impl SourceLoc {
    #[must_use]
    pub fn new(line: u32, col: u32, source: u16) -> Self {
        Self { line, col, source }
    }
}

/// One compiled unit of bytecode with its per-offset source table.
///
/// Units occupy disjoint address ranges `[base, base + len)` in the VM's
/// instruction address space, so an instruction pointer identifies its
/// owning unit by range membership alone.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    base: usize,
    locations: Vec<SourceLoc>,
}

impl CodeUnit {
    #[must_use]
    pub fn new(base: usize, locations: Vec<SourceLoc>) -> Self {
        Self { base, locations }
    }

    /// Returns the recorded location when `addr` falls inside this unit.
    #[must_use]
    fn location(&self, addr: usize) -> Option<&SourceLoc> {
        addr.checked_sub(self.base).and_then(|offset| self.locations.get(offset))
    }
}

/// Maps instruction addresses back to source positions for diagnostics.
///
/// The front end attaches each source text once and registers the compiled
/// units' offset tables; this core only ever reads them, and only on the
/// diagnostic path.
#[derive(Debug, Default)]
pub struct SourceTracker {
    sources: Vec<String>,
    names: Vec<String>,
    units: Vec<CodeUnit>,
}

impl SourceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source text and its display name.
    pub fn attach_source(&mut self, text: impl Into<String>, name: impl Into<String>) {
        self.sources.push(text.into());
        self.names.push(name.into());
    }

    /// Registers the compiled units' per-offset source tables.
    pub fn attach_units(&mut self, units: Vec<CodeUnit>) {
        self.units = units;
    }

    /// Number of attached sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Renders the source context for one position: up to two preceding
    /// lines, the offending line, a caret under the column, and a footer
    /// naming the file with 1-based line and column.
    pub fn render_source_location<W: DiagnosticWriter>(&self, out: &mut W, line: u32, col: u32, source: u16) {
        let Some(text) = self.sources.get(usize::from(source)) else {
            out.write_text("SourceError: source never attached\n");
            return;
        };
        let name = &self.names[usize::from(source)];
        let line_idx = line as usize;

        let lines: Vec<&str> = text.split('\n').collect();
        let mut context: SmallVec<[&str; 3]> = SmallVec::new();
        for idx in line_idx.saturating_sub(2)..=line_idx {
            if let Some(text) = lines.get(idx) {
                context.push(text);
            }
        }
        for text in &context {
            out.write_text(text);
            out.write_text("\n");
        }
        let pad = " ".repeat(col as usize);
        out.write_text(&format!("{pad}^\n"));
        out.write_text(&format!(
            "{pad}In \"{name}\": [line: {line}, index {col}]\n",
            line = line + 1,
            col = col + 1
        ));
    }

    /// Renders the source context for the instruction a frame was executing.
    ///
    /// The saved pointer sits one past the executing instruction, so the
    /// lookup uses `ip - 1`.
    pub fn render_frame<W: DiagnosticWriter>(&self, out: &mut W, ip: usize) {
        if let Some(addr) = ip.checked_sub(1) {
            for unit in &self.units {
                if let Some(loc) = unit.location(addr) {
                    self.render_source_location(out, loc.line, loc.col, loc.source);
                    return;
                }
            }
        }
        out.write_text("Instruction pointer not found in any code unit\n");
    }

    /// Renders the full call traceback, innermost frame first.
    pub fn render_traceback<W: DiagnosticWriter>(&self, out: &mut W, ip_stack: &[usize]) {
        out.write_text("Runtime traceback:\n");
        for (frame, ip) in ip_stack.iter().enumerate().rev() {
            out.write_text(&format!("\nCall Frame [{frame}]:\n"));
            self.render_frame(out, *ip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectStringWriter;

    #[test]
    fn caret_lands_under_column() {
        let mut tracker = SourceTracker::new();
        tracker.attach_source("let x = 1;\nlet y = x + z;\n", "main.sbl");
        let mut out = CollectStringWriter::new();
        tracker.render_source_location(&mut out, 1, 12, 0);
        assert_eq!(
            out.output(),
            "let x = 1;\nlet y = x + z;\n            ^\n            In \"main.sbl\": [line: 2, index 13]\n"
        );
    }

    #[test]
    fn missing_source_is_reported() {
        let tracker = SourceTracker::new();
        let mut out = CollectStringWriter::new();
        tracker.render_source_location(&mut out, 0, 0, 3);
        assert_eq!(out.output(), "SourceError: source never attached\n");
    }

    #[test]
    fn frame_lookup_uses_preceding_address() {
        let mut tracker = SourceTracker::new();
        tracker.attach_source("a\nb\n", "t.sbl");
        tracker.attach_units(vec![CodeUnit::new(
            100,
            vec![SourceLoc::new(0, 0, 0), SourceLoc::new(1, 0, 0)],
        )]);
        let mut out = CollectStringWriter::new();
        // ip 102 is one past offset 1.
        tracker.render_frame(&mut out, 102);
        assert!(out.output().contains("[line: 2, index 1]"));
    }

    #[test]
    fn unknown_ip_falls_back() {
        let tracker = SourceTracker::new();
        let mut out = CollectStringWriter::new();
        tracker.render_frame(&mut out, 5);
        assert_eq!(out.output(), "Instruction pointer not found in any code unit\n");
    }
}
