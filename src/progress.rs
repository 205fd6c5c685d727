//! Advisory progress reporting
//!
//! The ticker mirrors the run: one `*` per fetched window, one `-` per
//! written sub-batch, one `.` per replayed statement, wrapped at
//! [`SEP_SIZE`] marks per line. Purely advisory: a silent instance has no
//! effect on the run, and write failures here are ignored.

use std::io::{self, Write};

pub const SEP_SIZE: usize = 50;

pub struct Progress {
    sink: Option<Box<dyn Write>>,
    /// Prefix info lines with `// ` and suppress ticks. Used when the
    /// dump script itself is on stdout, so report lines stay replayable
    /// comments inside the script.
    comment: bool,
    marks: usize,
    mid_line: bool,
}

impl Progress {
    pub fn silent() -> Self {
        Self {
            sink: None,
            comment: false,
            marks: 0,
            mid_line: false,
        }
    }

    pub fn stderr() -> Self {
        Self::to_writer(Box::new(io::stderr()), false)
    }

    pub fn to_writer(sink: Box<dyn Write>, comment: bool) -> Self {
        Self {
            sink: Some(sink),
            comment,
            marks: 0,
            mid_line: false,
        }
    }

    /// Labeled report line, e.g. `Number of nodes:     42 [0->57]`.
    pub fn info(&mut self, message: &str) {
        self.break_line();
        let prefix = if self.comment { "// " } else { "" };
        if let Some(sink) = self.sink.as_mut() {
            let _ = writeln!(sink, "{prefix}{message}");
        }
    }

    pub fn separator(&mut self) {
        let line = "=".repeat(SEP_SIZE);
        self.info(&line);
    }

    /// One fetched read window.
    pub fn window_tick(&mut self) {
        self.tick(b'*');
    }

    /// One written sub-batch.
    pub fn batch_tick(&mut self) {
        self.tick(b'-');
    }

    /// One replayed statement.
    pub fn statement_tick(&mut self) {
        self.tick(b'.');
    }

    /// Close out a ticker line at the end of a phase.
    pub fn finish_ticks(&mut self) {
        if !self.mid_line {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.write_all(b" .\n");
            let _ = sink.flush();
        }
        self.marks = 0;
        self.mid_line = false;
    }

    /// Comment passed through from a replayed script.
    pub fn annotation(&mut self, text: &str) {
        self.info(&format!(">> {text}"));
    }

    fn tick(&mut self, mark: u8) {
        if self.comment {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let _ = sink.write_all(&[mark]);
        let _ = sink.flush();
        self.marks += 1;
        self.mid_line = true;
        if self.marks >= SEP_SIZE {
            let _ = sink.write_all(b"\n");
            self.marks = 0;
            self.mid_line = false;
        }
    }

    fn break_line(&mut self) {
        if !self.mid_line {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.write_all(b"\n");
        }
        self.marks = 0;
        self.mid_line = false;
    }
}
