//! A terminal progress bar.
//!
//! ```text
//! ingesting: [#########                               ]
//! ```
//!
//! [`ProgressBar::start`] announces the expected number of ticks and draws
//! the empty bar; [`ProgressBar::tick`] advances incrementally and
//! [`ProgressBar::complete`] absolutely; [`ProgressBar::finish`] fills
//! whatever is left. Output errors are swallowed: a broken terminal should
//! never take the run down with it.

use std::io::Write;

/// A fixed-width progress bar over any writer.
pub struct ProgressBar<W: Write> {
    out: W,
    message: String,
    width: u64,
    total: u64,
    ticks: u64,
    next_mark: u64,
    marks: u64,
    finished: bool,
}

impl<W: Write> ProgressBar<W> {
    /// Create a bar of `width` characters prefixed with `message`.
    pub fn new(out: W, width: usize, message: &str) -> ProgressBar<W> {
        ProgressBar {
            out,
            message: message.to_string(),
            width: width.max(1) as u64,
            total: 0,
            ticks: 0,
            next_mark: 0,
            marks: 0,
            finished: false,
        }
    }

    fn tick_threshold(&self) -> u64 {
        // ticks needed before the (marks + 1)-th bar character appears
        (self.total * (self.marks + 1)).div_ceil(self.width)
    }

    /// Start displaying the bar, expecting `total` ticks overall.
    pub fn start(&mut self, total: u64) {
        self.total = total;
        self.ticks = 0;
        self.marks = 0;
        self.finished = false;
        self.next_mark = self.tick_threshold();

        let pad = self.width as usize + 1 + self.message.len();
        let _ = write!(self.out, "{}]\r{}[", " ".repeat(pad), self.message);
        let _ = self.out.flush();
        self.advance(0);
    }

    /// Advance the bar by one tick.
    pub fn tick(&mut self) {
        self.advance(1);
    }

    /// Advance the bar by `ticks`.
    pub fn advance(&mut self, ticks: u64) {
        if self.finished {
            return;
        }
        self.ticks += ticks;
        if self.ticks >= self.next_mark {
            self.redraw();
        }
    }

    /// Set the absolute tick count, never moving backwards.
    pub fn complete(&mut self, ticks: u64) {
        if self.finished {
            return;
        }
        if ticks > self.next_mark && ticks > self.ticks {
            self.advance(ticks - self.ticks);
        }
    }

    /// Fill the remainder of the bar and stop.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        if self.ticks < self.total {
            self.advance(self.total - self.ticks);
        }
    }

    fn redraw(&mut self) {
        if self.total == 0 {
            // nothing to wait for: draw the whole bar and stop
            for _ in self.marks..self.width {
                let _ = self.out.write_all(b"#");
            }
            self.marks = self.width;
            let _ = self.out.write_all(b"\n");
            let _ = self.out.flush();
            self.finished = true;
            return;
        }
        if self.ticks > self.total {
            self.ticks = self.total;
        }
        while self.ticks >= self.next_mark {
            self.marks += 1;
            self.next_mark = self.tick_threshold();
            if self.marks <= self.width {
                let _ = self.out.write_all(b"#");
            }
        }
        let _ = self.out.flush();
        if self.marks == self.width {
            let _ = self.out.write_all(b"\n");
            self.finished = true;
        }
    }
}
