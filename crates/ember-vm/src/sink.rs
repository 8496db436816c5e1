use std::cell::RefCell;
use std::rc::Rc;

/// Destination for `print` output.
///
/// The machine writes one line per print statement through this seam, so
/// embedders and tests can observe output without touching stdout.
pub trait OutputSink {
    fn print(&mut self, text: &str);
}

/// Writes each printed value to stdout on its own line.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn print(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Accumulates printed lines in memory.
///
/// Clones share the same buffer, so a test can keep one handle and hand the
/// other to the machine.
#[derive(Clone, Debug, Default)]
pub struct CaptureSink {
    buffer: Rc<RefCell<String>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything printed so far, one line per print statement.
    pub fn contents(&self) -> String {
        self.buffer.borrow().clone()
    }

    /// Drain the buffer, returning its contents.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.borrow_mut())
    }
}

impl OutputSink for CaptureSink {
    fn print(&mut self, text: &str) {
        let mut buffer = self.buffer.borrow_mut();
        buffer.push_str(text);
        buffer.push('\n');
    }
}
