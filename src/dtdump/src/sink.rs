/// Line-oriented destination for dump records.
pub trait Sink {
    /// Accepts one record. Records carry no line terminator.
    fn emit(&mut self, record: &str);
}

impl<F: FnMut(&str)> Sink for F {
    fn emit(&mut self, record: &str) {
        self(record);
    }
}

/// Forwards each record to the `log` facade, so dumps reach whichever logger the firmware
/// has installed.
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    level: log::Level,
}

impl LogSink {
    pub fn new(level: log::Level) -> Self {
        Self { level }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(log::Level::Info)
    }
}

impl Sink for LogSink {
    fn emit(&mut self, record: &str) {
        log!(self.level, "{record}");
    }
}

/// Writes newline-terminated records to any [`core::fmt::Write`] implementor, e.g. a
/// serial port writer.
#[derive(Debug)]
pub struct FmtSink<W>(W);

impl<W: core::fmt::Write> FmtSink<W> {
    pub fn new(writer: W) -> Self {
        Self(writer)
    }

    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: core::fmt::Write> Sink for FmtSink<W> {
    fn emit(&mut self, record: &str) {
        self.0
            .write_str(record)
            .and_then(|()| self.0.write_char('\n'))
            .ok();
    }
}
