use tokio::sync::mpsc::UnboundedSender;

/// Tag prefixed to subprocess output when no event sink was supplied.
const LOG_TAG: &str = "djvupress";

/// What a progress parser extracted from one output line. `fraction` is
/// relative to the conversion phase, in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub fraction: Option<f32>,
    pub message: Option<String>,
}

/// Events delivered to the caller during one conversion, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConvertEvent {
    /// A raw subprocess output line.
    Output(String),
    /// Overall progress on the shared three-phase scale, monotonically
    /// non-decreasing within one invocation.
    Progress {
        fraction: f32,
        message: Option<String>,
    },
}

/// Caller-supplied destination for conversion events. Without a channel,
/// output lines fall back to standard output under a fixed tag and progress
/// fractions are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<UnboundedSender<ConvertEvent>>,
}

impl EventSink {
    #[must_use]
    pub fn channel(tx: UnboundedSender<ConvertEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    #[must_use]
    pub fn stdout() -> Self {
        Self { tx: None }
    }

    pub fn output(&self, line: &str) {
        self.emit(ConvertEvent::Output(line.to_string()));
    }

    pub fn progress(&self, fraction: f32, message: Option<String>) {
        self.emit(ConvertEvent::Progress { fraction, message });
    }

    fn emit(&self, event: ConvertEvent) {
        match &self.tx {
            // A dropped receiver just means nobody is listening anymore.
            Some(tx) => {
                let _ = tx.send(event);
            }
            None => {
                if let ConvertEvent::Output(line) = event {
                    println!("{LOG_TAG}: {line}");
                }
            }
        }
    }
}

/// Shared progress scale across the three invocation phases: a small fixed
/// startup head-room, the conversion bulk, and a small cleanup tail. Emitted
/// values are clamped so an out-of-order parse can never regress the
/// fraction.
#[derive(Debug)]
pub struct ProgressScale {
    last: f32,
}

const STARTUP_FRACTION: f32 = 0.02;
const CONVERSION_CEILING: f32 = 0.97;

impl ProgressScale {
    #[must_use]
    pub fn new() -> Self {
        Self { last: 0.0 }
    }

    /// The subprocess has been spawned.
    pub fn started(&mut self) -> f32 {
        self.emit(STARTUP_FRACTION)
    }

    /// Conversion-phase progress, `inner` in `[0, 1]`.
    pub fn conversion(&mut self, inner: f32) -> f32 {
        let inner = inner.clamp(0.0, 1.0);
        self.emit(STARTUP_FRACTION + inner * (CONVERSION_CEILING - STARTUP_FRACTION))
    }

    /// Output file handed back to the caller.
    pub fn finished(&mut self) -> f32 {
        self.emit(1.0)
    }

    fn emit(&mut self, value: f32) -> f32 {
        self.last = self.last.max(value);
        self.last
    }
}

impl Default for ProgressScale {
    fn default() -> Self {
        Self::new()
    }
}
