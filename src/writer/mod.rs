//! Output sinks used while rendering.
//!
//! [`OrderedWriter`] wraps the caller's sink. Text written while no `parallel`
//! region is outstanding goes straight through; once a region has been handed to
//! the executor, later text queues up behind it so the final output follows
//! document order no matter which region finishes first. [`OrderedWriter::flush`]
//! drains the queue, blocking on each outstanding region in turn.
//!
//! Every writer of one render shares an [`OutputBudget`], so nested buffers
//! (macros, `parallel` regions, `filter` bodies) count against the same limit.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::channel::oneshot;

use crate::core::{CobbleError, ErrorLocation};

/// Character budget of one render.
#[derive(Debug)]
pub struct OutputBudget {
    limit: Option<usize>,
    written: AtomicUsize,
}

impl OutputBudget {
    /// `max_rendered_size` below zero disables the budget.
    pub fn new(max_rendered_size: i64) -> Self {
        Self {
            limit: usize::try_from(max_rendered_size).ok(),
            written: AtomicUsize::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(-1)
    }

    /// Account for `chars` more characters of output.
    ///
    /// # Errors
    ///
    /// [`CobbleError::OutputBudgetExceeded`] once the total crosses the limit.
    pub fn charge(&self, chars: usize) -> Result<(), CobbleError> {
        let Some(limit) = self.limit else {
            return Ok(());
        };
        let total = self.written.fetch_add(chars, Ordering::Relaxed).saturating_add(chars);
        if total > limit {
            return Err(CobbleError::OutputBudgetExceeded {
                limit,
            });
        }
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }
}

/// Output of a `parallel` region that may still be rendering.
#[derive(Debug)]
pub struct PendingOutput {
    receiver: oneshot::Receiver<Result<String, CobbleError>>,
}

/// The worker side of a [`PendingOutput`].
#[derive(Debug)]
pub struct OutputCompleter {
    sender: oneshot::Sender<Result<String, CobbleError>>,
}

/// A connected completer/pending pair.
pub fn pending_output() -> (OutputCompleter, PendingOutput) {
    let (sender, receiver) = oneshot::channel();
    (
        OutputCompleter {
            sender,
        },
        PendingOutput {
            receiver,
        },
    )
}

impl OutputCompleter {
    pub fn complete(self, output: Result<String, CobbleError>) {
        // the render may have been abandoned; nobody is left to read the output then
        let _ = self.sender.send(output);
    }
}

impl PendingOutput {
    /// Block until the region has rendered.
    pub fn wait(self) -> Result<String, CobbleError> {
        match futures::executor::block_on(self.receiver) {
            Ok(output) => output,
            Err(oneshot::Canceled) => Err(CobbleError::Render {
                message: "A parallel region was dropped before it finished rendering".to_string(),
                location: Box::new(ErrorLocation::unknown()),
                source: None,
            }),
        }
    }
}

enum Segment {
    Text(String),
    Pending(PendingOutput),
}

enum Target<'w> {
    Sink(&'w mut dyn fmt::Write),
    Buffer(String),
    Discard,
}

/// A sink that keeps document order across asynchronously rendered regions.
pub struct OrderedWriter<'w> {
    target: Target<'w>,
    segments: VecDeque<Segment>,
    budget: Arc<OutputBudget>,
    closed: bool,
}

impl<'w> OrderedWriter<'w> {
    /// Write through to `sink`.
    pub fn new(sink: &'w mut dyn fmt::Write, budget: Arc<OutputBudget>) -> Self {
        Self {
            target: Target::Sink(sink),
            segments: VecDeque::new(),
            budget,
            closed: false,
        }
    }

    /// Collect into an owned buffer, read back with [`OrderedWriter::into_string`].
    pub fn buffer(budget: Arc<OutputBudget>) -> OrderedWriter<'static> {
        OrderedWriter {
            target: Target::Buffer(String::new()),
            segments: VecDeque::new(),
            budget,
            closed: false,
        }
    }

    /// Drop everything written, still honouring queued regions and the budget.
    pub fn discard(budget: Arc<OutputBudget>) -> OrderedWriter<'static> {
        OrderedWriter {
            target: Target::Discard,
            segments: VecDeque::new(),
            budget,
            closed: false,
        }
    }

    pub fn budget(&self) -> &Arc<OutputBudget> {
        &self.budget
    }

    pub fn write_str(&mut self, text: &str) -> Result<(), CobbleError> {
        if self.closed {
            return Err(CobbleError::WriterClosed);
        }
        if text.is_empty() {
            return Ok(());
        }
        self.budget.charge(text.chars().count())?;
        match self.segments.back_mut() {
            None => self.emit(text),
            Some(Segment::Text(queued)) => {
                queued.push_str(text);
                Ok(())
            }
            Some(Segment::Pending(_)) => {
                self.segments.push_back(Segment::Text(text.to_string()));
                Ok(())
            }
        }
    }

    /// Queue a region rendering elsewhere; later writes wait behind it.
    pub fn push_pending(&mut self, pending: PendingOutput) -> Result<(), CobbleError> {
        if self.closed {
            return Err(CobbleError::WriterClosed);
        }
        self.segments.push_back(Segment::Pending(pending));
        Ok(())
    }

    /// Whether any region is still queued.
    pub fn has_pending(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Pending(_)))
    }

    /// Emit everything queued, in order, waiting on outstanding regions.
    pub fn flush(&mut self) -> Result<(), CobbleError> {
        while let Some(segment) = self.segments.pop_front() {
            let text = match segment {
                Segment::Text(text) => text,
                // already charged by the worker's own buffer
                Segment::Pending(pending) => pending.wait()?,
            };
            self.emit(&text)?;
        }
        Ok(())
    }

    /// Flush, then refuse further writes.
    pub fn close(&mut self) -> Result<(), CobbleError> {
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Flush and return what was collected. Writers that do not collect return an
    /// empty string.
    pub fn into_string(mut self) -> Result<String, CobbleError> {
        self.flush()?;
        match &mut self.target {
            Target::Buffer(buffer) => Ok(std::mem::take(buffer)),
            Target::Sink(_) | Target::Discard => Ok(String::new()),
        }
    }

    fn emit(&mut self, text: &str) -> Result<(), CobbleError> {
        match &mut self.target {
            Target::Sink(sink) => sink.write_str(text)?,
            Target::Buffer(buffer) => buffer.push_str(text),
            Target::Discard => {}
        }
        Ok(())
    }
}

impl fmt::Debug for OrderedWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedWriter")
            .field("queued", &self.segments.len())
            .field("closed", &self.closed)
            .field("written", &self.budget.written())
            .finish()
    }
}
