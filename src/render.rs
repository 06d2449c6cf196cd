//! Output rendering for chat sessions.
//!
//! A session hands the renderer the *cumulative* response buffer after every
//! delta. [`PlainTextRenderer`] turns that into incremental terminal output by
//! writing only the part of the buffer it has not printed yet.

use std::io::{self, Stdout, Write};

use crate::types::{Role, Turn};

/// ANSI escape code for dim text (used for informational output).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for role labels).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering streaming output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Capturing renderers in tests
pub trait Renderer: Send {
    /// Display the response accumulated so far.
    ///
    /// Called after every delta with the concatenation of all deltas received
    /// in the current exchange.
    fn print_partial(&mut self, buffer: &str);

    /// Called once the assistant turn has been committed.
    fn finish_response(&mut self);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a complete turn, as when replaying history.
    fn print_turn(&mut self, turn: &Turn);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    printed: usize,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer over an arbitrary writer.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            printed: 0,
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Flushes to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.out.flush();
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_partial(&mut self, buffer: &str) {
        match buffer.get(self.printed..) {
            Some(unseen) => {
                let _ = write!(self.out, "{unseen}");
            }
            None => {
                // The buffer did not grow from what was printed; start over.
                let _ = write!(self.out, "\n{buffer}");
            }
        }
        self.printed = buffer.len();
        self.flush();
    }

    fn finish_response(&mut self) {
        self.printed = 0;
        let _ = writeln!(self.out);
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        let _ = writeln!(self.out, "{line}");
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        let line = self.styled(ANSI_DIM, info);
        let _ = writeln!(self.out, "{line}");
        self.flush();
    }

    fn print_turn(&mut self, turn: &Turn) {
        let label = match turn.role {
            Role::System => "System",
            Role::User => "You",
            Role::Assistant => "LAVO",
        };
        let label = self.styled(ANSI_CYAN, &format!("{label}:"));
        let _ = writeln!(self.out, "{label} {}", turn.content);
        self.flush();
    }
}
