//! `TerminalReporter`: Presentation-layer implementation of `ProgressReporter`.
//!
//! Wraps `&OutputContext` and implements the `application::ports::ProgressReporter`
//! trait so application services can emit progress events without depending on
//! any presentation type directly.

use std::cell::RefCell;

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, progress};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// On a TTY `step()` drives a spinner that the next `success()`/`warn()`
/// resolves; elsewhere each event is one printed line. Everything is
/// suppressed when `ctx.quiet`.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    active: RefCell<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            active: RefCell::new(None),
        }
    }

    fn resolve(&self, mark: String, message: &str) {
        if let Some(pb) = self.active.borrow_mut().take() {
            progress::finish_with(&pb, &mark, message);
        } else {
            println!("  {mark} {message}");
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        if self.ctx.show_progress() {
            let mut active = self.active.borrow_mut();
            match active.as_ref() {
                Some(pb) => pb.set_message(message.to_string()),
                None => *active = Some(progress::spinner(message)),
            }
        } else {
            println!("  {} {message}", "→".style(self.ctx.styles.info));
        }
    }

    fn success(&self, message: &str) {
        if !self.ctx.quiet {
            self.resolve("✓".style(self.ctx.styles.success).to_string(), message);
        }
    }

    fn warn(&self, message: &str) {
        if !self.ctx.quiet {
            self.resolve("!".style(self.ctx.styles.warning).to_string(), message);
        }
    }
}

impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        if let Some(pb) = self.active.get_mut().take() {
            pb.finish_and_clear();
        }
    }
}
