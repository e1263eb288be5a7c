// Licensed under the Apache-2.0 license

//! Logging sinks shared by the drivers in this crate.
//!
//! Drivers are generic over a [`Logger`] and default to [`NoOpLogger`], so a
//! board that has no console pays nothing for the diagnostics.

use core::fmt;

/// Destination for driver diagnostics.
///
/// Messages arrive as [`fmt::Arguments`] so implementations decide whether
/// (and where) to format them. Nothing here allocates.
pub trait Logger {
    fn debug(&mut self, args: fmt::Arguments<'_>);
    fn error(&mut self, args: fmt::Arguments<'_>);
}

impl<L: Logger + ?Sized> Logger for &mut L {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        (**self).debug(args);
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        (**self).error(args);
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&mut self, _args: fmt::Arguments<'_>) {}
    fn error(&mut self, _args: fmt::Arguments<'_>) {}
}

/// Writes one line per message to an `embedded-io` sink, typically the
/// debug UART.
pub struct IoLogger<W: embedded_io::Write> {
    writer: W,
    verbose: bool,
}

impl<W: embedded_io::Write> IoLogger<W> {
    /// Create a logger that emits errors only.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            verbose: false,
        }
    }

    /// Also emit `debug` messages.
    #[must_use]
    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, prefix: &str, args: fmt::Arguments<'_>) {
        // A console that cannot be written to has nowhere to report that either.
        let _ = write!(self.writer, "{prefix}{args}\r\n");
    }
}

impl<W: embedded_io::Write> Logger for IoLogger<W> {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        if self.verbose {
            self.line("", args);
        }
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        self.line("error: ", args);
    }
}

/// Forwards to the `defmt` global logger.
#[cfg(feature = "defmt")]
#[derive(Clone, Copy, Debug, Default)]
pub struct DefmtLogger;

#[cfg(feature = "defmt")]
impl Logger for DefmtLogger {
    fn debug(&mut self, args: fmt::Arguments<'_>) {
        defmt::debug!("{}", defmt::Display2Format(&args));
    }

    fn error(&mut self, args: fmt::Arguments<'_>) {
        defmt::error!("{}", defmt::Display2Format(&args));
    }
}
