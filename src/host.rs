//! The environment a program runs in: where emitted values go and where
//! counts come from when a loop is given no count link.

use std::collections::VecDeque;

use crate::Error;
use crate::ast::Value;

/// Output sink and input source used during evaluation
pub trait Host {
    /// Receive a value emitted by a chain step
    fn emit(&mut self, value: &Value) -> Result<(), Error>;

    /// The most recent external input
    fn last_input(&mut self) -> Result<Value, Error>;
}

/// Host that records emitted values and serves queued inputs.
///
/// Inputs are handed out in order; once the queue is drained the last one
/// keeps being returned.
#[derive(Debug, Default)]
pub struct RecordingHost {
    emitted: Vec<Value>,
    inputs: VecDeque<Value>,
    last: Option<Value>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs<I>(inputs: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        RecordingHost {
            inputs: inputs.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn emitted(&self) -> &[Value] {
        &self.emitted
    }
}

impl Host for RecordingHost {
    fn emit(&mut self, value: &Value) -> Result<(), Error> {
        self.emitted.push(value.clone());
        Ok(())
    }

    fn last_input(&mut self) -> Result<Value, Error> {
        if let Some(next) = self.inputs.pop_front() {
            self.last = Some(next);
        }
        self.last
            .clone()
            .ok_or_else(|| Error::EvalError("no input available".into()))
    }
}

#[cfg(feature = "json")]
pub use stdio::StdioHost;

#[cfg(feature = "json")]
mod stdio {
    use std::io::{self, BufRead, Write};

    use super::Host;
    use crate::Error;
    use crate::ast::Value;
    use crate::json::parse_value;

    fn io_error(err: &io::Error) -> Error {
        Error::EvalError(format!("I/O error: {err}"))
    }

    /// Host bound to the process: emitted values go to stdout, inputs come
    /// from a fixed argument or, failing that, one line of stdin per request.
    #[derive(Debug, Default)]
    pub struct StdioHost {
        argument: Option<Value>,
    }

    impl StdioHost {
        pub fn new() -> Self {
            Self::default()
        }

        /// Serve `argument` as the last input instead of reading stdin
        pub fn with_argument(argument: Value) -> Self {
            StdioHost {
                argument: Some(argument),
            }
        }
    }

    impl Host for StdioHost {
        fn emit(&mut self, value: &Value) -> Result<(), Error> {
            let mut out = io::stdout().lock();
            write!(out, "{value}").map_err(|e| io_error(&e))?;
            out.flush().map_err(|e| io_error(&e))
        }

        fn last_input(&mut self) -> Result<Value, Error> {
            if let Some(argument) = &self.argument {
                return Ok(argument.clone());
            }
            let mut line = String::new();
            let read = io::stdin()
                .lock()
                .read_line(&mut line)
                .map_err(|e| io_error(&e))?;
            if read == 0 {
                return Err(Error::EvalError("no input available".into()));
            }
            parse_value(line.trim_end_matches(['\r', '\n']))
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    #[test]
    fn test_recording_host_inputs() {
        let mut host = RecordingHost::with_inputs([val(3), val([1, 2])]);
        assert_eq!(host.last_input().unwrap(), val(3));
        assert_eq!(host.last_input().unwrap(), val([1, 2]));
        // Drained: the last input repeats
        assert_eq!(host.last_input().unwrap(), val([1, 2]));

        let mut empty = RecordingHost::new();
        assert!(matches!(empty.last_input(), Err(Error::EvalError(_))));
    }

    #[test]
    fn test_recording_host_emits_in_order() {
        let mut host = RecordingHost::new();
        host.emit(&val(1)).unwrap();
        host.emit(&val("ab")).unwrap();
        assert_eq!(host.emitted(), &[val(1), val("ab")]);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_stdio_host_argument() {
        let mut host = StdioHost::with_argument(val(4));
        assert_eq!(host.last_input().unwrap(), val(4));
        assert_eq!(host.last_input().unwrap(), val(4));
    }
}
