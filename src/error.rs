use std::fmt;

/// Errors raised by the reader, expander and evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum LispError {
    /// Malformed token, unterminated list or string, stray ')'.
    Parse(String),

    /// Symbol lookup missed every frame.
    UnboundSymbol(String),

    /// Native function called with the wrong number of arguments.
    Arity {
        name: String,
        expected: i32,
        got: usize,
    },

    /// Operation applied to a value of the wrong kind (e.g. CAR of a symbol).
    Type(String),

    /// Special form with the wrong shape, e.g. (LAMBDA) or (COND X).
    MalformedForm(String),

    /// Explicit (ERROR x) with no handler to take it.
    User(String),

    /// Evaluation nested deeper than the configured limit.
    DepthExceeded(usize),

    /// Macro expansion did not reach a fixed point within the budget.
    ExpansionLimit(usize),

    /// The interrupt flag was raised.
    Interrupted,

    /// Heap capacity exceeded.
    HeapOverflow,

    /// READ hit the end of its input stream.
    EndOfInput,

    /// I/O error from stream operations.
    Io(String),
}

impl fmt::Display for LispError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LispError::Parse(msg) => write!(f, "Parse error: {}", msg),
            LispError::UnboundSymbol(name) => write!(f, "Error: unbound symbol '{}'", name),
            LispError::Arity {
                name,
                expected,
                got,
            } => write!(
                f,
                "Arity error: {} takes {} argument{}, got {}",
                name,
                expected,
                if *expected == 1 { "" } else { "s" },
                got
            ),
            LispError::Type(msg) => write!(f, "Type error: {}", msg),
            LispError::MalformedForm(msg) => write!(f, "Error: malformed {}", msg),
            LispError::User(what) => write!(f, "Error: {}", what),
            LispError::DepthExceeded(max) => {
                write!(f, "Error: evaluation depth limit exceeded (max: {})", max)
            }
            LispError::ExpansionLimit(max) => {
                write!(f, "Error: macro expansion did not terminate after {} passes", max)
            }
            LispError::Interrupted => write!(f, "Interrupted"),
            LispError::HeapOverflow => write!(f, "Error: heap capacity exceeded"),
            LispError::EndOfInput => write!(f, "Error: end of input"),
            LispError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for LispError {}

impl From<std::io::Error> for LispError {
    fn from(e: std::io::Error) -> Self {
        LispError::Io(e.to_string())
    }
}

pub type LispResult<T> = Result<T, LispError>;
