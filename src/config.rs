use std::path::PathBuf;

/// Interpreter and REPL settings. The binary fills this in from its
/// command line; embedders usually start from `Config::default()`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum slots in each heap arena (cons cells, objects, frames).
    pub heap_capacity: usize,
    /// Maximum nesting of eval calls before `DepthExceeded`.
    pub max_depth: usize,
    /// Bytes of native stack evaluation may use before `DepthExceeded`.
    /// Must stay below the stack size of the thread that evaluates.
    pub max_stack: usize,
    /// Maximum macro substitutions per top-level expansion.
    pub max_expansions: usize,
    /// Allocations between collections (top-level forms and LOOP iterations).
    pub gc_threshold: usize,
    /// Primary REPL prompt.
    pub prompt: String,
    /// Source files evaluated after the prelude, before the REPL starts.
    pub bootstrap: Vec<PathBuf>,
    /// Whether to evaluate the embedded prelude (DEFUN, IF, ...).
    pub load_prelude: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            heap_capacity: 4 * 1024 * 1024,
            max_depth: 1000,
            // Rust spawns threads with 2 MiB stacks by default.
            max_stack: 1024 * 1024,
            max_expansions: 10_000,
            gc_threshold: 64 * 1024,
            prompt: "> ".to_string(),
            bootstrap: Vec::new(),
            load_prelude: true,
        }
    }
}
