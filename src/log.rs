//! Graduated trace levels shared by every analysis and parsing pass.
//!
//! The shape is lifted from the teacher crate's `Log<T>`: a small lattice of
//! verbosity levels, each optionally carrying a payload (a rule/production
//! label), compared by [`Log::order`] so call sites can write
//! `if level.order() >= Log::Success(()).order() { .. }` instead of matching
//! on every variant.

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Log<T> {
    None,
    Default(T),
    Success(T),
    Result(T),
    Verbose(T),
}

impl<T> Log<T> {
    pub fn order(&self) -> u8 {
        match self {
            Log::None => 0,
            Log::Default(_) => 1,
            Log::Success(_) => 2,
            Log::Result(_) => 3,
            Log::Verbose(_) => 4,
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Display for Log<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Log::None => write!(f, "none"),
            Log::Default(t) | Log::Success(t) | Log::Result(t) | Log::Verbose(t) => {
                write!(f, "{:?}", t)
            }
        }
    }
}

/// Trace toggles named in spec.md §6 "Configuration keys": one slot per
/// analysis pass plus the two parser stages, each independently gated.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceConfig {
    pub shallow: bool,
    pub deep: bool,
    pub follow: bool,
    pub lookahead: bool,
    pub parse: bool,
    pub actions: bool,
}
