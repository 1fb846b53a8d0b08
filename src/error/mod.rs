//! Structured, classifiable errors.
//!
//! [`StructuredError`] is the one piece of the HTTP-agent/scheduler contract that
//! lives in the core proper (see `SPEC_FULL.md` §3): aggregation and the ignore-set
//! filter both key off [`ErrorCode`], so the classification contract has to be a
//! first-class type rather than an opaque `Box<dyn Error>`.
//!
//! Grounded on `examples/original_source/failure/{code,error,errors}.go`: a code
//! (`failure.Code`), a constructor that collapses a redundant re-wrap
//! (`failure.NewError`), and chain-walking classification queries (`failure.Is`,
//! `failure.GetErrorCode`).

mod classify;
mod code;
mod stack;

pub use code::ErrorCode;
pub use stack::{set_frame_filter, set_max_frames, Frame};

pub use classify::Canceled;

use std::error::Error as StdError;
use std::fmt;

/// Boxed, type-erased cause. `Send + Sync` so a `StructuredError` can cross the
/// task boundary a dispatched load-phase callback runs on.
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// An error tagged with an [`ErrorCode`], wrapping an underlying cause and carrying
/// a filtered capture of the call stack at construction time.
#[derive(Debug)]
pub struct StructuredError {
    code: ErrorCode,
    cause: Cause,
    stack: Vec<Frame>,
}

impl StructuredError {
    /// Builds a `StructuredError`, applying the pre-processing rules from
    /// `SPEC_FULL.md` §3 / `spec.md` §4.A in order:
    ///
    /// 1. if `cause` already carries `code` anywhere in its chain, it is returned
    ///    unchanged (no redundant wrapping layer);
    /// 2. a network-shaped cause reporting timeout/temporary rewrites `code`;
    /// 3. a cancellation or deadline marker in the chain rewrites `code` again,
    ///    taking priority over the network rewrite.
    pub fn new(code: ErrorCode, cause: impl Into<Cause>) -> Self {
        let cause: Cause = cause.into();
        match cause.downcast::<StructuredError>() {
            Ok(already) => {
                if already.is_code(&code) {
                    *already
                } else {
                    let resolved = Self::classify(already.as_ref(), code);
                    Self::build(resolved, already)
                }
            }
            Err(cause) => {
                let resolved = Self::classify(cause.as_ref(), code);
                Self::build(resolved, cause)
            }
        }
    }

    fn classify(cause: &(dyn StdError + 'static), requested: ErrorCode) -> ErrorCode {
        let mut code = requested;
        if classify::is_network_timeout(cause) {
            code = ErrorCode::TIMEOUT;
        } else if classify::is_network_temporary(cause) {
            code = ErrorCode::TEMPORARY;
        }
        if classify::is_canceled(cause) {
            code = ErrorCode::CANCELED;
        } else if classify::is_deadline_exceeded(cause) {
            code = ErrorCode::TIMEOUT;
        }
        code
    }

    fn build(code: ErrorCode, cause: Cause) -> Self {
        StructuredError {
            code,
            cause,
            stack: stack::capture(),
        }
    }

    /// The outermost code. Never fails to classify: construction always sets one.
    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    /// Captured frames, in capture order (outermost caller first).
    pub fn frames(&self) -> &[Frame] {
        &self.stack
    }

    /// Codes in unwrap order: `self.code` first, then one entry for every further
    /// `StructuredError` found while walking the `source()` chain.
    pub fn codes(&self) -> Vec<ErrorCode> {
        codes_of(self)
    }

    /// True iff `code` appears anywhere in [`Self::codes`].
    pub fn is_code(&self, code: &ErrorCode) -> bool {
        self.codes().iter().any(|c| c == code)
    }

    /// Verbose display: short form plus one line per captured frame.
    pub fn verbose(&self) -> String {
        use fmt::Write as _;
        let mut out = format!("{self}");
        for frame in &self.stack {
            let _ = write!(out, "\n  {frame}");
        }
        out
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.cause)
    }
}

impl StdError for StructuredError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// The outermost code of an arbitrary error, or [`ErrorCode::UNKNOWN`] if it is not
/// (or does not wrap) a [`StructuredError`].
pub fn code_of(err: &(dyn StdError + 'static)) -> ErrorCode {
    match err.downcast_ref::<StructuredError>() {
        Some(se) => se.code.clone(),
        None => ErrorCode::UNKNOWN,
    }
}

/// Codes in unwrap order, for an arbitrary error (not necessarily a `StructuredError`
/// itself — a plain error with no code yields an empty list).
pub fn codes_of(err: &(dyn StdError + 'static)) -> Vec<ErrorCode> {
    let mut out = Vec::new();
    let mut cur: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = cur {
        if let Some(se) = e.downcast_ref::<StructuredError>() {
            out.push(se.code.clone());
        }
        cur = e.source();
    }
    out
}

/// `true` iff `code` is present anywhere in `err`'s unwrap chain.
pub fn is_code(err: &(dyn StdError + 'static), code: &ErrorCode) -> bool {
    codes_of(err).iter().any(|c| c == code)
}
