//! Error types shared by every crate in the `bn` workspace.
//!
//! Shaped after `radiate-error`: a small `ErrString` wrapper, a flat
//! `BnError` enum tagged by `ErrorCode`, and `bn_err!`/`bn_bail!`/`ensure!`
//! macros so call sites read the same as a `bail!`/`anyhow!` call without
//! pulling in a dynamic error type.

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

#[cfg(feature = "backtrace")]
use std::backtrace::Backtrace;

pub type BnResult<T> = Result<T, BnError>;

/// Tag for each error kind. Kept separate from `BnError` itself so callers
/// can match on the tag without destructuring the message payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidModel,
    InvalidDomain,
    IncompleteNetwork,
    EvidenceImpossible,
    Unfactorisable,
    Cancelled,
    Multiple,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Cow<'static, str>>> From<T> for ErrString {
    fn from(v: T) -> Self {
        Self(v.into())
    }
}

#[derive(Debug)]
pub enum BnError {
    /// Dimensions of π and Q disagree, or the rate matrix is non-finite.
    InvalidModel { message: ErrString },
    /// A value is not a member of the variable's declared enumerable domain.
    InvalidDomain { message: ErrString },
    /// A relevant node has no distribution, or the network graph has a cycle.
    IncompleteNetwork { message: ErrString },
    /// Total weight is zero under the supplied evidence.
    EvidenceImpossible { message: ErrString },
    /// A density-carrying node without enumerable parents was met
    /// non-evidenced in a query.
    Unfactorisable { message: ErrString },
    /// Cooperative cancellation fired during a long-running reconstruction.
    Cancelled,

    Multiple(MultiDisplay),

    Context {
        context: ErrorContext,
        source: Box<BnError>,
        #[cfg(feature = "backtrace")]
        backtrace: Backtrace,
    },
}

impl BnError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidModel { .. } => ErrorCode::InvalidModel,
            Self::InvalidDomain { .. } => ErrorCode::InvalidDomain,
            Self::IncompleteNetwork { .. } => ErrorCode::IncompleteNetwork,
            Self::EvidenceImpossible { .. } => ErrorCode::EvidenceImpossible,
            Self::Unfactorisable { .. } => ErrorCode::Unfactorisable,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Multiple(_) => ErrorCode::Multiple,
            Self::Context { .. } => ErrorCode::Context,
        }
    }

    pub fn with_context(self, msg: impl Into<String>) -> Self {
        BnError::Context {
            context: ErrorContext::new(msg),
            source: Box::new(self),
            #[cfg(feature = "backtrace")]
            backtrace: Backtrace::capture(),
        }
    }
}

impl Display for BnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidModel { message } => write!(f, "invalid model: {}", message),
            Self::InvalidDomain { message } => write!(f, "invalid domain: {}", message),
            Self::IncompleteNetwork { message } => write!(f, "incomplete network: {}", message),
            Self::EvidenceImpossible { message } => {
                write!(f, "evidence has probability zero: {}", message)
            }
            Self::Unfactorisable { message } => write!(f, "unfactorisable node: {}", message),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Multiple(m) => write!(f, "multiple errors:\n{}", m),
            Self::Context {
                context, source, ..
            } => write!(f, "{}\nCaused by: {}", context, source),
        }
    }
}

impl std::error::Error for BnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct ErrorContext {
    message: String,
}

impl ErrorContext {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorContext {}

#[derive(Debug)]
pub struct MultiDisplay(Vec<BnError>);

impl Display for MultiDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "[{}] {} (code: {:?})", i, e, e.code())?;
        }
        Ok(())
    }
}

impl From<Vec<BnError>> for MultiDisplay {
    fn from(v: Vec<BnError>) -> Self {
        Self(v)
    }
}

impl From<Vec<BnError>> for BnError {
    fn from(v: Vec<BnError>) -> Self {
        BnError::Multiple(v.into())
    }
}

pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> BnResult<T>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> BnResult<T>;
}

impl<T, E: Into<BnError>> ResultExt<T> for Result<T, E> {
    fn context(self, msg: impl Into<String>) -> BnResult<T> {
        self.map_err(|e| e.into().with_context(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> BnResult<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[doc(hidden)]
pub mod __private {
    #[inline]
    #[cold]
    #[must_use]
    pub fn must_use<E>(e: E) -> E {
        e
    }
}

#[macro_export]
macro_rules! bn_err {
    (InvalidModel: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::BnError::InvalidModel { message: format!($fmt, $($arg),*).into() })
    };
    (InvalidDomain: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::BnError::InvalidDomain { message: format!($fmt, $($arg),*).into() })
    };
    (IncompleteNetwork: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::BnError::IncompleteNetwork { message: format!($fmt, $($arg),*).into() })
    };
    (EvidenceImpossible: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::BnError::EvidenceImpossible { message: format!($fmt, $($arg),*).into() })
    };
    (Unfactorisable: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::BnError::Unfactorisable { message: format!($fmt, $($arg),*).into() })
    };
}

#[macro_export]
macro_rules! bn_bail {
    ($($tt:tt)+) => { return Err($crate::bn_err!($($tt)+)) };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($tt:tt)+) => {
        if !$cond { $crate::bn_bail!($($tt)+); }
    };
}
