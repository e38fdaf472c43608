#![deny(missing_docs)]
#![feature(error_generic_member_access)]

//! This crate defines error & result types for vlheap.
//! It also contains a variety of useful macros for error handling.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{env, fmt, io};

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

#[allow(clippy::fallible_impl_from)]
impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    #[allow(clippy::panic)]
    fn from(msg: T) -> Self {
        if env::var("VLHEAP_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

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
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for vlheap.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum VlsError {
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(u64, u64, u64, Backtrace),
    /// An invalid argument was provided.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, Backtrace),
    /// Two shapes, or a shape and a coordinate, disagree in rank or extent.
    #[error("expected shape: {0} but instead got {1}\nBacktrace:\n{2}")]
    ShapeMismatch(ErrString, ErrString, Backtrace),
    /// Stored data references something that does not exist, e.g. a pointer beyond the heap.
    #[error("corrupt data: {0}\nBacktrace:\n{1}")]
    Corruption(ErrString, Backtrace),
    /// An error occurred while deserializing stored bytes.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidSerde(ErrString, Backtrace),
    /// An assertion failed.
    #[error("{0}\nBacktrace:\n{1}")]
    AssertionFailed(ErrString, Backtrace),
    /// A wrapper for other errors, carrying additional context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<VlsError>),
    /// A wrapper for IO errors.
    #[error("{0}\nBacktrace:\n{1}")]
    IOError(#[source] io::Error, Backtrace),
    /// A wrapper for errors from the serde_json library.
    #[cfg(feature = "serde")]
    #[error("{0}\nBacktrace:\n{1}")]
    SerdeJson(#[source] serde_json::Error, Backtrace),
}

impl VlsError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        VlsError::Context(msg.into(), Box::new(self))
    }

    /// Returns the innermost error, skipping over any context wrappers.
    pub fn root(&self) -> &VlsError {
        match self {
            VlsError::Context(_, inner) => inner.root(),
            other => other,
        }
    }

    /// Whether this error, or the error it wraps, reports corrupt stored data.
    pub fn is_corruption(&self) -> bool {
        matches!(self.root(), VlsError::Corruption(..))
    }
}

impl Debug for VlsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<io::Error> for VlsError {
    fn from(value: io::Error) -> Self {
        VlsError::IOError(value, Backtrace::capture())
    }
}

#[cfg(feature = "serde")]
impl From<serde_json::Error> for VlsError {
    fn from(value: serde_json::Error) -> Self {
        VlsError::SerdeJson(value, Backtrace::capture())
    }
}

/// A type alias for Results that return VlsErrors as their error type.
pub type VlsResult<T> = Result<T, VlsError>;

/// A convenient macro for creating a VlsError.
#[macro_export]
macro_rules! vls_err {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::VlsError::OutOfBounds($idx, $start, $stop, Backtrace::capture())
        )
    }};
    (ShapeMismatch: $expected:expr, $actual:expr $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::VlsError::ShapeMismatch(
                $expected.to_string().into(),
                $actual.to_string().into(),
                Backtrace::capture(),
            )
        )
    }};
    (Context: $msg:literal, $err:expr) => {{
        $crate::__private::must_use(
            $crate::VlsError::Context($msg.into(), Box::new($err))
        )
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::VlsError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
    ($variant:ident: $err:expr $(,)?) => {
        $crate::__private::must_use(
            $crate::VlsError::$variant($err)
        )
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::vls_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenient macro for returning a VlsError.
#[macro_export]
macro_rules! vls_bail {
    ($($tt:tt)+) => {
        return Err($crate::vls_err!($($tt)+))
    };
}

/// A convenient macro for panicking with a VlsError in the presence of a programmer error
/// (e.g., an invariant has been violated).
#[macro_export]
macro_rules! vls_panic {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        $crate::vls_panic!($crate::vls_err!(OutOfBounds: $idx, $start, $stop))
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::vls_panic!($crate::vls_err!($variant: $fmt, $($arg),*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::vls_panic!($crate::vls_err!($fmt, $($arg),*))
    };
    ($err:expr, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let err: $crate::VlsError = $err;
        panic!("{}", err.with_context(format!($fmt, $($arg),*)));
    }};
    ($err:expr) => {{
        let err: $crate::VlsError = $err;
        panic!("{}", err);
    }};
}

/// A trait for unwrapping a VlsResult.
pub trait VlsUnwrap {
    /// The type of the value being unwrapped.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug
    /// (programmer error).
    fn vls_unwrap(self) -> Self::Output;
}

impl<T, E> VlsUnwrap for Result<T, E>
where
    E: Into<VlsError>,
{
    type Output = T;

    #[inline(always)]
    fn vls_unwrap(self) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|err| vls_panic!(err))
    }
}

/// A trait for expect-ing a VlsResult or an Option.
pub trait VlsExpect {
    /// The type of the value being expected.
    type Output;

    /// Returns the value of the result if it is Ok, otherwise panics with the error.
    /// Should be called only in contexts where the error condition represents a bug
    /// (programmer error).
    fn vls_expect(self, msg: &str) -> Self::Output;
}

impl<T, E> VlsExpect for Result<T, E>
where
    E: Into<VlsError>,
{
    type Output = T;

    #[inline(always)]
    fn vls_expect(self, msg: &str) -> Self::Output {
        self.map_err(|err| err.into())
            .unwrap_or_else(|e| vls_panic!(e.with_context(msg.to_string())))
    }
}

impl<T> VlsExpect for Option<T> {
    type Output = T;

    #[inline(always)]
    fn vls_expect(self, msg: &str) -> Self::Output {
        self.unwrap_or_else(|| {
            let err = VlsError::AssertionFailed(msg.to_string().into(), Backtrace::capture());
            vls_panic!(err)
        })
    }
}

#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub const fn must_use(error: crate::VlsError) -> crate::VlsError {
        error
    }
}
