//! Status values returned to the name service switch.

use std::{error, fmt};

//------------ Status --------------------------------------------------------

/// The status of a name service call.
///
/// The numeric values are those of glibc’s `enum nss_status`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(i32)]
pub enum Status {
    /// The buffer was too small. Retry with a larger one.
    TryAgain = -2,

    /// The directory could not be reached or used.
    Unavailable = -1,

    /// There is no such record or the enumeration has ended.
    NotFound = 0,

    /// A record was produced.
    Success = 1,
}

impl Status {
    pub fn to_int(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Status::TryAgain => "TRYAGAIN",
            Status::Unavailable => "UNAVAIL",
            Status::NotFound => "NOTFOUND",
            Status::Success => "SUCCESS",
        })
    }
}

//------------ Response ------------------------------------------------------

/// The outcome of a lookup or enumeration step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Response<T> {
    Success(T),
    NotFound,
    Unavailable,

    /// The caller’s buffer was exhausted.
    TryAgain,
}

impl<T> Response<T> {
    pub fn status(&self) -> Status {
        match self {
            Response::Success(_) => Status::Success,
            Response::NotFound => Status::NotFound,
            Response::Unavailable => Status::Unavailable,
            Response::TryAgain => Status::TryAgain,
        }
    }

    /// Returns the errno value to report alongside the status.
    ///
    /// Only buffer exhaustion sets errno, to `ERANGE`.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Response::TryAgain => Some(libc::ERANGE),
            _ => None,
        }
    }

    /// Converts into the record if there is one.
    pub fn ok(self) -> Option<T> {
        match self {
            Response::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, op: F) -> Response<U> {
        match self {
            Response::Success(value) => Response::Success(op(value)),
            Response::NotFound => Response::NotFound,
            Response::Unavailable => Response::Unavailable,
            Response::TryAgain => Response::TryAgain,
        }
    }
}

impl<T> From<LookupError> for Response<T> {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound => Response::NotFound,
            LookupError::Unavailable => Response::Unavailable,
        }
    }
}

//------------ LookupError ---------------------------------------------------

/// A search produced no entries.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LookupError {
    /// The directory has no matching entries.
    NotFound,

    /// The directory could not be reached or refused the search.
    Unavailable,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupError::NotFound => f.write_str("no matching entries"),
            LookupError::Unavailable => f.write_str("directory unavailable"),
        }
    }
}

impl error::Error for LookupError {}

//============ Testing =======================================================
