// Copyright 2024 The Cascache Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small `Code`-tagged error type with tip-chaining, used across every
//! fallible boundary in this crate family instead of ad-hoc `String`/`anyhow`
//! errors.

use std::fmt;

/// Broad classification of failure, loosely mirroring gRPC status codes.
/// The HTTP transport is the only layer allowed to map a `Code` onto a
/// status code; every other layer should only ever branch on `Code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Unavailable,
    PermissionDenied,
    Unauthenticated,
    DeadlineExceeded,
    Internal,
    Unknown,
}

/// An error with a `Code` and an ordered list of human-readable tips
/// accumulated as the error propagates up the call stack.
#[derive(Clone, PartialEq, Eq)]
pub struct Error {
    pub code: Code,
    pub messages: Vec<String>,
}

impl Error {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Error {
            code,
            messages: vec![message.into()],
        }
    }

    /// Appends another tip to the message chain, returning `self` for
    /// convenient use in `.map_err(|e| e.append(...))` chains.
    pub fn append(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// Combines two results into a single error carrying both chains.
    /// `self` wins the `Code`; `other`'s messages are appended after
    /// `self`'s. Used to aggregate the outcome of operations that were
    /// joined concurrently (e.g. parallel store writes).
    pub fn merge(self, other: Result<(), Error>) -> Result<(), Error> {
        match other {
            Ok(()) => Err(self),
            Err(other_err) => {
                let mut messages = self.messages;
                messages.extend(other_err.messages);
                Err(Error {
                    code: self.code,
                    messages,
                })
            }
        }
    }

    pub fn to_std_err(&self) -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::Other, self.to_string())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {{ code: {:?}, messages: {:?} }}", self.code, self.messages)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.messages.join(" : "))
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(Code::Internal, format!("IO error: {e}"))
    }
}

/// Extension trait allowing any `Result<T, E: ToString>` to gain a tip
/// describing the boundary the error just crossed, in the style of the
/// teacher's `ResultExt::err_tip`.
pub trait ResultExt<T> {
    /// Attach a lazily-computed tip to the error, preserving its `Code`.
    fn err_tip<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        F: FnOnce() -> S,
        S: Into<String>;

    /// Like `err_tip`, but also overrides the `Code` for this hop.
    fn err_tip_with_code<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        F: FnOnce(&Error) -> (Code, S),
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn err_tip<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.append(tip_fn()))
    }

    fn err_tip_with_code<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        F: FnOnce(&Error) -> (Code, S),
        S: Into<String>,
    {
        self.map_err(|e| {
            let (code, msg) = tip_fn(&e);
            Error {
                code,
                messages: {
                    let mut m = e.messages;
                    m.push(msg.into());
                    m
                },
            }
        })
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn err_tip<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.ok_or_else(|| Error::new(Code::NotFound, tip_fn().into()))
    }

    fn err_tip_with_code<F, S>(self, tip_fn: F) -> Result<T, Error>
    where
        F: FnOnce(&Error) -> (Code, S),
        S: Into<String>,
    {
        match self {
            Some(v) => Ok(v),
            None => {
                let placeholder = Error::new(Code::NotFound, "");
                let (code, msg) = tip_fn(&placeholder);
                Err(Error::new(code, msg))
            }
        }
    }
}

/// Construct an `Error` with a formatted message, analogous to `format!`.
#[macro_export]
macro_rules! make_err {
    ($code:expr, $($arg:tt)+) => {
        $crate::Error::new($code, format!($($arg)+))
    };
}

/// Construct an `InvalidArgument` error — used for malformed client input.
#[macro_export]
macro_rules! make_input_err {
    ($($arg:tt)+) => {
        $crate::Error::new($crate::Code::InvalidArgument, format!($($arg)+))
    };
}

/// Early-return an `InvalidArgument` error if `cond` holds, in the style of
/// `anyhow::ensure!` but tied to our `Code`.
#[macro_export]
macro_rules! error_if {
    ($cond:expr, $($arg:tt)+) => {
        if $cond {
            return Err($crate::make_input_err!($($arg)+));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn err_tip_appends_message_and_keeps_code() {
        let err: Result<(), Error> = Err(Error::new(Code::NotFound, "missing"));
        let tipped = err.err_tip(|| "while looking up digest");
        let e = tipped.unwrap_err();
        assert_eq!(e.code, Code::NotFound);
        assert_eq!(e.messages, vec!["missing".to_string(), "while looking up digest".to_string()]);
    }

    #[test]
    fn merge_combines_both_chains() {
        let a = Error::new(Code::Internal, "a failed");
        let b: Result<(), Error> = Err(Error::new(Code::Internal, "b failed"));
        let merged = a.merge(b).unwrap_err();
        assert_eq!(merged.messages, vec!["a failed".to_string(), "b failed".to_string()]);
    }

    #[test]
    fn merge_with_ok_keeps_original_error() {
        let a = Error::new(Code::Internal, "a failed");
        let merged = a.clone().merge(Ok(())).unwrap_err();
        assert_eq!(merged, a);
    }
}
