//! Declarative message validation
//!
//! A validator inspects a decoded message before it reaches a handler and
//! either accepts it or reports why it was rejected. The dispatcher treats
//! rejection as a guard (the handler is skipped), the call layer reports it
//! to the waiting caller.
//!
//! [`MessageSchema`] covers the common case of checking argument shape:
//!
//! ```
//! use oscpeer_core::{ArgKind, MessageSchema, Validate};
//! use rosc::{OscMessage, OscType};
//!
//! let schema = MessageSchema::new().arg(ArgKind::Int).arg(ArgKind::Str);
//! let msg = OscMessage {
//!     addr: "/test".to_string(),
//!     args: vec![OscType::Int(7), OscType::String("ok".to_string())],
//! };
//! assert!(schema.validate(&msg).is_ok());
//! ```
//!
//! Any `Fn(&OscMessage) -> Result<(), ValidationError>` is also a validator,
//! for checks a shape schema cannot express.

use rosc::{OscMessage, OscType};
use thiserror::Error;

/// Why a message was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expected {expected} arguments, got {got}")]
    ArgCount { expected: usize, got: usize },

    #[error("argument {index}: expected {expected:?}, got {got:?}")]
    ArgKind {
        index: usize,
        expected: ArgKind,
        got: ArgKind,
    },

    #[error("rejected: {0}")]
    Rejected(String),
}

/// The OSC type tag of an argument, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    Float,
    Str,
    Blob,
    Time,
    Long,
    Double,
    Char,
    Color,
    Midi,
    Bool,
    Array,
    Nil,
    Inf,
}

impl ArgKind {
    /// Kind of a concrete argument value.
    pub fn of(arg: &OscType) -> ArgKind {
        match arg {
            OscType::Int(_) => ArgKind::Int,
            OscType::Float(_) => ArgKind::Float,
            OscType::String(_) => ArgKind::Str,
            OscType::Blob(_) => ArgKind::Blob,
            OscType::Time(_) => ArgKind::Time,
            OscType::Long(_) => ArgKind::Long,
            OscType::Double(_) => ArgKind::Double,
            OscType::Char(_) => ArgKind::Char,
            OscType::Color(_) => ArgKind::Color,
            OscType::Midi(_) => ArgKind::Midi,
            OscType::Bool(_) => ArgKind::Bool,
            OscType::Array(_) => ArgKind::Array,
            OscType::Nil => ArgKind::Nil,
            OscType::Inf => ArgKind::Inf,
        }
    }
}

/// Accepts or rejects a decoded message.
pub trait Validate: Send + Sync {
    fn validate(&self, message: &OscMessage) -> Result<(), ValidationError>;
}

impl<F> Validate for F
where
    F: Fn(&OscMessage) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, message: &OscMessage) -> Result<(), ValidationError> {
        self(message)
    }
}

/// Positional argument-shape schema.
#[derive(Debug, Clone, Default)]
pub struct MessageSchema {
    args: Vec<ArgKind>,
    allow_extra: bool,
}

impl MessageSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an expected argument kind.
    pub fn arg(mut self, kind: ArgKind) -> Self {
        self.args.push(kind);
        self
    }

    /// Accept arguments beyond the declared positions.
    pub fn allow_extra(mut self) -> Self {
        self.allow_extra = true;
        self
    }
}

impl Validate for MessageSchema {
    fn validate(&self, message: &OscMessage) -> Result<(), ValidationError> {
        let got = message.args.len();
        let short = got < self.args.len();
        if short || (got > self.args.len() && !self.allow_extra) {
            return Err(ValidationError::ArgCount {
                expected: self.args.len(),
                got,
            });
        }
        for (index, (expected, arg)) in self.args.iter().zip(&message.args).enumerate() {
            let kind = ArgKind::of(arg);
            if kind != *expected {
                return Err(ValidationError::ArgKind {
                    index,
                    expected: *expected,
                    got: kind,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: "/test".to_string(),
            args,
        }
    }

    #[test]
    fn empty_schema_accepts_empty_message() {
        assert!(MessageSchema::new().validate(&msg(vec![])).is_ok());
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let schema = MessageSchema::new().arg(ArgKind::Int);
        let err = schema
            .validate(&msg(vec![OscType::String("seven".to_string())]))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::ArgKind {
                index: 0,
                expected: ArgKind::Int,
                got: ArgKind::Str,
            }
        );
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let schema = MessageSchema::new().arg(ArgKind::Int);
        assert!(schema.validate(&msg(vec![])).is_err());
        assert!(schema
            .validate(&msg(vec![OscType::Int(1), OscType::Int(2)]))
            .is_err());
    }

    #[test]
    fn allow_extra_accepts_trailing_args() {
        let schema = MessageSchema::new().arg(ArgKind::Int).allow_extra();
        assert!(schema
            .validate(&msg(vec![OscType::Int(1), OscType::Float(2.0)]))
            .is_ok());
        // declared positions are still checked
        assert!(schema.validate(&msg(vec![])).is_err());
    }

    #[test]
    fn closure_validator() {
        let positive = |message: &OscMessage| match message.args.first() {
            Some(OscType::Int(v)) if *v > 0 => Ok(()),
            _ => Err(ValidationError::Rejected("first arg must be > 0".into())),
        };
        assert!(positive.validate(&msg(vec![OscType::Int(3)])).is_ok());
        assert!(positive.validate(&msg(vec![OscType::Int(-3)])).is_err());
    }
}
