//! Message validation
//!
//! Validators gate dispatch: a handler with an attached validator is never
//! invoked with a message the validator rejected. The [`Validator`] trait is
//! the seam; [`MessageSchema`] is a small declarative implementation that
//! checks argument shape against expected type tags. Richer schema systems
//! plug in through the trait.

use rosc::{OscMessage, OscType};
use thiserror::Error;

use crate::{Pattern, Result};

/// A rejected message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

/// Structural validation of a decoded message
pub trait Validator: Send + Sync {
    fn validate(&self, message: &OscMessage) -> std::result::Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&OscMessage) -> std::result::Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, message: &OscMessage) -> std::result::Result<(), ValidationError> {
        self(message)
    }
}

/// Expected argument type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSpec {
    /// 32-bit integer (`i`)
    Int,
    /// 64-bit integer (`h`)
    Long,
    /// 32-bit float (`f`)
    Float,
    /// 64-bit float (`d`)
    Double,
    /// String (`s`)
    String,
    /// Blob (`b`)
    Blob,
    /// Boolean (`T`/`F`)
    Bool,
    /// Character (`c`)
    Char,
    /// Timetag (`t`)
    Time,
    /// Array (`[...]`)
    Array,
    /// Any argument type
    Any,
}

impl ArgSpec {
    fn admits(&self, arg: &OscType) -> bool {
        match self {
            ArgSpec::Int => matches!(arg, OscType::Int(_)),
            ArgSpec::Long => matches!(arg, OscType::Long(_)),
            ArgSpec::Float => matches!(arg, OscType::Float(_)),
            ArgSpec::Double => matches!(arg, OscType::Double(_)),
            ArgSpec::String => matches!(arg, OscType::String(_)),
            ArgSpec::Blob => matches!(arg, OscType::Blob(_)),
            ArgSpec::Bool => matches!(arg, OscType::Bool(_)),
            ArgSpec::Char => matches!(arg, OscType::Char(_)),
            ArgSpec::Time => matches!(arg, OscType::Time(_)),
            ArgSpec::Array => matches!(arg, OscType::Array(_)),
            ArgSpec::Any => true,
        }
    }
}

/// Declarative message shape: an optional address pattern plus expected
/// argument types, in order.
#[derive(Debug, Clone, Default)]
pub struct MessageSchema {
    address: Option<Pattern>,
    args: Vec<ArgSpec>,
    allow_trailing: bool,
}

impl MessageSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the message address to match a pattern
    pub fn address(mut self, pattern: &str) -> Result<Self> {
        self.address = Some(Pattern::compile(pattern)?);
        Ok(self)
    }

    /// Require these argument types, in order
    pub fn args(mut self, specs: impl IntoIterator<Item = ArgSpec>) -> Self {
        self.args = specs.into_iter().collect();
        self
    }

    /// Permit extra arguments beyond the declared ones
    pub fn allow_trailing(mut self) -> Self {
        self.allow_trailing = true;
        self
    }
}

impl Validator for MessageSchema {
    fn validate(&self, message: &OscMessage) -> std::result::Result<(), ValidationError> {
        if let Some(pattern) = &self.address {
            if !pattern.matches(&message.addr) {
                return Err(ValidationError(format!(
                    "address {} does not match {}",
                    message.addr, pattern
                )));
            }
        }

        if message.args.len() < self.args.len()
            || (!self.allow_trailing && message.args.len() > self.args.len())
        {
            return Err(ValidationError(format!(
                "expected {} args, got {}",
                self.args.len(),
                message.args.len()
            )));
        }

        for (i, (spec, arg)) in self.args.iter().zip(message.args.iter()).enumerate() {
            if !spec.admits(arg) {
                return Err(ValidationError(format!(
                    "arg {} has unexpected type {:?}",
                    i, arg
                )));
            }
        }

        Ok(())
    }
}
