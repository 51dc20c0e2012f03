//! Upstream identifiers
//!
//! Chat and file ids come from callers (headers, request bodies, URL paths)
//! and end up as path segments of upstream URLs. nexos.ai issues them as
//! 36-character UUIDs; anything that could leave its path segment is refused.

use std::fmt;
use thiserror::Error;

/// Upper bound on accepted id length
///
/// Upstream ids are 36 characters. The slack lets configured aliases through.
const MAX_ID_LEN: usize = 64;

/// Which identifier failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Chat,
    File,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKind::Chat => write!(f, "chat id"),
            IdKind::File => write!(f, "file id"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdError {
    #[error("{0} is empty")]
    Empty(IdKind),

    #[error("{0} may only contain letters, digits, '_' and '-'")]
    InvalidChars(IdKind),

    #[error("{0} is longer than {MAX_ID_LEN} characters")]
    TooLong(IdKind),
}

fn validate(kind: IdKind, s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty(kind));
    }
    if s.len() > MAX_ID_LEN {
        return Err(IdError::TooLong(kind));
    }
    if !s
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(IdError::InvalidChars(kind));
    }
    Ok(())
}

macro_rules! upstream_id {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                validate($kind, &value)?;
                Ok($name(value))
            }
        }

        impl TryFrom<&str> for $name {
            type Error = IdError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                validate($kind, value)?;
                Ok($name(value.to_string()))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

upstream_id!(
    /// A nexos.ai conversation
    ChatId,
    IdKind::Chat
);

upstream_id!(
    /// A file generated inside a chat, as named in download URLs
    FileId,
    IdKind::File
);
