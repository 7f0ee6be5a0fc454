use std::fmt;

/// Machine-readable error codes for operator- and agent-friendly handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    DurationParseError,
    NoSuchItem,
    DuplicateItem,
    DependencyCycle,
    UnknownItemKind,
    AttrValidation,
    NodeLocked,
    LockCorrupt,
    LockCommentInvalid,
    RemoteCommandFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::DurationParseError => "E1003",
            Self::NoSuchItem => "E2001",
            Self::DuplicateItem => "E2002",
            Self::DependencyCycle => "E2003",
            Self::UnknownItemKind => "E2004",
            Self::AttrValidation => "E2005",
            Self::NodeLocked => "E5001",
            Self::LockCorrupt => "E5002",
            Self::LockCommentInvalid => "E5003",
            Self::RemoteCommandFailed => "E5004",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::DurationParseError => "Duration string parse error",
            Self::NoSuchItem => "Item not found",
            Self::DuplicateItem => "Duplicate item ID",
            Self::DependencyCycle => "Dependency cycle",
            Self::UnknownItemKind => "Unknown item kind",
            Self::AttrValidation => "Item attribute validation failed",
            Self::NodeLocked => "Node is hard-locked",
            Self::LockCorrupt => "Corrupted lock metadata",
            Self::LockCommentInvalid => "Invalid soft-lock comment",
            Self::RemoteCommandFailed => "Remote command failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .capstan/config.toml and retry."),
            Self::DurationParseError => {
                Some("Use whitespace-separated tokens like `1d 8h 30m` (units: y d h m s).")
            }
            Self::NoSuchItem => {
                Some("Check the dependency/trigger ID against the declared items.")
            }
            Self::DuplicateItem => Some("Each kind:name pair may be declared only once per node."),
            Self::DependencyCycle => {
                Some("Remove/adjust dependency links to keep the item graph acyclic.")
            }
            Self::UnknownItemKind => {
                Some("Register a validator for this item kind before building the plan.")
            }
            Self::AttrValidation => None,
            Self::NodeLocked => {
                Some("Let the other operator finish, or re-run with the override flag.")
            }
            Self::LockCorrupt => Some("Clear the lock directory on the node with `rm -R`."),
            Self::LockCommentInvalid => Some("Lock comments must not contain any newlines."),
            Self::RemoteCommandFailed => Some("Check connectivity and permissions on the node."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
