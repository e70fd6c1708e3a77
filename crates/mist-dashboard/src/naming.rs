//! Provider-specific machine name rules.

use crate::ProviderKind;
use crate::form::ValidationError;

/// Constraints a provider places on new machine names.
#[derive(Debug)]
pub struct NameRule {
    allowed: fn(char) -> bool,
    starts_with_letter: bool,
    min_len: usize,
    max_len: Option<usize>,
    message: &'static str,
}

impl NameRule {
    pub fn message(&self) -> &'static str {
        self.message
    }

    pub fn accepts(&self, name: &str) -> bool {
        let len = name.chars().count();
        if len < self.min_len || self.max_len.is_some_and(|max| len > max) {
            return false;
        }
        if self.starts_with_letter && !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        {
            return false;
        }
        name.chars().all(self.allowed)
    }
}

fn alnum_dash_underscore(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn alnum_dash_dot(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.'
}

fn alnum_dash(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

fn lower_digit_dash(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

fn alnum_underscore_dot_dash(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

static RULES: &[(ProviderKind, NameRule)] = &[
    (
        ProviderKind::NephoScale,
        NameRule {
            allowed: alnum_dash_underscore,
            starts_with_letter: false,
            min_len: 1,
            max_len: Some(64),
            message: "Server name in NephoScale may only contain letters, numbers, dashes and underscores, and must be 64 characters or less",
        },
    ),
    (
        ProviderKind::SoftLayer,
        NameRule {
            allowed: alnum_dash_dot,
            starts_with_letter: false,
            min_len: 1,
            max_len: None,
            message: "Server name in SoftLayer may only contain letters, numbers, dashes and dots",
        },
    ),
    (
        ProviderKind::HpCloud,
        NameRule {
            allowed: alnum_dash_underscore,
            starts_with_letter: false,
            min_len: 1,
            max_len: None,
            message: "Server name in HP Cloud may only contain letters, numbers, dashes and underscores",
        },
    ),
    (
        ProviderKind::Azure,
        NameRule {
            allowed: alnum_dash,
            starts_with_letter: true,
            min_len: 1,
            max_len: Some(63),
            message: "Cloud service name in Azure must start with a letter, may only contain letters, numbers and dashes, and must be 63 characters or less",
        },
    ),
    (
        ProviderKind::Gce,
        NameRule {
            allowed: lower_digit_dash,
            starts_with_letter: true,
            min_len: 1,
            max_len: Some(63),
            message: "Name in GCE must start with a letter, may only contain lowercase letters, numbers and dashes, and must be 63 characters or less",
        },
    ),
    (
        ProviderKind::Linode,
        NameRule {
            allowed: alnum_dash_underscore,
            starts_with_letter: true,
            min_len: 3,
            max_len: Some(32),
            message: "Server name in Linode must start with a letter, may only contain letters, numbers, dashes and underscores, and must be 3 to 32 characters long",
        },
    ),
    (
        ProviderKind::Docker,
        NameRule {
            allowed: alnum_underscore_dot_dash,
            starts_with_letter: false,
            min_len: 1,
            max_len: None,
            message: "Container name in Docker may only contain letters, numbers, underscores, dots and dashes",
        },
    ),
];

/// The name rule for a provider, if it has one.
pub fn rule_for(provider: ProviderKind) -> Option<&'static NameRule> {
    RULES
        .iter()
        .find(|(kind, _)| *kind == provider)
        .map(|(_, rule)| rule)
}

pub fn validate_name(provider: ProviderKind, name: &str) -> Result<(), ValidationError> {
    match rule_for(provider) {
        Some(rule) if !rule.accepts(name) => Err(ValidationError::InvalidName {
            provider,
            message: rule.message,
        }),
        _ => Ok(()),
    }
}
