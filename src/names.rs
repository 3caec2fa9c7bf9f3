use crate::error::{Result, RuntimeError};

fn token_violation(token: &str) -> Option<&'static str> {
    if token.is_empty() {
        Some("must not contain empty tokens")
    } else if token.starts_with(|c: char| c.is_ascii_digit()) {
        Some("tokens must not start with a digit")
    } else if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some("may only contain alphanumerics, underscores and '/'")
    } else {
        None
    }
}

pub(crate) fn validate_node_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.contains('/') {
        Some("must not contain '/'")
    } else {
        token_violation(name)
    };

    match reason {
        Some(reason) => Err(RuntimeError::InvalidNodeName {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Validates `name` and returns its fully qualified form.
///
/// Relative names resolve against the root namespace, so `topic` and
/// `/topic` refer to the same channel.
pub(crate) fn expand_topic_name(name: &str) -> Result<String> {
    let invalid = |reason| RuntimeError::InvalidTopicName {
        name: name.to_owned(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    let relative = name.strip_prefix('/').unwrap_or(name);
    if relative.is_empty() || relative.ends_with('/') {
        return Err(invalid("must not end with '/'"));
    }
    if let Some(reason) = relative.split('/').find_map(token_violation) {
        return Err(invalid(reason));
    }

    Ok(format!("/{relative}"))
}
