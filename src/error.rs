use thiserror::Error;

use crate::check::CheckError;

/// A configuration-visible problem: missing file, bad YAML, unknown service
/// or method, dependency cycle, unresolved `$variable`, malformed timeout.
///
/// In non-verbose mode only the message of the first user-facing error in
/// the chain is printed; everything else gets the full diagnostic.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserError(pub String);

/// Wrap a message as a user-facing error.
pub fn user_error(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(UserError(message.into()))
}

/// Find the first user-facing message in an error chain, if any. Unknown
/// predicates and unknown expectation fields count as user-facing even
/// though they surface as check errors.
pub fn find_user_error(err: &anyhow::Error) -> Option<String> {
    for cause in err.chain() {
        if let Some(user) = cause.downcast_ref::<UserError>() {
            return Some(user.0.clone());
        }
        if let Some(check) = cause.downcast_ref::<CheckError>()
            && check.is_user()
        {
            return Some(check.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_user_error_surfaces_through_context() {
        let err = user_error("service foo is not defined in services.yaml")
            .context("loading test case login");
        let message = find_user_error(&err).expect("user error in chain");
        assert_eq!(message, "service foo is not defined in services.yaml");
    }

    #[test]
    fn test_plain_error_has_no_user_error() {
        let err = anyhow::anyhow!("descriptor pool construction failed");
        assert!(find_user_error(&err).is_none());
    }

    #[test]
    fn test_unknown_predicate_is_user_facing() {
        let err = anyhow::Error::new(CheckError::UnknownPredicate("near".to_string()))
            .context("response validation error");
        let message = find_user_error(&err).expect("user-facing check error");
        assert!(message.contains("near"));
    }

    #[test]
    fn test_kind_mismatch_is_internal() {
        let err = anyhow::Error::new(CheckError::UnsupportedKind {
            predicate: "gt",
            kind: "string",
        });
        assert!(find_user_error(&err).is_none());
    }
}
