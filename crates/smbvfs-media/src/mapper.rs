//! Maps raw backend failures onto [`SmbMediaErrorCode`].
//!
//! The mapping is an ordered rule table: failure classes first, then
//! case-insensitive markers found in the raw message, then `Unknown`.
//! The first rule that matches wins. Raw text is inspected here and then
//! dropped; only the code survives.

use crate::error::{BackendError, FailureClass, SmbMediaError, SmbMediaErrorCode};

/// One entry in the mapping table.
#[derive(Debug, Clone, Copy)]
enum Rule {
    /// The backend tagged the failure with this class.
    Class(FailureClass, SmbMediaErrorCode),
    /// The raw message contains this marker, ignoring ASCII case.
    Marker(&'static str, SmbMediaErrorCode),
}

/// Evaluated top to bottom. Markers are stored uppercase.
const RULES: &[Rule] = &[
    Rule::Class(FailureClass::Timeout, SmbMediaErrorCode::Timeout),
    Rule::Class(FailureClass::Transport, SmbMediaErrorCode::HostUnreachable),
    Rule::Marker("STATUS_LOGON_FAILURE", SmbMediaErrorCode::AuthFailed),
    Rule::Marker("STATUS_ACCESS_DENIED", SmbMediaErrorCode::PermissionDenied),
    Rule::Marker("STATUS_BAD_NETWORK_NAME", SmbMediaErrorCode::ShareNotFound),
    Rule::Marker("STATUS_OBJECT_NAME_NOT_FOUND", SmbMediaErrorCode::FileNotFound),
    Rule::Marker("CONNECTION_RESET", SmbMediaErrorCode::ConnectionReset),
    Rule::Class(FailureClass::BufferUnderrun, SmbMediaErrorCode::BufferUnderrun),
];

/// Classify a failure by class and raw message.
pub fn classify(class: FailureClass, raw_message: &str) -> SmbMediaErrorCode {
    let upper = raw_message.to_ascii_uppercase();
    RULES
        .iter()
        .find_map(|rule| match *rule {
            Rule::Class(c, code) if c == class => Some(code),
            Rule::Marker(marker, code) if upper.contains(marker) => Some(code),
            _ => None,
        })
        .unwrap_or(SmbMediaErrorCode::Unknown)
}

/// Sanitize a backend failure.
pub fn to_error(err: &BackendError) -> SmbMediaError {
    if let BackendError::Mapped(already) = err {
        return *already;
    }
    let code = classify(err.class(), &err.to_string());
    tracing::debug!(%code, "mapped backend failure");
    SmbMediaError::new(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn classes_win_over_markers() {
        let err = BackendError::timeout("STATUS_ACCESS_DENIED while waiting");
        assert_eq!(to_error(&err).code(), SmbMediaErrorCode::Timeout);

        let err = BackendError::transport("STATUS_LOGON_FAILURE");
        assert_eq!(to_error(&err).code(), SmbMediaErrorCode::HostUnreachable);
    }

    #[test]
    fn markers_match_case_insensitively() {
        let cases = [
            ("session setup: status_logon_failure", SmbMediaErrorCode::AuthFailed),
            ("Status_Access_Denied on open", SmbMediaErrorCode::PermissionDenied),
            ("tree connect STATUS_BAD_NETWORK_NAME", SmbMediaErrorCode::ShareNotFound),
            ("create: status_object_name_not_found", SmbMediaErrorCode::FileNotFound),
            ("socket connection_reset by peer", SmbMediaErrorCode::ConnectionReset),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                to_error(&BackendError::other(raw)).code(),
                expected,
                "{raw}"
            );
        }
    }

    #[test]
    fn first_marker_in_table_order_wins() {
        let raw = "STATUS_OBJECT_NAME_NOT_FOUND after STATUS_LOGON_FAILURE";
        assert_eq!(
            classify(FailureClass::Unclassified, raw),
            SmbMediaErrorCode::AuthFailed
        );
    }

    #[test]
    fn buffer_underrun_only_after_markers() {
        let err = BackendError::BufferUnderrun("CONNECTION_RESET mid-read".into());
        assert_eq!(to_error(&err).code(), SmbMediaErrorCode::ConnectionReset);

        let err = BackendError::BufferUnderrun("starved".into());
        assert_eq!(to_error(&err).code(), SmbMediaErrorCode::BufferUnderrun);
    }

    #[test]
    fn unmatched_is_unknown() {
        assert_eq!(
            to_error(&BackendError::other("")).code(),
            SmbMediaErrorCode::Unknown
        );
        assert_eq!(
            to_error(&BackendError::other("STATUS_NETWORK_NAME_DELETED")).code(),
            SmbMediaErrorCode::Unknown
        );
    }

    #[test]
    fn io_errors_use_kind_then_message() {
        let err = BackendError::from(io::Error::new(io::ErrorKind::TimedOut, "late"));
        assert_eq!(to_error(&err).code(), SmbMediaErrorCode::Timeout);

        let err = BackendError::from(io::Error::other("STATUS_ACCESS_DENIED"));
        assert_eq!(to_error(&err).code(), SmbMediaErrorCode::PermissionDenied);
    }

    #[test]
    fn mapped_errors_pass_through() {
        let err = BackendError::from(SmbMediaError::new(SmbMediaErrorCode::ShareNotFound));
        assert_eq!(to_error(&err).code(), SmbMediaErrorCode::ShareNotFound);
    }

    #[test]
    fn message_never_echoes_raw_text() {
        let err = BackendError::other("\\\\nas01.lan\\media hunter2 STATUS_ACCESS_DENIED");
        let mapped = to_error(&err);
        let shown = mapped.to_string();
        assert!(!shown.contains("nas01"));
        assert!(!shown.contains("hunter2"));
        assert_eq!(mapped.message(), SmbMediaErrorCode::PermissionDenied.message());
    }
}
