//! Notices collected while a response is read.

use mysqlx_protocol::{Notice, NoticeKind, Scalar, SessionStateParam, Warning};

/// Side information the server attached to a response.
///
/// Notices are never yielded as response units. They accumulate here and
/// feed the counters of the result types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Notices {
    /// Warnings in arrival order.
    pub warnings: Vec<Warning>,
    /// Rows the statement changed.
    pub rows_affected: Option<u64>,
    /// Rows the statement matched.
    pub rows_matched: Option<u64>,
    /// Rows a `SELECT` found.
    pub rows_found: Option<u64>,
    /// Last auto-increment value.
    pub last_insert_id: Option<u64>,
    /// `_id` values the server generated for added documents.
    pub generated_ids: Vec<String>,
    /// Informational messages.
    pub messages: Vec<String>,
    /// New default schema, when it changed.
    pub current_schema: Option<String>,
    /// Session variables that changed, in arrival order.
    pub variables: Vec<(String, Option<Scalar>)>,
}

impl Notices {
    /// Fold one notice into the collection.
    pub fn record(&mut self, notice: Notice) {
        match notice.kind {
            NoticeKind::Warning(warning) => {
                tracing::warn!(
                    level = ?warning.level,
                    code = warning.code,
                    message = %warning.msg,
                    "server warning"
                );
                self.warnings.push(warning);
            }
            NoticeKind::SessionVariableChanged { param, value } => {
                self.variables.push((param, value));
            }
            NoticeKind::SessionStateChanged { param, values } => {
                self.record_state(param, values);
            }
            NoticeKind::Other { frame_type, .. } => {
                tracing::trace!(frame_type, "ignoring notice");
            }
        }
    }

    fn record_state(&mut self, param: SessionStateParam, values: Vec<Scalar>) {
        let first = values.first();
        match param {
            SessionStateParam::RowsAffected => self.rows_affected = first.and_then(scalar_u64),
            SessionStateParam::RowsMatched => self.rows_matched = first.and_then(scalar_u64),
            SessionStateParam::RowsFound => self.rows_found = first.and_then(scalar_u64),
            SessionStateParam::GeneratedInsertId => {
                self.last_insert_id = first.and_then(scalar_u64);
            }
            SessionStateParam::GeneratedDocumentIds => {
                self.generated_ids
                    .extend(values.iter().filter_map(scalar_text));
            }
            SessionStateParam::ProducedMessage => {
                self.messages.extend(values.iter().filter_map(scalar_text));
            }
            SessionStateParam::CurrentSchema => {
                self.current_schema = first.and_then(scalar_text);
            }
            other => tracing::trace!(param = ?other, "ignoring session state notice"),
        }
    }

    /// Number of warnings.
    #[must_use]
    pub fn warnings_count(&self) -> usize {
        self.warnings.len()
    }
}

pub(crate) fn scalar_u64(value: &Scalar) -> Option<u64> {
    match value {
        Scalar::UInt(v) => Some(*v),
        Scalar::SInt(v) => u64::try_from(*v).ok(),
        _ => None,
    }
}

pub(crate) fn scalar_text(value: &Scalar) -> Option<String> {
    match value {
        Scalar::String(s) => Some(s.clone()),
        Scalar::Octets { value, .. } => std::str::from_utf8(value).ok().map(str::to_string),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mysqlx_protocol::WarningLevel;

    #[test]
    fn test_counters() {
        let mut notices = Notices::default();
        notices.record(Notice::state_changed(
            SessionStateParam::RowsAffected,
            vec![Scalar::UInt(2)],
        ));
        notices.record(Notice::state_changed(
            SessionStateParam::GeneratedInsertId,
            vec![Scalar::UInt(7)],
        ));
        assert_eq!(notices.rows_affected, Some(2));
        assert_eq!(notices.last_insert_id, Some(7));
    }

    #[test]
    fn test_generated_ids_keep_order() {
        let mut notices = Notices::default();
        notices.record(Notice::state_changed(
            SessionStateParam::GeneratedDocumentIds,
            vec![Scalar::from("b"), Scalar::from("a")],
        ));
        assert_eq!(notices.generated_ids, ["b", "a"]);
    }

    #[test]
    fn test_warnings() {
        let mut notices = Notices::default();
        notices.record(Notice::warning(WarningLevel::Warning, 1365, "Division by 0"));
        assert_eq!(notices.warnings_count(), 1);
        assert_eq!(notices.warnings[0].code, 1365);
    }
}
