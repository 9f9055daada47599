/// Common utilities for handler implementations
///
/// ## Action labels
/// - Human readable verb for each operation kind
/// - Shared by the log lines of [`LoggingHandler`](super::LoggingHandler)
///   and the `curd` field of forwarded documents
use crate::types::OperationKind;

/// Label describing what happened to the document
pub fn action_label(operation: &OperationKind) -> String {
    match operation {
        OperationKind::Insert => "Inserted".to_string(),
        OperationKind::Update => "Updated".to_string(),
        OperationKind::Delete => "Deleted".to_string(),
        OperationKind::Command => "Cmd".to_string(),
        OperationKind::Noop => "No Op".to_string(),
        OperationKind::Unknown(code) => format!("Can't recognize: {}", code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_labels() {
        assert_eq!(action_label(&OperationKind::Insert), "Inserted");
        assert_eq!(action_label(&OperationKind::Update), "Updated");
        assert_eq!(action_label(&OperationKind::Delete), "Deleted");
        assert_eq!(action_label(&OperationKind::Command), "Cmd");
        assert_eq!(action_label(&OperationKind::Noop), "No Op");
        assert_eq!(
            action_label(&OperationKind::Unknown("xi".to_string())),
            "Can't recognize: xi"
        );
    }
}
