use constellation_api::errors::{ActivityError, ConstellationError};
use constellation_api::identifier::{ActivityIdentifier, ConstellationIdentifier};
use std::error::Error;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_context_error() {
        let error = ConstellationError::InvalidContext("tag must not be empty".to_string());
        assert_eq!(error.to_string(), "Invalid context: tag must not be empty");
        assert!(error.source().is_none());
    }

    #[test]
    fn test_illegal_state_error() {
        let error = ConstellationError::IllegalState("activity already completed".to_string());
        assert_eq!(error.to_string(), "Illegal state: activity already completed");
    }

    #[test]
    fn test_unknown_kind_error() {
        let error = ConstellationError::UnknownActivityKind("fib".to_string());
        assert_eq!(error.to_string(), "Unknown activity kind: fib");
    }

    #[test]
    fn test_not_running_error() {
        assert_eq!(ConstellationError::NotRunning.to_string(), "Constellation is not running");
    }

    #[test]
    fn test_other_error_is_transparent() {
        let error: ConstellationError = anyhow::anyhow!("peer vanished").into();
        assert_eq!(error.to_string(), "peer vanished");
    }

    #[test]
    fn test_activity_error() {
        let error = ActivityError::from("division by zero");
        assert_eq!(error.to_string(), "Activity fault: division by zero");
        assert_eq!(error, ActivityError::new(String::from("division by zero")));
    }

    #[test]
    fn test_identifier_display() {
        let executor = ConstellationIdentifier::new(2, 1);
        let activity = ActivityIdentifier::new(executor, 17, true);
        assert_eq!(executor.to_string(), "CID:2:1");
        assert_eq!(activity.to_string(), "AID:2:1:17");
        assert_eq!(activity.node(), 2);
    }
}
