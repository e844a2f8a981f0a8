use std::time::Duration;

use slipstream::{FailureKind, Result, SlipstreamError};

#[test]
fn test_error_display() {
    let err = SlipstreamError::ModelNotFound("gpt-5".to_string());
    assert!(err.to_string().contains("gpt-5"));

    let err = SlipstreamError::CacheCorrupt {
        digest: "abc123".into(),
        reason: "EOF while parsing".into(),
    };
    assert!(err.to_string().contains("abc123"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(SlipstreamError::NoProvider)
    }
    assert!(returns_error().is_err());
}

#[test]
fn io_and_json_errors_convert() {
    fn read() -> Result<()> {
        std::fs::read("/nonexistent/slipstream/file")?;
        Ok(())
    }
    fn parse() -> Result<serde_json::Value> {
        Ok(serde_json::from_str("{")?)
    }
    assert!(matches!(read(), Err(SlipstreamError::Io(_))));
    assert!(matches!(parse(), Err(SlipstreamError::Json(_))));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(SlipstreamError::RateLimited { retry_after: None }.is_transient());
    assert!(SlipstreamError::Http("connection reset".into()).is_transient());
    for status in [500, 502, 503, 504] {
        let err = SlipstreamError::Api {
            status,
            message: "upstream".into(),
        };
        assert!(err.is_transient(), "{status} should be transient");
        assert_eq!(err.kind(), FailureKind::Transient);
    }
}

#[test]
fn permanent_errors() {
    let permanent = [
        SlipstreamError::Api {
            status: 400,
            message: "bad request".into(),
        },
        SlipstreamError::Api {
            status: 501,
            message: "not implemented".into(),
        },
        SlipstreamError::AuthenticationFailed,
        SlipstreamError::ModelNotFound("x".into()),
        SlipstreamError::EmptyResponse,
        SlipstreamError::InvalidResponse("expected value at line 1 column 1".into()),
        SlipstreamError::InvalidInput("x".into()),
        SlipstreamError::UnknownProvider("x".into()),
        SlipstreamError::NoProvider,
    ];
    for err in permanent {
        assert!(!err.is_transient(), "{err} should be permanent");
        assert_eq!(err.kind(), FailureKind::Permanent);
    }
}

#[test]
fn retry_after_only_from_rate_limit() {
    let hint = Duration::from_secs(7);
    assert_eq!(
        SlipstreamError::RateLimited {
            retry_after: Some(hint)
        }
        .retry_after(),
        Some(hint)
    );
    assert_eq!(SlipstreamError::Http("x".into()).retry_after(), None);
}

#[test]
fn failure_kind_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&FailureKind::Exhausted).unwrap(),
        "\"exhausted\""
    );
    assert_eq!(
        serde_json::from_str::<FailureKind>("\"transient\"").unwrap(),
        FailureKind::Transient
    );
}
