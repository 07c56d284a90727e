use blendscan::error::{BackendError, ExtractionError, ScanError};
use blendscan::models::{AbortKind, RunAbort};
use std::path::PathBuf;

#[test]
fn extraction_errors_map_to_distinct_exit_codes() {
    let cases: Vec<(ExtractionError, i32)> = vec![
        (ExtractionError::ContainerNotFound { path: PathBuf::from("x.blend") }, 3),
        (ExtractionError::InvalidContainer { path: PathBuf::from("x.txt") }, 3),
        (ExtractionError::Timeout { timeout: 120 }, 4),
        (ExtractionError::ExtractorNotFound { program: "blender".into() }, 5),
        (ExtractionError::SubprocessFailed { code: Some(1), stderr: "boom".into() }, 5),
        (ExtractionError::Cancelled, 130),
    ];

    for (error, code) in cases {
        let message = error.to_string();
        assert_eq!(ScanError::from(error).exit_code(), code, "{}", message);
    }
}

#[test]
fn backend_and_argument_errors() {
    assert_eq!(ScanError::from(BackendError::InitFailed("no model".into())).exit_code(), 6);
    assert_eq!(ScanError::InvalidArguments("bad".into()).exit_code(), 2);
    assert_eq!(ScanError::Report("disk full".into()).exit_code(), 1);
}

#[test]
fn only_run_wide_backend_errors_abort() {
    assert_eq!(
        RunAbort::from_backend_error(&BackendError::AuthFailed { status: 401 }).map(|a| a.kind),
        Some(AbortKind::AuthenticationFailed)
    );
    assert_eq!(
        RunAbort::from_backend_error(&BackendError::Unreachable {
            attempts: 4,
            message: "connection refused".into()
        })
        .map(|a| a.kind),
        Some(AbortKind::BackendUnreachable)
    );
    assert!(RunAbort::from_backend_error(&BackendError::Timeout { timeout: 60 }).is_none());
    assert!(RunAbort::from_backend_error(&BackendError::InvalidResponse("html".into())).is_none());
    assert!(RunAbort::from_backend_error(&BackendError::Rejected {
        status: 500,
        message: "oops".into()
    })
    .is_none());
}

#[test]
fn error_messages_carry_context() {
    let err = ExtractionError::SubprocessFailed {
        code: Some(2),
        stderr: "Error: Not a blend file".into(),
    };
    assert!(err.to_string().contains("Not a blend file"));

    let err = BackendError::Unreachable {
        attempts: 4,
        message: "connection refused".into(),
    };
    assert!(err.to_string().contains("4 attempt"));
}
