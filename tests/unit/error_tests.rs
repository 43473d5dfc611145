//! Unit tests for `AppError` display formats.

use skipper::AppError;

#[test]
fn display_uses_lowercase_category_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Provider("x".into()), "provider: x"),
        (AppError::Provisioning("x".into()), "provisioning: x"),
        (AppError::JoinTimeout("x".into()), "join timeout: x"),
        (AppError::AmbiguousJoin("x".into()), "ambiguous join: x"),
        (AppError::TaskLaunch("x".into()), "task launch: x"),
        (AppError::TaskStartTimeout("x".into()), "task start timeout: x"),
        (AppError::Tunnel("x".into()), "tunnel: x"),
        (AppError::ContainerNotFound("x".into()), "container not found: x"),
        (AppError::Exec("x".into()), "exec: x"),
        (AppError::OwnershipViolation("x".into()), "ownership violation: x"),
        (AppError::NoTaskSelected("x".into()), "no task selected: x"),
        (AppError::Aborted("x".into()), "aborted: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn keypair_inconsistent_names_both_sides_and_the_fix() {
    let err = AppError::KeypairInconsistent {
        name: "skipper-alice".into(),
        remote: true,
        local: false,
    };
    let text = err.to_string();
    assert!(text.contains("skipper-alice"));
    assert!(text.contains("remote: true, local: false"));
    assert!(text.contains("purgekeypair"));
}

#[test]
fn poll_timeout_reports_progress() {
    let err = AppError::PollTimeout {
        retired: 1,
        remaining: 2,
    };
    assert_eq!(
        err.to_string(),
        "poll timeout: 1 task(s) retired, 2 still pending"
    );
}

#[test]
fn insufficient_instances_points_at_terminate() {
    let text = AppError::InsufficientInstances(1).to_string();
    assert!(text.contains("1 running"));
    assert!(text.contains("--terminate"));
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg == "gone"));
}

#[test]
fn json_errors_convert_to_provider() {
    let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: AppError = json.into();
    assert!(err.to_string().starts_with("provider: unexpected response"));
}
