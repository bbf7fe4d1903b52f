use session_supervisor::config::{WorkerConfig, AUTH_CODE_ENV, PASSWORD_ENV};
use session_supervisor::orchestrator::spawner::{
    CommandLauncher, WorkerExit, ALLOWED_ENV_VARS, WORKER_ID_ENV,
};

#[test]
fn exit_status_display() {
    assert_eq!(WorkerExit::with_code(0).to_string(), "exited normally (code 0)");
    assert_eq!(WorkerExit::with_code(3).to_string(), "exited with code 3");
    assert_eq!(WorkerExit::by_signal(9).to_string(), "terminated by signal 9");
}

#[test]
fn only_code_zero_is_success() {
    assert!(WorkerExit::with_code(0).success());
    assert!(!WorkerExit::with_code(1).success());
    assert!(!WorkerExit::by_signal(15).success());
}

#[test]
fn configured_program_overrides_default_args() {
    let worker = WorkerConfig {
        program: Some("/opt/trader/run-worker".into()),
        args: vec!["--live".into()],
        ..WorkerConfig::default()
    };
    let launcher = CommandLauncher::from_config(&worker, vec!["worker".into()]).unwrap();

    assert_eq!(launcher.program().to_str(), Some("/opt/trader/run-worker"));
    assert_eq!(launcher.args(), ["--live".to_owned()]);
}

#[test]
fn default_launcher_relaunches_current_executable() {
    let defaults = vec!["worker".to_owned(), "--config".to_owned(), "c.toml".to_owned()];
    let launcher = CommandLauncher::from_config(&WorkerConfig::default(), defaults.clone()).unwrap();

    assert_eq!(launcher.program(), std::env::current_exe().unwrap());
    assert_eq!(launcher.args(), defaults.as_slice());
}

#[test]
fn worker_environment_carries_credential_fallbacks() {
    assert!(ALLOWED_ENV_VARS.contains(&"PATH"));
    assert!(ALLOWED_ENV_VARS.contains(&PASSWORD_ENV));
    assert!(ALLOWED_ENV_VARS.contains(&AUTH_CODE_ENV));
    assert!(!ALLOWED_ENV_VARS.contains(&WORKER_ID_ENV));
}
