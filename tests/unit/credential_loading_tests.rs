//! Credential loading falls back to env vars when the keychain has no entry.
//!
//! Env vars are process-global, so these tests run serially.

use serial_test::serial;
use session_supervisor::config::{
    GatewayConfig, GatewayCredentials, AUTH_CODE_ENV, PASSWORD_ENV,
};
use session_supervisor::AppError;

fn gateway() -> GatewayConfig {
    GatewayConfig {
        user_id: "089131".into(),
        broker_id: "9999".into(),
        product_name: "simnow_client_test".into(),
        ..GatewayConfig::default()
    }
}

fn clear_env() {
    std::env::remove_var(PASSWORD_ENV);
    std::env::remove_var(AUTH_CODE_ENV);
}

#[tokio::test]
#[serial]
async fn env_vars_supply_secrets() {
    clear_env();
    std::env::set_var(PASSWORD_ENV, "hunter2");
    std::env::set_var(AUTH_CODE_ENV, "0000000000000000");

    let creds = GatewayCredentials::load(&gateway()).await.unwrap();
    clear_env();

    assert_eq!(creds.password, "hunter2");
    assert_eq!(creds.auth_code, "0000000000000000");
    assert_eq!(creds.user_id, "089131");
    assert_eq!(creds.product_name, "simnow_client_test");
}

#[tokio::test]
#[serial]
async fn missing_password_is_a_config_error() {
    clear_env();
    std::env::set_var(AUTH_CODE_ENV, "0000000000000000");

    let err = GatewayCredentials::load(&gateway()).await.unwrap_err();
    clear_env();

    match err {
        AppError::Config(msg) => assert!(msg.contains(PASSWORD_ENV), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn debug_output_redacts_secrets() {
    let creds = GatewayCredentials::from_parts(&gateway(), "hunter2".into(), "authcode42".into());
    let rendered = format!("{creds:?}");

    assert!(rendered.contains("089131"));
    assert!(rendered.contains("<redacted>"));
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("authcode42"));
}
