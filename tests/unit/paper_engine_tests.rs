use std::collections::BTreeMap;

use session_supervisor::config::{GatewayConfig, GatewayCredentials, StrategyConfig};
use session_supervisor::engine::paper::{PaperEngine, StrategyStatus};
use session_supervisor::engine::{Gateway, Readiness, StrategyEngine};
use session_supervisor::AppError;

fn strategy(name: &str, class_name: &str) -> StrategyConfig {
    StrategyConfig {
        name: name.into(),
        class_name: class_name.into(),
        vt_symbol: "rb2410.SHFE".into(),
        setting: BTreeMap::new(),
    }
}

fn credentials() -> GatewayCredentials {
    GatewayCredentials::from_parts(&GatewayConfig::default(), "pw".into(), "code".into())
}

async fn assert_acknowledged(readiness: Readiness) {
    match readiness {
        Readiness::Acknowledged(rx) => rx.await.expect("ack fired"),
        Readiness::Unsignalled => panic!("paper engine should acknowledge"),
    }
}

#[tokio::test]
async fn connect_marks_gateway_connected_and_acknowledges() {
    let engine = PaperEngine::new("CTP", Vec::new());
    assert!(!engine.is_connected().await);

    let readiness = engine.connect(&credentials()).await.unwrap();
    assert_acknowledged(readiness).await;
    assert!(engine.is_connected().await);
}

#[tokio::test]
async fn full_lifecycle_reaches_trading() {
    let engine = PaperEngine::new("CTP", vec![strategy("atr_rsi", "AtrRsiStrategy")]);

    engine.initialize().await.unwrap();
    assert_eq!(engine.strategy_status("atr_rsi").await, Some(StrategyStatus::Loaded));

    let readiness = engine.init_all_strategies().await.unwrap();
    assert_acknowledged(readiness).await;
    assert_eq!(
        engine.strategy_status("atr_rsi").await,
        Some(StrategyStatus::Initialized)
    );

    engine.start_all_strategies().await.unwrap();
    assert_eq!(engine.strategy_status("atr_rsi").await, Some(StrategyStatus::Trading));
}

#[tokio::test]
async fn init_before_initialize_is_rejected() {
    let engine = PaperEngine::new("CTP", vec![strategy("atr_rsi", "AtrRsiStrategy")]);
    let err = engine.init_all_strategies().await.unwrap_err();
    assert!(matches!(err, AppError::Engine(_)));
}

#[tokio::test]
async fn unknown_strategy_class_fails_initialize() {
    let engine = PaperEngine::new("CTP", vec![strategy("mystery", "NoSuchStrategy")]);
    match engine.initialize().await.unwrap_err() {
        AppError::Engine(msg) => assert!(msg.contains("NoSuchStrategy")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn start_without_init_leaves_strategies_loaded() {
    let engine = PaperEngine::new("CTP", vec![strategy("atr_rsi", "AtrRsiStrategy")]);
    engine.initialize().await.unwrap();

    engine.start_all_strategies().await.unwrap();
    assert_eq!(engine.strategy_status("atr_rsi").await, Some(StrategyStatus::Loaded));
}

#[tokio::test]
async fn unknown_strategy_has_no_status() {
    let engine = PaperEngine::new("CTP", Vec::new());
    assert_eq!(engine.strategy_status("ghost").await, None);
}
