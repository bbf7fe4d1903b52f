use session_supervisor::models::bootstrap::BootstrapState;

const ORDER: [BootstrapState; 7] = [
    BootstrapState::Created,
    BootstrapState::GatewayConnecting,
    BootstrapState::AwaitingConnectionSettle,
    BootstrapState::InitializingStrategies,
    BootstrapState::AwaitingInitSettle,
    BootstrapState::StrategiesRunning,
    BootstrapState::SteadyState,
];

#[test]
fn next_walks_the_fixed_order() {
    for pair in ORDER.windows(2) {
        assert_eq!(pair[0].next(), Some(pair[1]));
    }
    assert_eq!(BootstrapState::SteadyState.next(), None);
}

#[test]
fn only_single_forward_steps_are_allowed() {
    for (i, from) in ORDER.iter().enumerate() {
        for (j, to) in ORDER.iter().enumerate() {
            assert_eq!(
                from.can_transition_to(*to),
                j == i + 1,
                "{from} -> {to}"
            );
        }
    }
}

#[test]
fn serializes_as_snake_case() {
    let json = serde_json::to_string(&BootstrapState::AwaitingInitSettle).unwrap();
    assert_eq!(json, "\"awaiting_init_settle\"");

    let parsed: BootstrapState = serde_json::from_str("\"steady_state\"").unwrap();
    assert_eq!(parsed, BootstrapState::SteadyState);
}

#[test]
fn display_matches_wire_name() {
    for state in ORDER {
        assert_eq!(state.to_string(), state.as_str());
    }
    assert_eq!(BootstrapState::GatewayConnecting.as_str(), "gateway_connecting");
}
