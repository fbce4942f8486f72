mod support;

use std::{sync::Arc, time::Duration};

use referrer_core::{
    ConnectionState, ReferrerError, ReferrerResolver, ResolverConfig,
    port::scripted::{CompletionScript, PayloadScript, ScriptedConnector},
};
use referrer_model::StatusCode;
use support::{fixed_payload, manual_resolver};

#[tokio::test]
async fn timed_out_caller_leaves_other_waiters_intact() {
    let (resolver, connector) =
        manual_resolver(PayloadScript::Payload(fixed_payload()));
    let patient = resolver.subscribe();

    let impatient = resolver
        .get_attribution_within(Duration::from_millis(20))
        .await;

    assert_eq!(
        impatient,
        Err(ReferrerError::TimedOut(Duration::from_millis(20)))
    );
    assert_eq!(resolver.pending_waiters(), 1);
    assert_eq!(resolver.state(), ConnectionState::Connecting);

    assert!(connector.complete(StatusCode::Ok));
    assert_eq!(patient.await, Ok(fixed_payload()));
    assert_eq!(connector.stats().opens(), 1);
}

#[tokio::test]
async fn configured_timeout_bounds_a_silent_service() {
    let connector = Arc::new(ScriptedConnector::new(
        CompletionScript::Silent,
        PayloadScript::Payload(fixed_payload()),
    ));
    let config =
        ResolverConfig::default().with_request_timeout(Duration::from_millis(15));
    let resolver = ReferrerResolver::with_config(connector.clone(), config);

    let err = resolver.get_attribution().await.expect_err("timeout");

    assert!(matches!(err, ReferrerError::TimedOut(_)));
    assert_eq!(err.code(), "UNKNOWN");
    assert_eq!(resolver.state(), ConnectionState::Connecting);
    assert_eq!(resolver.pending_waiters(), 0);
    assert!(resolver.cached().is_none());
}

#[tokio::test]
async fn dropping_a_pending_request_withdraws_it() {
    let (resolver, connector) =
        manual_resolver(PayloadScript::Payload(fixed_payload()));
    let kept = resolver.subscribe();
    let dropped = resolver.subscribe();
    assert_eq!(resolver.pending_waiters(), 2);

    drop(dropped);
    assert_eq!(resolver.pending_waiters(), 1);

    assert!(connector.complete(StatusCode::Ok));
    assert_eq!(kept.await, Ok(fixed_payload()));
}
