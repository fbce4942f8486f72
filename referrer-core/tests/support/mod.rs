#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use referrer_core::{
    Outcome, ReferrerResolver,
    port::scripted::{CompletionScript, PayloadScript, ScriptedConnector},
};
use referrer_model::AttributionPayload;

pub fn fixed_payload() -> AttributionPayload {
    AttributionPayload {
        install_referrer: "utm_source=google-play&utm_medium=organic".into(),
        referrer_click_timestamp_seconds: 1_700_000_000,
        install_begin_timestamp_seconds: 1_700_000_042,
        referrer_click_timestamp_server_seconds: 1_700_000_001,
        install_begin_timestamp_server_seconds: 1_700_000_043,
        install_version: "2.3.1".into(),
        experiment_param: "true".into(),
    }
}

pub fn manual_resolver(
    payload: PayloadScript,
) -> (ReferrerResolver, Arc<ScriptedConnector>) {
    let connector = Arc::new(ScriptedConnector::manual(payload));
    (ReferrerResolver::new(connector.clone()), connector)
}

pub fn scripted_resolver(
    completion: CompletionScript,
    payload: PayloadScript,
) -> (ReferrerResolver, Arc<ScriptedConnector>) {
    let connector = Arc::new(ScriptedConnector::new(completion, payload));
    (ReferrerResolver::new(connector.clone()), connector)
}

/// Collects outcomes delivered to callback-style requests.
#[derive(Debug, Clone, Default)]
pub struct OutcomeSink {
    seen: Arc<Mutex<Vec<(usize, Outcome)>>>,
}

impl OutcomeSink {
    pub fn request(&self, resolver: &ReferrerResolver, caller: usize) {
        let seen = Arc::clone(&self.seen);
        resolver.request(move |outcome| {
            seen.lock().expect("sink lock").push((caller, outcome));
        });
    }

    pub fn outcomes(&self) -> Vec<(usize, Outcome)> {
        self.seen.lock().expect("sink lock").clone()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("sink lock").len()
    }
}
