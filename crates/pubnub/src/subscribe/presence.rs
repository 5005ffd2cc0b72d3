//! Presence heartbeat loop

use std::sync::Weak;
use std::time::Duration;

use pubnub_common::RequestKind;
use tokio::time::MissedTickBehavior;

use super::SubscribeMultiplexer;
use crate::request::endpoints;
use crate::request::one_shot::OneShot;

/// Delay between presence heartbeats: half the heartbeat minus one second,
/// at least one second
pub fn heartbeat_interval(heartbeat: u64) -> Duration {
    Duration::from_secs((heartbeat / 2).saturating_sub(1).max(1))
}

/// Keep an origin's presence alive while it has a subscription
pub(super) async fn respirate(mux: Weak<SubscribeMultiplexer>, origin: String, heartbeat: u64) {
    let mut interval = tokio::time::interval(heartbeat_interval(heartbeat));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        interval.tick().await;

        let Some(mux) = mux.upgrade() else {
            break;
        };

        let spec = {
            let states = mux.states.read();
            let Some(state) = states.get(&origin).filter(|state| !state.is_empty()) else {
                break;
            };
            let targets = state.targets();
            endpoints::heartbeat(
                &origin,
                &mux.settings.subscribe_key,
                &targets.path_names(),
                &targets.channel_groups,
                heartbeat,
                mux.settings.state.get(&origin),
            )
        };

        let strategy = OneShot::new(RequestKind::Heartbeat, None);
        match mux.engine.execute(&spec, &strategy).await {
            Ok(envelopes) => {
                if let Some(error) = envelopes.first().and_then(|e| e.error()) {
                    tracing::warn!("Presence heartbeat on {} rejected: {}", origin, error);
                }
            }
            Err(err) => tracing::error!("Presence heartbeat on {} failed: {}", origin, err),
        }
    }

    tracing::debug!("Presence heartbeat loop on {} stopped", origin);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_interval() {
        assert_eq!(heartbeat_interval(60), Duration::from_secs(29));
        assert_eq!(heartbeat_interval(3), Duration::from_secs(1));
        assert_eq!(heartbeat_interval(1), Duration::from_secs(1));
    }
}
