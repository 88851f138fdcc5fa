// sentinel/core/router/src/router.rs

use crate::classifier::{classify, ClassifierConfig};
use crate::rotation::{spawn_track, RotationConfig, RouterError, TrackHandle};
use sentinel_broker::{topics, Broker};
use sentinel_primitives::{ClassificationOutcome, Diagnostic, Track};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handles to the router task and its two track writers.
pub struct RouterHandles {
    pub router: JoinHandle<Result<(), RouterError>>,
    pub malicious: TrackHandle,
    pub normal: TrackHandle,
}

impl RouterHandles {
    /// Wait for the pipeline to finish and surface the first error.
    ///
    /// The router ends when the broker shuts down; its channel senders then
    /// drop and both writers seal their open file and exit. A writer that
    /// halts fatally mid-run is noticed by the router on the next
    /// diagnostic routed its way, which turns into a fatal router error
    /// here.
    pub async fn join(self) -> Result<(), RouterError> {
        let RouterHandles {
            router,
            malicious,
            normal,
        } = self;

        // Release our senders so the writers can observe channel closure
        // once the router's own clones are gone.
        let TrackHandle {
            tx,
            task: malicious_task,
        } = malicious;
        drop(tx);
        let TrackHandle {
            tx,
            task: normal_task,
        } = normal;
        drop(tx);

        let flatten = |joined: Result<Result<(), RouterError>, tokio::task::JoinError>| match joined
        {
            Ok(result) => result,
            Err(e) => Err(RouterError::Fatal {
                track: Track::Normal,
                reason: format!("task panicked: {e}"),
            }),
        };

        let routed = flatten(router.await);
        let sealed_malicious = flatten(malicious_task.await);
        let sealed_normal = flatten(normal_task.await);
        routed.and(sealed_malicious).and(sealed_normal)
    }
}

/// Subscribe to the broker and fan diagnostics out to the two rotating
/// tracks.
///
/// Messages on the alert topic are routed to the malicious track
/// regardless of the predicate; anything that does not deserialize into a
/// diagnostic is logged and dropped at the boundary.
pub fn spawn_router(
    broker: &Broker,
    classifier: ClassifierConfig,
    rotation: RotationConfig,
) -> Result<RouterHandles, RouterError> {
    let malicious = spawn_track(Track::Malicious, rotation.clone())?;
    let normal = spawn_track(Track::Normal, rotation)?;

    let malicious_tx = malicious.tx.clone();
    let normal_tx = normal.tx.clone();
    let mut subscription = broker.subscribe(topics::ALL);

    let router = tokio::spawn(async move {
        while let Some(message) = subscription.recv().await {
            let forced = message.topic.starts_with(topics::ALERT);
            if !forced && &*message.topic != topics::DIAG {
                continue;
            }

            let diagnostic: Diagnostic = match serde_json::from_slice(&message.payload) {
                Ok(diagnostic) => diagnostic,
                Err(e) => {
                    warn!(topic = %message.topic, error = %e, "dropping malformed message");
                    continue;
                }
            };

            let outcome = if forced {
                ClassificationOutcome::Malicious
            } else {
                classify(&diagnostic, &classifier)
            };
            let track = Track::from(outcome);
            debug!(key = %diagnostic.key(), %track, "routed diagnostic");

            let target = match track {
                Track::Malicious => &malicious_tx,
                Track::Normal => &normal_tx,
            };
            if target.send(diagnostic).await.is_err() {
                return Err(RouterError::Fatal {
                    track,
                    reason: "track writer stopped accepting diagnostics".to_string(),
                });
            }
        }
        Ok(())
    });

    Ok(RouterHandles {
        router,
        malicious,
        normal,
    })
}
