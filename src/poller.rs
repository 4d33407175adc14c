//! Background loop that refreshes the [TargetStore] from every managed target.
//!
//! Each cycle works on a snapshot of the registry and polls up to
//! `max_concurrent_polls` targets at a time. Every target gets its own probe
//! and its own rcon session, and every failure is folded into that target's
//! [PollResult], so one broken server cannot hold up or spoil the others.

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use log::{debug, info, warn};
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};

use crate::{
    client::{Client, SessionOptions},
    config::Config,
    error::RconError,
    parser::StatusFields,
    probe,
    store::{TargetRegistry, TargetStore},
    target::{unix_now, PollResult, RconStatus, Target, TargetId, UNKNOWN_MAP},
};

/// Tally of one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub reachable: usize,
    pub authenticated: usize,
}

pub struct Poller {
    registry: Arc<TargetRegistry>,
    store: Arc<TargetStore>,
    config: Config,
}

impl Poller {
    pub fn new(registry: Arc<TargetRegistry>, store: Arc<TargetStore>, config: Config) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<TargetStore> {
        &self.store
    }

    /// Polls on a fixed start-to-start interval until `shutdown` turns true
    /// or its sender goes away. A cycle already running is finished first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "poller started, interval {:?}, up to {} targets at a time",
            self.config.poll_interval(),
            self.config.max_concurrent_polls
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            let report = self.poll_cycle().await;
            info!(
                "cycle done: {} polled, {} reachable, {} authenticated",
                report.polled, report.reachable, report.authenticated
            );
        }

        info!("poller stopped");
    }

    /// One pass over the targets registered right now. Targets added or
    /// removed meanwhile are picked up by the next cycle.
    pub async fn poll_cycle(&self) -> CycleReport {
        let targets = self.registry.snapshot();
        let mut report = CycleReport::default();

        let mut results = stream::iter(targets)
            .map(|target| async move { self.poll_target(&target).await })
            .buffer_unordered(self.config.max_concurrent_polls.max(1));

        while let Some(result) = results.next().await {
            report.polled += 1;
            if result.reachable {
                report.reachable += 1;
            }
            if result.rcon == RconStatus::Authenticated {
                report.authenticated += 1;
            }
            self.store.record(result);
        }

        report
    }

    /// Probes one target and, when it answers, queries it over rcon.
    /// Never fails; problems end up in the returned result.
    pub async fn poll_target(&self, target: &Target) -> PollResult {
        if !probe::is_reachable(&target.host, target.port, self.config.probe_timeout()).await {
            debug!("{} (#{}) is offline", target.name, target.id);
            return PollResult::offline(target.id);
        }

        let mut fields = self.prior_fields(target.id);
        let rcon = self.query_rcon(target, &mut fields).await;

        PollResult {
            target_id: target.id,
            reachable: true,
            rcon,
            players: fields.players,
            max_players: fields.max_players,
            map_name: fields.map_name,
            polled_at: unix_now(),
        }
    }

    fn prior_fields(&self, id: TargetId) -> StatusFields {
        match self.store.get(id) {
            Some(prior) => StatusFields {
                players: prior.players,
                max_players: prior.max_players,
                map_name: prior.map_name,
            },
            None => StatusFields {
                players: 0,
                max_players: 0,
                map_name: UNKNOWN_MAP.to_owned(),
            },
        }
    }

    async fn query_rcon(&self, target: &Target, fields: &mut StatusFields) -> RconStatus {
        let options = self.config.session_options();
        let mut attempt = 0;

        loop {
            match self.query_session(target, fields, options).await {
                Ok(()) => return RconStatus::Authenticated,
                Err(e) if e.is_frame_error() && attempt < self.config.frame_retries => {
                    attempt += 1;
                    warn!(
                        "{} (#{}): {}, retrying with a fresh session",
                        target.name, target.id, e
                    );
                }
                Err(e) => {
                    warn!("{} (#{}): rcon query failed: {}", target.name, target.id, e);
                    return status_for(&e);
                }
            }
        }
    }

    async fn query_session(
        &self,
        target: &Target,
        fields: &mut StatusFields,
        options: SessionOptions,
    ) -> Result<(), RconError> {
        let mut client = Client::new(options);
        client.connect(&target.host, target.rcon_port).await?;
        let result = self.run_queries(&mut client, target, fields).await;
        client.close().await;
        result
    }

    async fn run_queries(
        &self,
        client: &mut Client,
        target: &Target,
        fields: &mut StatusFields,
    ) -> Result<(), RconError> {
        client.authenticate(&target.rcon_password).await?;

        let status = client.command(&self.config.status_command).await?;
        if !fields.apply_status(status.body()) {
            debug!("{} (#{}): no player counts in status output", target.name, target.id);
        }

        let map = client.command(&self.config.map_command).await?;
        if !fields.apply_map(map.body()) {
            debug!("{} (#{}): no map name in output", target.name, target.id);
        }

        Ok(())
    }
}

fn status_for(error: &RconError) -> RconStatus {
    match error {
        RconError::Connect(_) => RconStatus::Unavailable,
        RconError::AuthRejected => RconStatus::AuthRejected,
        _ => RconStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn error_classification() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(status_for(&RconError::Connect(refused)), RconStatus::Unavailable);
        assert_eq!(status_for(&RconError::AuthRejected), RconStatus::AuthRejected);
        assert_eq!(
            status_for(&RconError::MalformedFrame { length: -1 }),
            RconStatus::Failed
        );
    }

    #[tokio::test]
    async fn empty_registry_cycle() {
        let poller = Poller::new(
            Arc::new(TargetRegistry::new()),
            Arc::new(TargetStore::new()),
            Config::default(),
        );

        assert_eq!(poller.poll_cycle().await, CycleReport::default());
        assert!(poller.store().is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let poller = Poller::new(
            Arc::new(TargetRegistry::new()),
            Arc::new(TargetStore::new()),
            Config::default(),
        );
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        time::timeout(std::time::Duration::from_secs(5), poller.run(rx))
            .await
            .unwrap();
    }
}
