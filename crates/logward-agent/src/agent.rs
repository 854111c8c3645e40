//! The agent control loop.
//!
//! A single task drives everything, in this order on every tick:
//!
//! 1. poll each enabled collector for new events
//! 2. run them through the [`EventFilter`]
//! 3. cut ready batches into payloads and [`Spool::enqueue`] them
//! 4. reconnect the transport if needed and [`Spool::flush_some`]
//!
//! Collection never waits on the network. While the collector is down
//! payloads accumulate in the spool and are delivered once it returns.

use std::fs;
use std::future::Future;
use std::path::Path;
use std::time::Instant;

use logward_collect::{
    AuditdCollector, AuthLogCollector, BashHistoryCollector, Batcher, Collector, Event,
    EventFilter, SyslogCollector,
};
use logward_spool::{Placement, Spool, Transport};
use tokio::task;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::{AgentConfig, SourceKind};
use crate::error::{AgentError, Result};

/// Startup switches that come from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Read sources from their beginning even on a first run.
    pub from_begin: bool,
}

/// What one [`Agent::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Events produced by the collectors.
    pub collected: usize,
    /// Events that passed the filter.
    pub forwarded: usize,
    /// Payloads stored in the spool.
    pub enqueued: usize,
    /// Payloads acknowledged by the collector.
    pub delivered: usize,
}

/// A running agent: collectors, filter, batcher, spool and transport.
pub struct Agent<T: Transport> {
    config: AgentConfig,
    collectors: Vec<Box<dyn Collector>>,
    filter: EventFilter,
    batcher: Batcher,
    spool: Spool,
    transport: T,
    unreachable: bool,
}

impl<T: Transport> Agent<T> {
    /// Prepares the data directories, opens the spool and builds the
    /// enabled collectors.
    ///
    /// Without a tail state file, and unless `options.from_begin` is set,
    /// every collector skips the content already in its file.
    ///
    /// # Errors
    ///
    /// Returns an error if a data directory cannot be created or the spool
    /// cannot be opened.
    pub fn new(config: AgentConfig, transport: T, options: StartOptions) -> Result<Self> {
        for dir in [config.data_dir.clone(), config.spool_dir(), config.state_dir()] {
            create_dir(&dir)?;
        }

        let state_path = config.state_path();
        let had_state = state_path.exists();
        let spool = Spool::open(config.spool_dir(), config.send.ram_ring_capacity)?;

        let hostname = config.hostname();
        let mut collectors = build_collectors(&config, &hostname);
        info!(
            hostname = %hostname,
            data_dir = %config.data_dir.display(),
            sources = ?collectors.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "agent starting"
        );

        if options.from_begin {
            warn!("reading sources from the beginning");
        } else if had_state {
            info!(state = %state_path.display(), "resuming from saved offsets");
        } else {
            info!("first run, skipping existing log content");
            for collector in &mut collectors {
                collector.start_from_end();
            }
        }

        let batcher = Batcher::new(
            config.agent.database.clone(),
            config.agent.id.clone(),
            config.send.batch_size,
            config.send.interval(),
        );

        Ok(Self {
            filter: EventFilter::new(config.filter.clone()),
            config,
            collectors,
            batcher,
            spool,
            transport,
            unreachable: false,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns the spool.
    #[must_use]
    pub const fn spool(&self) -> &Spool {
        &self.spool
    }

    /// Returns the transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the number of events waiting for a batch.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.batcher.pending_len()
    }

    /// Runs one collect, enqueue and flush round.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let mut events = Vec::new();
        let timeout = self.config.send.poll_timeout();
        for collector in &mut self.collectors {
            collector.poll(timeout, &mut events);
        }
        report.collected = events.len();
        report.forwarded = self.accept(events);

        match self.batcher.take_ready(Instant::now()) {
            Ok(payloads) => report.enqueued = self.store(&payloads),
            Err(e) => warn!(error = %e, "cannot encode batch"),
        }

        report.delivered = self.deliver();
        report
    }

    /// Ticks every `send.tick_ms` until `shutdown` completes, then shuts
    /// down.
    ///
    /// Each tick runs inside `block_in_place`, so this must be awaited on a
    /// multi-threaded tokio runtime. A tick that overruns delays the next
    /// one rather than bunching them up.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown spill to disk fails.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            server = %self.config.server.address(),
            batch_size = self.config.send.batch_size,
            interval_secs = self.config.send.interval_secs,
            ram_ring_capacity = self.spool.memory_capacity(),
            "agent running"
        );
        let mut ticker = interval(self.config.send.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    let report = task::block_in_place(|| self.tick());
                    if report != TickReport::default() {
                        debug!(?report, "tick finished");
                    }
                }
            }
        }

        task::block_in_place(|| self.shutdown())
    }

    /// Moves everything still held in memory to disk.
    ///
    /// Correlation groups still open in collectors are emitted, pending
    /// events are batched regardless of the interval, and the spool's RAM
    /// tier is appended to its disk queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the disk queue cannot be written.
    pub fn shutdown(&mut self) -> Result<()> {
        info!("agent stopping");

        let mut events = Vec::new();
        for collector in &mut self.collectors {
            collector.finish(&mut events);
        }
        self.accept(events);

        match self.batcher.take_all() {
            Ok(payloads) => {
                self.store(&payloads);
            }
            Err(e) => warn!(error = %e, "cannot encode final batch"),
        }

        let moved = self.spool.drain_memory_to_disk()?;
        self.transport.close();
        info!(moved, "agent stopped");
        Ok(())
    }

    fn accept(&mut self, events: Vec<Event>) -> usize {
        let mut forwarded = 0;
        for event in events {
            if self.filter.allow(&event) {
                self.batcher.push(event);
                forwarded += 1;
            }
        }
        forwarded
    }

    fn store(&mut self, payloads: &[String]) -> usize {
        let mut stored = 0;
        for payload in payloads {
            match self.spool.enqueue(payload) {
                Ok(Placement::Skipped) => {}
                Ok(placement) => {
                    debug!(?placement, bytes = payload.len(), "payload enqueued");
                    stored += 1;
                }
                Err(e) => error!(error = %e, "payload lost: cannot enqueue"),
            }
        }
        stored
    }

    fn deliver(&mut self) -> usize {
        if !self.transport.is_connected() {
            if let Err(e) = self.transport.connect() {
                if self.unreachable {
                    debug!(error = %e, "collector still unreachable");
                } else {
                    warn!(error = %e, "collector unreachable, spooling payloads");
                    self.unreachable = true;
                }
                return 0;
            }
            if self.unreachable {
                info!("collector reachable again");
                self.unreachable = false;
            }
        }

        let outcome = self
            .spool
            .flush_some(&mut self.transport, self.config.send.flush_max_items);
        if outcome.halted {
            self.transport.close();
        }
        outcome.delivered
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| AgentError::DataDir {
        path: dir.to_path_buf(),
        source,
    })
}

fn build_collectors(config: &AgentConfig, hostname: &str) -> Vec<Box<dyn Collector>> {
    let state = config.state_path();
    config
        .sources
        .enabled()
        .map(|kind| {
            let path = config.sources.path(kind);
            let collector: Box<dyn Collector> = match kind {
                SourceKind::Auditd => Box::new(AuditdCollector::new(path, hostname, &state)),
                SourceKind::Syslog => Box::new(SyslogCollector::new(path, hostname, &state)),
                SourceKind::Auth => Box::new(AuthLogCollector::new(path, hostname, &state)),
                SourceKind::BashHistory => {
                    Box::new(BashHistoryCollector::new(path, hostname, &state))
                }
            };
            collector
        })
        .collect()
}
