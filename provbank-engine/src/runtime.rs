//! Run orchestration.
//!
//! Lifecycle: start server → start clients → drive (active) or wait
//! (passive) → collect → stop → report. Every blocking wait has a timeout,
//! and `stop()` / STOP runs on every exit path — a failed run is torn down
//! exactly like a successful one, and whatever metrics were collected before
//! the failure survive into the report.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use provbank_config::{Mode, ScenarioRun, ScenarioSpec};
use provbank_coordination::coordinator::broadcast_start;
use provbank_coordination::{ControlMessage, Coordinator, NodeSession, ReportCollector};
use provbank_core::codec;
use provbank_core::metrics::{parse_receipt_log, MetricRecord, MetricsAggregator};
use provbank_core::sensors::{SensorSession, TrafficGenerator};
use provbank_core::time::Clock;
use provbank_core::NodeId;
use provbank_protocols::{ProtocolError, ProtocolPlugin, ServerHandle};
use provbank_simulator::{FailureAction, FailureInjector, LinkShaper, SendOutcome};
use provbank_telemetry::MetricsRecorder;

use crate::{EngineError, RunContext, RunReport, RunState};

/// Node identity of the orchestrating process itself.
const LOCAL_NODE: &str = "core";

/// Records per REPORT batch from a sensor node.
const REPORT_BATCH: usize = 500;

/// Owns one run end to end. The `ScenarioRun` freezes into the context at
/// construction; the orchestrator is the sole writer of the terminal state
/// and of the final result set.
pub struct Orchestrator {
    ctx: RunContext,
    plugin: Box<dyn ProtocolPlugin + Send>,
    injector: FailureInjector,
    shapers: HashMap<NodeId, LinkShaper>,
    aggregator: Mutex<MetricsAggregator>,
    recorder: MetricsRecorder,
}

impl Orchestrator {
    pub fn new(
        run: ScenarioRun,
        plugin: Box<dyn ProtocolPlugin + Send>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let injector = FailureInjector::new(&run.failure_schedule);
        let nodes: BTreeSet<NodeId> = run
            .scenario
            .populations
            .iter()
            .map(|p| p.node_id.clone())
            .collect();
        let mut shapers = HashMap::new();
        for node in nodes {
            let shaper = LinkShaper::from_profile(
                run.impairment_for(node.as_str()),
                link_seed(run.scenario.seed, &node),
                clock.as_ref(),
            );
            shapers.insert(node, shaper);
        }
        Self {
            ctx: RunContext::new(run, clock),
            plugin,
            injector,
            shapers,
            aggregator: Mutex::new(MetricsAggregator::new()),
            recorder: MetricsRecorder::new(),
        }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Executes a single-process run: the plugin's server and clients live
    /// here, and in active mode this loop drives every send.
    #[instrument(skip(self), fields(run_id = %self.ctx.run.run_id))]
    pub async fn execute(mut self) -> RunReport {
        let started_at_us = self.ctx.clock.now_us();
        let started = tokio::time::Instant::now();
        self.ctx.transition(RunState::Running);
        info!(
            "run starting: protocol={} mode={:?}",
            self.ctx.run.protocol.protocol_id, self.ctx.run.protocol.mode
        );

        let outcome = self.lifecycle().await;
        self.teardown().await;
        self.finish(started_at_us, started.elapsed(), outcome)
    }

    /// Executes the coordinator side of a distributed run: local server,
    /// remote senders. The coordinator must already be bound so sensor
    /// nodes know where to register.
    #[instrument(skip(self, coordinator), fields(run_id = %self.ctx.run.run_id))]
    pub async fn execute_distributed(mut self, mut coordinator: Coordinator) -> RunReport {
        let started_at_us = self.ctx.clock.now_us();
        let started = tokio::time::Instant::now();
        self.ctx.transition(RunState::Running);

        let outcome = self.coordinate(&mut coordinator).await;
        self.teardown().await;
        self.finish(started_at_us, started.elapsed(), outcome)
    }

    async fn lifecycle(&mut self) -> Result<(), EngineError> {
        let cfg = self.ctx.run.protocol.clone();
        let server = self.start_server_guarded(&cfg).await?;
        self.start_clients_guarded(&cfg).await?;
        match cfg.mode {
            Mode::Active => self.drive_active().await,
            Mode::Passive => self.run_passive(server).await,
        }
    }

    async fn start_server_guarded(
        &mut self,
        cfg: &provbank_config::ProtocolConfig,
    ) -> Result<ServerHandle, EngineError> {
        match tokio::time::timeout(cfg.start_timeout(), self.plugin.start_server(cfg)).await {
            Err(_) => Err(EngineError::StartTimeout {
                component: "start_server",
                timeout_ms: cfg.start_timeout_ms,
            }),
            Ok(Err(source)) => Err(self.plugin_error(source)),
            Ok(Ok(handle)) => Ok(handle),
        }
    }

    async fn start_clients_guarded(
        &mut self,
        cfg: &provbank_config::ProtocolConfig,
    ) -> Result<(), EngineError> {
        match tokio::time::timeout(cfg.start_timeout(), self.plugin.start_clients(cfg)).await {
            Err(_) => Err(EngineError::StartTimeout {
                component: "start_clients",
                timeout_ms: cfg.start_timeout_ms,
            }),
            Ok(Err(source)) => Err(self.plugin_error(source)),
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Active mode: one scheduling loop over every session's due-times.
    /// Records are stamped at the last moment, pushed through the link
    /// shaper, and accounted whether or not they survive it.
    async fn drive_active(&mut self) -> Result<(), EngineError> {
        let run = self.ctx.run.clone();
        let generator = TrafficGenerator::new(
            build_sessions(&run.scenario, None),
            run.scenario.duration(),
            run.scenario.seed,
        );
        let epoch = tokio::time::Instant::now();
        let mut dead: HashSet<NodeId> = HashSet::new();

        for emission in generator {
            tokio::time::sleep_until(epoch + Duration::from_micros(emission.due_us)).await;
            let offset = epoch.elapsed();

            for action in self.injector.drain_due(offset) {
                let FailureAction::TerminateNode(node) = action;
                warn!("crash injected: node {node} is down for the rest of the run");
                dead.insert(node);
            }

            if !self.plugin.is_alive() {
                return Err(self.plugin_error(ProtocolError::Runtime {
                    protocol: run.protocol.protocol_id.clone(),
                    reason: "terminated unexpectedly".to_string(),
                }));
            }

            let (packet, sent_at_us) = codec::stamp(
                emission.sequence,
                &emission.payload,
                self.ctx.clock.as_ref(),
            );
            let mut record = MetricRecord {
                node_id: emission.node_id.clone(),
                sequence: emission.sequence,
                sent_at_us,
                received_at_us: None,
            };
            self.recorder.records_sent.inc();

            if dead.contains(&emission.node_id)
                || self.injector.is_blackholed(&emission.node_id, offset)
            {
                self.recorder.records_dropped.inc();
                self.aggregator.lock().ingest(record);
                continue;
            }

            let shaper = self
                .shapers
                .entry(emission.node_id.clone())
                .or_insert_with(LinkShaper::unimpaired);
            match shaper
                .send_through(self.plugin.as_mut(), packet, self.ctx.clock.as_ref())
                .await
            {
                Ok(SendOutcome::Delivered(ack)) => {
                    record.received_at_us = ack.server_receipt_us;
                    match ack.server_receipt_us {
                        Some(received) => {
                            self.recorder.records_received.inc();
                            self.recorder
                                .send_latency_ms
                                .observe(received.saturating_sub(sent_at_us) as f64 / 1_000.0);
                        }
                        None => {
                            self.aggregator.lock().note_malformed();
                            self.recorder.records_dropped.inc();
                        }
                    }
                }
                Ok(SendOutcome::Dropped) => self.recorder.records_dropped.inc(),
                Err(e) if !e.is_fatal() => {
                    debug!("send timed out: {e}");
                    self.aggregator.lock().note_send_timeout();
                    self.recorder.records_dropped.inc();
                }
                Err(source) => {
                    self.aggregator.lock().ingest(record);
                    return Err(self.plugin_error(source));
                }
            }
            self.aggregator.lock().ingest(record);
        }

        tokio::time::sleep(run.protocol.drain_grace()).await;
        Ok(())
    }

    /// Passive mode: the plugin's own traffic runs for the scenario
    /// duration while this loop only watches liveness; records are
    /// reconstructed afterwards from the receipt log. Inherently less
    /// precise than active mode — the trade the mode exists to make.
    async fn run_passive(&mut self, server: ServerHandle) -> Result<(), EngineError> {
        let run = self.ctx.run.clone();
        let deadline = tokio::time::Instant::now() + run.scenario.duration();
        let mut cancelled = self.ctx.cancelled();

        loop {
            if !self.plugin.is_alive() {
                return Err(self.plugin_error(ProtocolError::Runtime {
                    protocol: run.protocol.protocol_id.clone(),
                    reason: "terminated unexpectedly".to_string(),
                }));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let step = std::cmp::min(deadline - now, Duration::from_millis(250));
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = cancelled.changed() => break,
            }
        }

        match &server.receipt_log {
            Some(path) => {
                let content = tokio::fs::read_to_string(path).await.unwrap_or_default();
                let records = parse_receipt_log(&NodeId::from(LOCAL_NODE), &content);
                info!("reconstructed {} records from receipt log", records.len());
                self.aggregator.lock().ingest_batch(records);
            }
            None => warn!("passive run exposed no receipt log; nothing to reconstruct"),
        }
        Ok(())
    }

    /// Coordinator flow: wait for registrations, hand offsets to the
    /// aggregator, broadcast the synchronized start, then fan in
    /// STATUS/REPORT until the collection deadline.
    async fn coordinate(&mut self, coordinator: &mut Coordinator) -> Result<(), EngineError> {
        let run = self.ctx.run.clone();
        let cfg = run
            .coordination
            .clone()
            .ok_or_else(|| EngineError::NotDistributed(run.run_id.clone()))?;

        let proto = run.protocol.clone();
        let _server = self.start_server_guarded(&proto).await?;

        let mut nodes = coordinator.collect_registrations(&cfg).await?;
        {
            let mut aggregator = self.aggregator.lock();
            for node in &nodes {
                aggregator.set_clock_offset(node.node_id.clone(), node.offset);
            }
        }

        let start_time_us = self.ctx.clock.now_us() + cfg.start_delay().as_micros() as u64;
        broadcast_start(&mut nodes, &run.scenario.scenario_id, start_time_us).await?;

        let mut collector = ReportCollector::start(nodes);
        let deadline = tokio::time::Instant::now()
            + cfg.start_delay()
            + run.scenario.duration()
            + cfg.report_grace();
        while let Some((node_id, message)) = collector.next_until(deadline).await {
            match message {
                ControlMessage::Report { records, .. } => {
                    debug!("REPORT from {node_id}: {} records", records.len());
                    self.aggregator.lock().ingest_batch(records);
                }
                ControlMessage::Status { sent, .. } => {
                    debug!("STATUS from {node_id}: {sent} sent");
                }
                other => debug!("ignoring {} from {node_id}", other.kind()),
            }
        }
        collector.broadcast_stop().await;
        collector.shutdown();
        Ok(())
    }

    /// Stop is idempotent and runs on every path, so no failed run is left
    /// without an explicit teardown.
    async fn teardown(&mut self) {
        if let Err(e) = self.plugin.stop().await {
            warn!("plugin stop during teardown failed: {e}");
        }
    }

    fn finish(
        &self,
        started_at_us: u64,
        elapsed: Duration,
        outcome: Result<(), EngineError>,
    ) -> RunReport {
        let state = match outcome {
            Ok(()) => {
                info!("run completed");
                RunState::Completed
            }
            Err(e) => {
                error!("run failed in {}: {e}", e.component());
                RunState::Failed {
                    component: e.component(),
                    reason: e.to_string(),
                }
            }
        };
        self.ctx.transition(state.clone());

        let aggregator = self.aggregator.lock();
        let run = &self.ctx.run;
        RunReport {
            run_id: run.run_id.clone(),
            scenario_id: run.scenario.scenario_id.clone(),
            protocol_id: run.protocol.protocol_id.clone(),
            mode: run.protocol.mode,
            state,
            started_at_us,
            duration_secs: elapsed.as_secs_f64(),
            statistics: aggregator.finalize(elapsed),
            throughput_windows: aggregator.windowed_throughput(Duration::from_secs(1)),
        }
    }

    fn plugin_error(&self, source: ProtocolError) -> EngineError {
        EngineError::Plugin {
            node: NodeId::from(LOCAL_NODE),
            protocol: self.ctx.run.protocol.protocol_id.clone(),
            source,
        }
    }
}

/// Sensor-node side of a distributed run: register, synchronize, drive the
/// local shard through the local plugin and link shaper, report in batches.
/// A scheduled crash on this node terminates it mid-run with no restart and
/// no farewell — exactly what an unrecovered failure looks like from the
/// coordinator.
#[instrument(skip(run, plugin, clock), fields(node = %node_id))]
pub async fn run_sensor_node(
    coordinator_addr: SocketAddr,
    node_id: NodeId,
    run: ScenarioRun,
    mut plugin: Box<dyn ProtocolPlugin + Send>,
    clock: Arc<dyn Clock>,
) -> Result<(), EngineError> {
    let sensor_count: u32 = run
        .scenario
        .populations
        .iter()
        .filter(|p| p.node_id == node_id)
        .map(|p| p.count)
        .sum();
    let mut session = NodeSession::connect(
        coordinator_addr,
        node_id.clone(),
        sensor_count,
        clock.clone(),
    )
    .await?;

    let outcome = node_lifecycle(&mut session, &mut plugin, &run, &node_id, &clock).await;
    if let Err(e) = plugin.stop().await {
        warn!("plugin stop on node {node_id} failed: {e}");
    }
    outcome
}

async fn node_lifecycle(
    session: &mut NodeSession,
    plugin: &mut Box<dyn ProtocolPlugin + Send>,
    run: &ScenarioRun,
    node_id: &NodeId,
    clock: &Arc<dyn Clock>,
) -> Result<(), EngineError> {
    let proto = &run.protocol;
    match tokio::time::timeout(proto.start_timeout(), plugin.start_clients(proto)).await {
        Err(_) => {
            return Err(EngineError::StartTimeout {
                component: "start_clients",
                timeout_ms: proto.start_timeout_ms,
            })
        }
        Ok(Err(source)) => {
            return Err(EngineError::Plugin {
                node: node_id.clone(),
                protocol: proto.protocol_id.clone(),
                source,
            })
        }
        Ok(Ok(_)) => {}
    }

    let start_wait = run
        .coordination
        .as_ref()
        .map(|c| c.register_timeout())
        .unwrap_or(Duration::from_secs(30));
    let (_, start_time_us) = session.await_start(start_wait).await?;
    session.wait_until(session.to_local_us(start_time_us)).await;

    let mut shaper = LinkShaper::from_profile(
        run.impairment_for(node_id.as_str()),
        link_seed(run.scenario.seed, node_id),
        clock.as_ref(),
    );
    let mut injector = FailureInjector::new(&run.failure_schedule);
    let generator = TrafficGenerator::new(
        build_sessions(&run.scenario, Some(node_id)),
        run.scenario.duration(),
        link_seed(run.scenario.seed, node_id),
    );

    let epoch = tokio::time::Instant::now();
    let mut batch: Vec<MetricRecord> = Vec::new();
    let mut sent_total = 0u64;

    for emission in generator {
        tokio::time::sleep_until(epoch + Duration::from_micros(emission.due_us)).await;
        let offset = epoch.elapsed();

        for action in injector.drain_due(offset) {
            let FailureAction::TerminateNode(target) = action;
            if target == *node_id {
                warn!("node {node_id} crashing on schedule; unsent records die with it");
                return Ok(());
            }
        }

        if !plugin.is_alive() {
            return Err(EngineError::Plugin {
                node: node_id.clone(),
                protocol: run.protocol.protocol_id.clone(),
                source: ProtocolError::Runtime {
                    protocol: run.protocol.protocol_id.clone(),
                    reason: "terminated unexpectedly".to_string(),
                },
            });
        }

        let (packet, sent_at_us) =
            codec::stamp(emission.sequence, &emission.payload, clock.as_ref());
        let mut record = MetricRecord {
            node_id: node_id.clone(),
            sequence: emission.sequence,
            sent_at_us,
            received_at_us: None,
        };
        sent_total += 1;

        if injector.is_blackholed(node_id, offset) {
            batch.push(record);
        } else {
            match shaper
                .send_through(plugin.as_mut(), packet, clock.as_ref())
                .await
            {
                Ok(SendOutcome::Delivered(ack)) => {
                    record.received_at_us = ack.server_receipt_us;
                    batch.push(record);
                }
                Ok(SendOutcome::Dropped) => batch.push(record),
                Err(e) if !e.is_fatal() => {
                    debug!("send timed out on {node_id}: {e}");
                    batch.push(record);
                }
                Err(source) => {
                    // Flush what we have before surfacing the failure.
                    let _ = session.send_report(std::mem::take(&mut batch)).await;
                    return Err(EngineError::Plugin {
                        node: node_id.clone(),
                        protocol: run.protocol.protocol_id.clone(),
                        source,
                    });
                }
            }
        }

        if batch.len() >= REPORT_BATCH {
            session.send_report(std::mem::take(&mut batch)).await?;
            session.send_status(sent_total).await?;
        }
    }

    if !batch.is_empty() {
        session.send_report(batch).await?;
    }
    session.send_status(sent_total).await?;
    let _ = session
        .await_stop(run.protocol.drain_grace() + Duration::from_secs(10))
        .await;
    Ok(())
}

/// Expands populations into sessions, optionally restricted to one node's
/// shard. Sensor indices are unique across the whole scenario.
fn build_sessions(scenario: &ScenarioSpec, only: Option<&NodeId>) -> Vec<SensorSession> {
    let mut sessions = Vec::new();
    let mut index = 0u32;
    for population in &scenario.populations {
        if only.is_some_and(|n| population.node_id != *n) {
            index += population.count;
            continue;
        }
        let pattern = population.pattern.to_pattern();
        for _ in 0..population.count {
            sessions.push(SensorSession {
                node_id: population.node_id.clone(),
                sensor_index: index,
                sensor_type: population.sensor_type,
                pattern,
            });
            index += 1;
        }
    }
    sessions
}

/// Stable per-link seed so each link draws an independent but reproducible
/// impairment sequence.
fn link_seed(seed: u64, node: &NodeId) -> u64 {
    node.as_str()
        .bytes()
        .fold(seed, |acc, b| acc.rotate_left(8) ^ u64::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use provbank_config::{
        CoordinationConfig, FailureEvent, FailureKind, FailureSchedule, FailureTarget,
        ImpairmentProfile, PatternSpec, ProtocolConfig, RegistrationPolicy, SensorPopulation,
    };
    use provbank_core::sensors::SensorType;
    use provbank_core::time::SystemClock;
    use provbank_protocols::{ClientHandle, LoopbackPlugin, SendAck, SubprocessPlugin, UdpPlugin};

    fn protocol(mode: Mode) -> ProtocolConfig {
        ProtocolConfig {
            protocol_id: "loopback".into(),
            mode,
            server_addr: "127.0.0.1:0".parse().unwrap(),
            client_count: 1,
            server_binary: None,
            client_binary: None,
            receipt_log: None,
            start_timeout_ms: 2_000,
            send_timeout_ms: 1_000,
            drain_grace_ms: 50,
        }
    }

    fn population(node: &str, count: u32, interval_ms: u64) -> SensorPopulation {
        SensorPopulation {
            node_id: NodeId::from(node),
            count,
            sensor_type: SensorType::Temperature,
            pattern: PatternSpec::Periodic { interval_ms },
        }
    }

    fn make_run(
        run_id: &str,
        duration_secs: u64,
        populations: Vec<SensorPopulation>,
        protocol_cfg: ProtocolConfig,
        default_impairment: ImpairmentProfile,
        schedule: FailureSchedule,
        coordination: Option<CoordinationConfig>,
    ) -> ScenarioRun {
        ScenarioRun::new(
            run_id.into(),
            provbank_config::ScenarioSpec {
                scenario_id: "bench".into(),
                duration_secs,
                seed: 7,
                populations,
            },
            protocol_cfg,
            Default::default(),
            default_impairment,
            schedule,
            coordination,
        )
        .unwrap()
    }

    fn system_clock() -> Arc<dyn Clock> {
        Arc::new(SystemClock)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn clean_run_reports_zero_loss() {
        let clock = system_clock();
        let run = make_run(
            "run-clean",
            1,
            vec![population("core", 2, 100)],
            protocol(Mode::Active),
            ImpairmentProfile::default(),
            FailureSchedule::empty(),
            None,
        );
        let plugin = Box::new(LoopbackPlugin::new(clock.clone()));
        let report = Orchestrator::new(run, plugin, clock).execute().await;

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.statistics.sent, 20);
        assert_eq!(report.statistics.received, 20);
        assert_eq!(report.statistics.loss_rate, 0.0);
        assert!(report.statistics.latency.is_some());
        assert!(report.statistics.throughput_rps > 0.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn certain_loss_reports_total_loss() {
        let clock = system_clock();
        let run = make_run(
            "run-lossy",
            1,
            vec![population("core", 2, 100)],
            protocol(Mode::Active),
            ImpairmentProfile {
                loss_probability: 1.0,
                ..ImpairmentProfile::default()
            },
            FailureSchedule::empty(),
            None,
        );
        let plugin = Box::new(LoopbackPlugin::new(clock.clone()));
        let report = Orchestrator::new(run, plugin, clock).execute().await;

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.statistics.sent, 20);
        assert_eq!(report.statistics.received, 0);
        assert_eq!(report.statistics.loss_rate, 1.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn crashed_node_loses_its_window_others_unaffected() {
        let clock = system_clock();
        let schedule = FailureSchedule::new(vec![FailureEvent {
            kind: FailureKind::NodeCrash,
            target: FailureTarget::Node(NodeId::from("edge-a")),
            start_offset: Duration::from_millis(250),
            duration: Duration::from_millis(100),
        }])
        .unwrap();
        let run = make_run(
            "run-crash",
            1,
            vec![population("edge-a", 1, 100), population("edge-b", 1, 100)],
            protocol(Mode::Active),
            ImpairmentProfile::default(),
            schedule,
            None,
        );
        let plugin = Box::new(LoopbackPlugin::new(clock.clone()));
        let report = Orchestrator::new(run, plugin, clock).execute().await;

        assert_eq!(report.state, RunState::Completed);
        let a = &report.statistics.per_node[&NodeId::from("edge-a")];
        let b = &report.statistics.per_node[&NodeId::from("edge-b")];
        // Sends due at 0/100/200ms precede the 250ms crash; everything
        // after dies with the node, which never restarts.
        assert_eq!(a.sent, 10);
        assert_eq!(a.received, 3);
        assert_eq!(b.sent, 10);
        assert_eq!(b.received, 10);
        assert_eq!(b.loss_rate, 0.0);
    }

    /// Every send misses its deadline: absorbed as loss, never run-fatal.
    struct TimeoutPlugin;

    #[async_trait]
    impl ProtocolPlugin for TimeoutPlugin {
        fn protocol_id(&self) -> &str {
            "timeout"
        }
        fn mode(&self) -> Mode {
            Mode::Active
        }
        async fn start_server(
            &mut self,
            _cfg: &ProtocolConfig,
        ) -> Result<ServerHandle, ProtocolError> {
            Ok(ServerHandle::default())
        }
        async fn start_clients(
            &mut self,
            _cfg: &ProtocolConfig,
        ) -> Result<ClientHandle, ProtocolError> {
            Ok(ClientHandle::default())
        }
        async fn send_data(&mut self, _payload: Bytes) -> Result<SendAck, ProtocolError> {
            Err(ProtocolError::SendTimeout { timeout_ms: 10 })
        }
        async fn stop(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_timeouts_count_as_loss_not_failure() {
        let clock = system_clock();
        let run = make_run(
            "run-timeouts",
            1,
            vec![population("core", 1, 200)],
            protocol(Mode::Active),
            ImpairmentProfile::default(),
            FailureSchedule::empty(),
            None,
        );
        let report = Orchestrator::new(run, Box::new(TimeoutPlugin), clock)
            .execute()
            .await;

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.statistics.sent, 5);
        assert_eq!(report.statistics.received, 0);
        assert_eq!(report.statistics.send_timeouts, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_binary_fails_run_with_identity() {
        let clock = system_clock();
        let mut cfg = protocol(Mode::Passive);
        cfg.protocol_id = "native-udp".into();
        cfg.server_binary = Some("/nonexistent/provbank_server".into());
        let run = make_run(
            "run-unavailable",
            1,
            vec![population("core", 1, 100)],
            cfg,
            ImpairmentProfile::default(),
            FailureSchedule::empty(),
            None,
        );
        let report = Orchestrator::new(run, Box::new(SubprocessPlugin::new("native-udp")), clock)
            .execute()
            .await;

        assert!(report.is_failed());
        match &report.state {
            RunState::Failed { component, reason } => {
                assert_eq!(component, "plugin:native-udp@core");
                assert!(reason.contains("unavailable"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // Partial metrics are preserved (here: an empty but valid set).
        assert_eq!(report.statistics.sent, 0);
    }

    /// Passive plugin whose traffic is represented by a pre-written
    /// receipt log.
    struct PassiveStub;

    #[async_trait]
    impl ProtocolPlugin for PassiveStub {
        fn protocol_id(&self) -> &str {
            "passive-stub"
        }
        fn mode(&self) -> Mode {
            Mode::Passive
        }
        async fn start_server(
            &mut self,
            cfg: &ProtocolConfig,
        ) -> Result<ServerHandle, ProtocolError> {
            Ok(ServerHandle {
                receipt_log: cfg.receipt_log.clone(),
            })
        }
        async fn start_clients(
            &mut self,
            _cfg: &ProtocolConfig,
        ) -> Result<ClientHandle, ProtocolError> {
            Ok(ClientHandle::default())
        }
        async fn send_data(&mut self, _payload: Bytes) -> Result<SendAck, ProtocolError> {
            Err(ProtocolError::Runtime {
                protocol: "passive-stub".into(),
                reason: "passive plugin does not accept orchestrated sends".into(),
            })
        }
        async fn stop(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn passive_run_reconstructs_from_receipt_log() {
        let clock = system_clock();
        let log_path = std::env::temp_dir().join(format!(
            "provbank-passive-{}.log",
            std::process::id()
        ));
        std::fs::write(&log_path, "0 1000 1500\n1 2000 2600\ngarbage\n2 3000 3900\n").unwrap();

        let mut cfg = protocol(Mode::Passive);
        cfg.receipt_log = Some(log_path.clone());
        let run = make_run(
            "run-passive",
            1,
            vec![population("core", 1, 100)],
            cfg,
            ImpairmentProfile::default(),
            FailureSchedule::empty(),
            None,
        );
        let report = Orchestrator::new(run, Box::new(PassiveStub), clock)
            .execute()
            .await;
        let _ = std::fs::remove_file(&log_path);

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.statistics.sent, 3);
        assert_eq!(report.statistics.received, 3);
        assert_eq!(report.statistics.loss_rate, 0.0);
    }

    /// `start_server` that never returns: the start timeout fails the run.
    struct StallPlugin;

    #[async_trait]
    impl ProtocolPlugin for StallPlugin {
        fn protocol_id(&self) -> &str {
            "stall"
        }
        fn mode(&self) -> Mode {
            Mode::Active
        }
        async fn start_server(
            &mut self,
            _cfg: &ProtocolConfig,
        ) -> Result<ServerHandle, ProtocolError> {
            std::future::pending().await
        }
        async fn start_clients(
            &mut self,
            _cfg: &ProtocolConfig,
        ) -> Result<ClientHandle, ProtocolError> {
            Ok(ClientHandle::default())
        }
        async fn send_data(&mut self, _payload: Bytes) -> Result<SendAck, ProtocolError> {
            Ok(SendAck::default())
        }
        async fn stop(&mut self) -> Result<(), ProtocolError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stalled_server_start_times_out() {
        let clock = system_clock();
        let mut cfg = protocol(Mode::Active);
        cfg.start_timeout_ms = 100;
        let run = make_run(
            "run-stall",
            1,
            vec![population("core", 1, 100)],
            cfg,
            ImpairmentProfile::default(),
            FailureSchedule::empty(),
            None,
        );
        let report = Orchestrator::new(run, Box::new(StallPlugin), clock)
            .execute()
            .await;
        match &report.state {
            RunState::Failed { component, .. } => assert_eq!(component, "start_server"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn distributed_run_merges_two_nodes() {
        let clock = system_clock();

        // Reserve a data-plane port for the UDP server.
        let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let data_addr = probe.local_addr().unwrap();
        drop(probe);

        let mut proto = protocol(Mode::Active);
        proto.protocol_id = "udp".into();
        proto.server_addr = data_addr;

        let coordination = CoordinationConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            expected_nodes: 2,
            register_timeout_ms: 5_000,
            on_missing: RegistrationPolicy::Abort,
            start_delay_ms: 100,
            sync_tolerance_ms: 50,
            report_grace_ms: 1_000,
        };
        let run = make_run(
            "run-distributed",
            1,
            vec![population("edge-1", 2, 100), population("edge-2", 2, 100)],
            proto,
            ImpairmentProfile::default(),
            FailureSchedule::empty(),
            Some(coordination),
        );

        let coordinator =
            Coordinator::bind("127.0.0.1:0".parse().unwrap(), clock.clone())
                .await
                .unwrap();
        let control_addr = coordinator.local_addr().unwrap();

        let mut node_joins = Vec::new();
        for node in ["edge-1", "edge-2"] {
            let run = run.clone();
            let clock = clock.clone();
            node_joins.push(tokio::spawn(async move {
                run_sensor_node(
                    control_addr,
                    NodeId::from(node),
                    run,
                    Box::new(UdpPlugin::new(clock.clone())),
                    clock,
                )
                .await
            }));
        }

        let plugin = Box::new(UdpPlugin::new(clock.clone()));
        let report = Orchestrator::new(run, plugin, clock)
            .execute_distributed(coordinator)
            .await;

        for join in node_joins {
            join.await.unwrap().unwrap();
        }

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.statistics.per_node.len(), 2);
        assert_eq!(report.statistics.sent, 40);
        assert_eq!(report.statistics.received, 40);
        assert_eq!(report.statistics.loss_rate, 0.0);
        assert!(report.statistics.latency.is_some());
    }
}
