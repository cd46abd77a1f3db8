//! The daemon's control loop.
//!
//! One task owns every piece of mutable state: the display flags, the busy
//! schedule, the light and both timers. It waits on whichever of the refresh
//! timer, the transition timer or the input channel is ready first, handles
//! that one input, then writes the resolved indicator to the light.
//!
//! ```text
//!  signals ─┐
//!           ├─► mpsc<LoopInput> ─┐
//!  socket ──┘                    │
//!  refresh timer ────────────────┼─► EventLoop ─► IndicatorTransport
//!  transition timer ─────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use busylight_core::{
    AvailabilityConfig, Clock, DisplayState, Event, Light, SHUTDOWN_PATTERN, STARTUP_PATTERN,
    SystemClock, Transition,
};
use busylight_protocol::StatusInfo;
use busylight_providers::CalendarSource;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::availability::AvailabilityTracker;
use crate::config::DaemonConfig;
use crate::error::ServerResult;
use crate::timer::Timer;
use crate::transport::{IndicatorTransport, play_pattern};

/// Capacity of the input channel.
pub const INPUT_QUEUE_DEPTH: usize = 64;

/// Something delivered to the loop from outside.
#[derive(Debug)]
pub enum LoopInput {
    Event(Event),
    /// Ask for a snapshot. Answered without touching any state or the light.
    Status(oneshot::Sender<StatusInfo>),
}

/// Creates the channel feeding an [`EventLoop`].
pub fn input_channel() -> (mpsc::Sender<LoopInput>, mpsc::Receiver<LoopInput>) {
    mpsc::channel(INPUT_QUEUE_DEPTH)
}

/// Loads configuration and the calendar source it describes.
///
/// Called again on every reactivation.
pub trait ConfigLoader: Send {
    fn load(&self) -> ServerResult<DaemonConfig>;

    fn build_source(&self, config: &DaemonConfig) -> ServerResult<Arc<dyn CalendarSource>>;
}

enum Wake {
    RefreshTimer,
    TransitionTimer,
    Input(Option<LoopInput>),
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct EventLoop {
    config: DaemonConfig,
    loader: Box<dyn ConfigLoader>,
    tracker: AvailabilityTracker,
    transport: Box<dyn IndicatorTransport>,
    clock: Arc<dyn Clock>,
    display: DisplayState,
    refresh_timer: Timer,
    transition_timer: Timer,
    next_transition: Option<DateTime<Utc>>,
    inputs: mpsc::Receiver<LoopInput>,
    started_at: Instant,
}

impl EventLoop {
    pub fn new(
        config: DaemonConfig,
        loader: Box<dyn ConfigLoader>,
        source: Arc<dyn CalendarSource>,
        transport: Box<dyn IndicatorTransport>,
        inputs: mpsc::Receiver<LoopInput>,
    ) -> Self {
        let tracker =
            AvailabilityTracker::new(source, config.calendars.clone(), config.calendar_timeout());
        Self {
            config,
            loader,
            tracker,
            transport,
            clock: Arc::new(SystemClock),
            display: DisplayState::baseline(),
            refresh_timer: Timer::new("refresh"),
            transition_timer: Timer::new("transition"),
            next_transition: None,
            inputs,
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_availability(mut self, config: AvailabilityConfig) -> Self {
        self.tracker = self.tracker.with_config(config);
        self
    }

    /// Runs until a terminate event arrives or every input sender is gone.
    ///
    /// # Errors
    ///
    /// Fails only if the light cannot be opened at startup.
    pub async fn run(mut self) -> ServerResult<()> {
        self.display = DisplayState::baseline();
        self.display.daemon_active = true;
        self.bring_up().await?;
        self.settle().await;
        info!(indicator = %self.display.resolve(), "Control loop started");

        loop {
            let wake = tokio::select! {
                () = self.refresh_timer.fired() => Wake::RefreshTimer,
                () = self.transition_timer.fired() => Wake::TransitionTimer,
                input = self.inputs.recv() => Wake::Input(input),
            };

            let flow = match wake {
                Wake::RefreshTimer => {
                    self.on_refresh_timer().await;
                    Flow::Continue
                }
                Wake::TransitionTimer => {
                    debug!(generation = self.transition_timer.generation(), "Transition timer fired");
                    Flow::Continue
                }
                Wake::Input(Some(LoopInput::Status(reply))) => {
                    if reply.send(self.status()).is_err() {
                        debug!("Status requester went away");
                    }
                    continue;
                }
                Wake::Input(Some(LoopInput::Event(event))) => self.handle_event(event).await,
                Wake::Input(None) => {
                    info!("All input senders closed, shutting down");
                    self.handle_event(Event::Terminate).await
                }
            };

            if flow == Flow::Exit {
                info!("Control loop stopped");
                return Ok(());
            }
            self.settle().await;
        }
    }

    async fn handle_event(&mut self, event: Event) -> Flow {
        let transition = self.display.apply(event);
        info!(%event, "Received event");

        match transition {
            Transition::None => {}
            Transition::Activated => {
                if let Err(e) = self.reactivate().await {
                    error!(error = %e, "Activation failed, staying inactive");
                    self.go_inactive();
                }
            }
            Transition::Deactivated => {
                self.play(SHUTDOWN_PATTERN).await;
                self.go_inactive();
            }
            Transition::RefreshRequested => {
                if self.display.daemon_active {
                    self.refresh().await;
                } else {
                    info!("Ignoring refresh while inactive");
                }
            }
            Transition::Terminate => {
                if self.transport.is_open() {
                    self.play(SHUTDOWN_PATTERN).await;
                }
                self.go_inactive();
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// Reloads configuration, then brings the light and schedule back up.
    async fn reactivate(&mut self) -> ServerResult<()> {
        let config = self.config.reload(self.loader.load()?);
        let source = self.loader.build_source(&config)?;
        self.tracker
            .update(source, config.calendars.clone(), config.calendar_timeout());
        self.config = config;
        self.bring_up().await
    }

    /// Opens the light, plays the startup pattern, polls the calendar and
    /// starts the periodic refresh.
    async fn bring_up(&mut self) -> ServerResult<()> {
        self.transport.open(&self.config.device)?;
        self.play(STARTUP_PATTERN).await;
        self.refresh().await;
        self.refresh_timer.arm_after(self.config.refresh_interval());
        Ok(())
    }

    fn go_inactive(&mut self) {
        self.display = DisplayState::baseline();
        self.refresh_timer.stop();
        self.transition_timer.stop();
        self.next_transition = None;
        self.transport.close();
    }

    async fn on_refresh_timer(&mut self) {
        debug!(generation = self.refresh_timer.generation(), "Refresh timer fired");
        self.refresh_timer.arm_next(self.config.refresh_interval());
        self.refresh().await;
    }

    async fn refresh(&mut self) {
        let now = self.clock.now();
        if let Err(e) = self.tracker.refresh(now).await {
            warn!(error = %e, "Calendar refresh failed, keeping previous schedule");
        }
    }

    async fn play(&mut self, pattern: &[(Light, Duration)]) {
        if let Err(e) = play_pattern(self.transport.as_mut(), pattern).await {
            warn!(error = %e, "Failed to play light pattern");
        }
    }

    /// Recomputes the busy flag, re-arms the transition timer and writes the
    /// resolved indicator once.
    async fn settle(&mut self) {
        if self.display.daemon_active {
            let now = self.clock.now();
            let eval = self.tracker.evaluate(now).await;
            self.display.calendar_busy = eval.busy;
            self.next_transition = Some(eval.next_transition);
            self.transition_timer
                .arm_at(eval.next_transition, self.clock.now());
            debug!(busy = eval.busy, next = %eval.next_transition, "Availability updated");
        }

        let indicator = self.display.resolve();
        debug!(%indicator, "Writing indicator");
        if let Err(e) = self.transport.write(&indicator.frame()) {
            warn!(error = %e, "Failed to write to light");
        }
    }

    fn status(&self) -> StatusInfo {
        StatusInfo::new(self.started_at.elapsed().as_secs(), self.display)
            .with_busy_periods(self.tracker.schedule().to_vec())
            .with_last_poll(self.tracker.last_poll())
            .with_next_transition(self.next_transition)
            .with_device(self.transport.device_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::error::ServerError;
    use busylight_core::{BusyPeriod, IndicatorCommand};
    use busylight_providers::{
        BoxFuture, CalendarBusy, FreeBusyQuery, FreeBusyResponse, ProviderResult,
    };
    use chrono::TimeZone;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::task::JoinHandle;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    /// Wall clock driven by tokio's paused clock.
    struct TestClock {
        base: DateTime<Utc>,
        origin: Instant,
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            self.base + chrono::Duration::from_std(self.origin.elapsed()).unwrap()
        }
    }

    #[derive(Clone, Default)]
    struct LightLog {
        log: Arc<Mutex<Vec<String>>>,
        fail_open: Arc<AtomicBool>,
    }

    impl LightLog {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }
    }

    struct RecordingTransport {
        light: LightLog,
        open: bool,
    }

    impl IndicatorTransport for RecordingTransport {
        fn open(&mut self, _device: &DeviceConfig) -> ServerResult<()> {
            if self.light.fail_open.load(Ordering::SeqCst) {
                return Err(ServerError::device("unplugged"));
            }
            self.open = true;
            self.light.log.lock().unwrap().push("open".into());
            Ok(())
        }

        fn close(&mut self) {
            if self.open {
                self.open = false;
                self.light.log.lock().unwrap().push("close".into());
            }
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn write(&mut self, frame: &[u8]) -> ServerResult<()> {
            if self.open {
                let frame = String::from_utf8_lossy(frame).into_owned();
                self.light.log.lock().unwrap().push(frame);
            }
            Ok(())
        }

        fn device_name(&self) -> Option<String> {
            self.open.then(|| "test-light".to_string())
        }
    }

    #[derive(Clone, Default)]
    struct SharedSource {
        periods: Arc<Mutex<Vec<BusyPeriod>>>,
        calls: Arc<AtomicUsize>,
    }

    impl SharedSource {
        fn set(&self, periods: Vec<BusyPeriod>) {
            *self.periods.lock().unwrap() = periods;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CalendarSource for SharedSource {
        fn name(&self) -> &str {
            "shared"
        }

        fn query_free_busy(
            &self,
            query: FreeBusyQuery,
        ) -> BoxFuture<'_, ProviderResult<FreeBusyResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let window = query.window;
            let busy: Vec<BusyPeriod> = self
                .periods
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.end() > window.start && p.start() < window.end)
                .copied()
                .collect();
            let response = query
                .calendar_ids
                .into_iter()
                .fold(FreeBusyResponse::default(), |r, id| {
                    r.with_calendar(id, CalendarBusy::with_busy(busy.clone()))
                });
            Box::pin(async move { Ok(response) })
        }
    }

    struct ScriptedLoader {
        config: Arc<Mutex<Option<DaemonConfig>>>,
        source: SharedSource,
        loads: Arc<AtomicUsize>,
    }

    impl ConfigLoader for ScriptedLoader {
        fn load(&self) -> ServerResult<DaemonConfig> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.config
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| ServerError::config("broken config"))
        }

        fn build_source(&self, _config: &DaemonConfig) -> ServerResult<Arc<dyn CalendarSource>> {
            Ok(Arc::new(self.source.clone()))
        }
    }

    fn config() -> DaemonConfig {
        DaemonConfig::from_toml(
            r#"
credential_file = "/c.json"
token_file = "/t.json"
pid_file = "/run/busylight.pid"
socket_path = "/run/busylight.sock"
[device]
path = "/dev/ttyACM0"
[calendars.primary]
"#,
        )
        .unwrap()
    }

    struct Harness {
        tx: mpsc::Sender<LoopInput>,
        light: LightLog,
        source: SharedSource,
        loader_config: Arc<Mutex<Option<DaemonConfig>>>,
        loads: Arc<AtomicUsize>,
        handle: JoinHandle<ServerResult<()>>,
    }

    impl Harness {
        fn start(periods: Vec<BusyPeriod>) -> Self {
            Self::start_with(periods, LightLog::default(), AvailabilityConfig::default())
        }

        fn start_with(
            periods: Vec<BusyPeriod>,
            light: LightLog,
            availability: AvailabilityConfig,
        ) -> Self {
            let source = SharedSource::default();
            source.set(periods);
            let loader_config = Arc::new(Mutex::new(Some(config())));
            let loads = Arc::new(AtomicUsize::new(0));
            let loader = ScriptedLoader {
                config: loader_config.clone(),
                source: source.clone(),
                loads: loads.clone(),
            };
            let transport = RecordingTransport {
                light: light.clone(),
                open: false,
            };
            let (tx, rx) = input_channel();
            let event_loop = EventLoop::new(
                config(),
                Box::new(loader),
                Arc::new(source.clone()),
                Box::new(transport),
                rx,
            )
            .with_clock(Arc::new(TestClock {
                base: t0(),
                origin: Instant::now(),
            }))
            .with_availability(availability);

            Self {
                tx,
                light,
                source,
                loader_config,
                loads,
                handle: tokio::spawn(event_loop.run()),
            }
        }

        async fn send(&self, event: Event) {
            self.tx.send(LoopInput::Event(event)).await.unwrap();
        }

        async fn status(&self) -> StatusInfo {
            let (reply, rx) = oneshot::channel();
            self.tx.send(LoopInput::Status(reply)).await.unwrap();
            rx.await.unwrap()
        }

        async fn stop(self) -> Vec<String> {
            self.send(Event::Terminate).await;
            self.handle.await.unwrap().unwrap();
            self.light.log()
        }
    }

    fn period(from: i64, to: i64) -> BusyPeriod {
        BusyPeriod::new(t0() + minutes(from), t0() + minutes(to)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn startup_and_terminate_sequence() {
        let harness = Harness::start(Vec::new());
        let status = harness.status().await;
        assert!(status.display.daemon_active);
        assert_eq!(status.indicator.command, IndicatorCommand::Green);
        assert_eq!(status.device.as_deref(), Some("test-light"));

        let log = harness.stop().await;
        insta::assert_snapshot!(log.join(" "), @"open B X B X G 2 X 2 X close");
    }

    #[tokio::test(start_paused = true)]
    async fn meeting_turns_light_yellow_and_back() {
        let harness = Harness::start(vec![period(5, 65)]);

        let status = harness.status().await;
        assert_eq!(status.indicator.command, IndicatorCommand::Green);
        assert_eq!(status.next_transition, Some(t0() + minutes(5)));
        assert_eq!(status.busy_periods, vec![period(5, 65)]);

        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        let status = harness.status().await;
        assert_eq!(status.indicator.command, IndicatorCommand::Yellow);
        assert_eq!(status.next_transition, Some(t0() + minutes(65)));

        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        let status = harness.status().await;
        assert_eq!(status.indicator.command, IndicatorCommand::Green);
        assert!(status.busy_periods.is_empty());
        assert!(status.next_transition.unwrap() >= t0() + minutes(65) + chrono::Duration::hours(8));

        let log = harness.stop().await;
        insta::assert_snapshot!(log.join(" "), @"open B X B X G Y Y G 2 X 2 X close");
    }

    #[tokio::test(start_paused = true)]
    async fn each_event_writes_full_state_once() {
        let harness = Harness::start(Vec::new());
        harness.status().await;
        harness.light.take();

        harness.send(Event::ZoomMuted).await;
        harness.send(Event::ToggleLowPriority).await;
        harness.send(Event::ZoomOpenMic).await;
        harness.send(Event::ToggleUrgent).await;
        harness.send(Event::ToggleUrgent).await;
        harness.send(Event::ZoomEnded).await;
        let status = harness.status().await;
        assert_eq!(status.indicator.command, IndicatorCommand::Green);
        assert!(status.indicator.low_priority_overlay);

        insta::assert_snapshot!(harness.light.take().join(" "), @"R R@ #@ %@ #@ G@");
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn status_does_not_touch_the_light() {
        let harness = Harness::start(Vec::new());
        harness.status().await;
        harness.light.take();

        for _ in 0..3 {
            harness.status().await;
        }
        assert!(harness.light.take().is_empty());
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_then_reactivate() {
        let harness = Harness::start(Vec::new());
        harness.send(Event::ToggleUrgent).await;
        harness.status().await;
        harness.light.take();

        harness.send(Event::ToggleActive).await;
        let status = harness.status().await;
        assert!(!status.display.daemon_active);
        assert!(!status.display.urgent);
        assert_eq!(status.indicator, busylight_core::ResolvedIndicator::OFF);
        assert!(status.next_transition.is_none());
        assert!(status.device.is_none());
        insta::assert_snapshot!(harness.light.take().join(" "), @"2 X 2 X close");

        // Inactive: flags still track events but nothing reaches the light.
        harness.send(Event::ZoomMuted).await;
        assert!(harness.status().await.display.zoom_muted);
        assert!(harness.light.take().is_empty());

        harness.source.set(vec![period(0, 120)]);
        harness.send(Event::ToggleActive).await;
        let status = harness.status().await;
        assert!(status.display.daemon_active);
        assert_eq!(status.indicator.command, IndicatorCommand::RedSolid);
        assert_eq!(harness.loads.load(Ordering::SeqCst), 1);
        insta::assert_snapshot!(harness.light.take().join(" "), @"open B X B X R");

        harness.send(Event::ZoomEnded).await;
        assert_eq!(harness.status().await.indicator.command, IndicatorCommand::Yellow);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reactivation_stays_inactive() {
        let harness = Harness::start(Vec::new());
        harness.send(Event::ToggleActive).await;
        harness.status().await;
        harness.light.take();

        *harness.loader_config.lock().unwrap() = None;
        harness.send(Event::ToggleActive).await;
        let status = harness.status().await;
        assert!(!status.display.daemon_active);
        assert!(harness.light.take().is_empty());

        *harness.loader_config.lock().unwrap() = Some(config());
        harness.light.fail_open.store(true, Ordering::SeqCst);
        harness.send(Event::ToggleActive).await;
        assert!(!harness.status().await.display.daemon_active);

        harness.light.fail_open.store(false, Ordering::SeqCst);
        harness.send(Event::ToggleActive).await;
        assert!(harness.status().await.display.daemon_active);
        assert_eq!(harness.loads.load(Ordering::SeqCst), 3);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_picks_up_new_meetings() {
        let harness = Harness::start(Vec::new());
        assert_eq!(harness.status().await.indicator.command, IndicatorCommand::Green);
        assert_eq!(harness.source.calls(), 1);

        harness.source.set(vec![period(0, 30)]);
        harness.send(Event::ForceRefresh).await;
        let status = harness.status().await;
        assert_eq!(status.indicator.command, IndicatorCommand::Yellow);
        assert_eq!(status.next_transition, Some(t0() + minutes(30)));
        assert_eq!(harness.source.calls(), 2);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_keeps_hourly_cadence() {
        let harness = Harness::start(Vec::new());
        harness.status().await;
        assert_eq!(harness.source.calls(), 1);

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        harness.send(Event::ForceRefresh).await;
        harness.status().await;
        assert_eq!(harness.source.calls(), 2);

        tokio::time::sleep(Duration::from_secs(29 * 60)).await;
        harness.status().await;
        assert_eq!(harness.source.calls(), 2);

        // Still one hour after startup, not after the forced refresh.
        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        harness.status().await;
        assert_eq!(harness.source.calls(), 3);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_empty_schedule_refreshes_on_next_input() {
        let availability = AvailabilityConfig::default().with_staleness(minutes(10));
        let harness = Harness::start_with(vec![period(1, 2)], LightLog::default(), availability);
        assert_eq!(harness.status().await.next_transition, Some(t0() + minutes(1)));

        // The meeting comes and goes without a poll.
        tokio::time::sleep(Duration::from_secs(3 * 60)).await;
        let status = harness.status().await;
        assert!(status.busy_periods.is_empty());
        assert_eq!(harness.source.calls(), 1);

        harness.source.set(vec![period(20, 30)]);
        tokio::time::sleep(Duration::from_secs(12 * 60)).await;
        harness.send(Event::ToggleLowPriority).await;
        let status = harness.status().await;
        assert_eq!(harness.source.calls(), 2);
        assert_eq!(status.busy_periods, vec![period(20, 30)]);
        assert_eq!(status.next_transition, Some(t0() + minutes(20)));
        assert_eq!(status.indicator.command, IndicatorCommand::Green);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_ignored_while_inactive() {
        let harness = Harness::start(Vec::new());
        harness.send(Event::ToggleActive).await;
        harness.send(Event::ForceRefresh).await;
        harness.status().await;
        assert_eq!(harness.source.calls(), 1);
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hourly_refresh() {
        let harness = Harness::start(Vec::new());
        harness.status().await;
        assert_eq!(harness.source.calls(), 1);

        harness.source.set(vec![period(70, 80)]);
        tokio::time::sleep(Duration::from_secs(3600 + 1)).await;
        let status = harness.status().await;
        assert_eq!(harness.source.calls(), 2);
        assert_eq!(status.next_transition, Some(t0() + minutes(70)));
        harness.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_shuts_down() {
        let harness = Harness::start(Vec::new());
        harness.status().await;
        let Harness {
            tx, light, handle, ..
        } = harness;
        drop(tx);

        handle.await.unwrap().unwrap();
        assert!(light.log().ends_with(&["2", "X", "close"].map(String::from)));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_light_at_startup_is_fatal() {
        let light = LightLog::default();
        light.fail_open.store(true, Ordering::SeqCst);
        let harness = Harness::start_with(Vec::new(), light, AvailabilityConfig::default());

        let result = harness.handle.await.unwrap();
        assert!(matches!(result, Err(ServerError::Device { .. })));
    }
}
