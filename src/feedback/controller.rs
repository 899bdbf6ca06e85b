//! The feedback domain: independently clocked tasks that read the session
//! channel and drive tone playback.

use super::protocol::{pulse_gain, FeedbackProtocol, ToneMapping, CONTINUOUS_GAIN};
use super::schedule::{DelayWindow, GainTier, StimulusSchedule, MIN_RANDOM_DELAY};
use crate::audio::{Gain, SinkFactory, ToneSynthesizer};
use crate::channel::{SessionChannel, TriggerRecord};
use crate::config::Config;
use crate::session::SessionContext;
use crate::stats::SharedStats;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Shortest period accepted for a scheduler.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackSettings {
    /// Period of the short-interval tasks (discrete pulse, continuous tone)
    pub poll_interval: Duration,
    /// Lower bound of the randomized presentation delay
    pub min_random_delay: Duration,
    /// Period of randomized scheduling ticks; the session duration when unset
    pub random_period: Option<Duration>,
    /// Fixed seed for the randomized schedule and delays
    pub seed: Option<u64>,
}

impl FeedbackSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.feedback_interval,
            ..Self::default()
        }
    }
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            min_random_delay: MIN_RANDOM_DELAY,
            random_period: None,
            seed: None,
        }
    }
}

/// One feedback decision, whether or not it was audible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeedbackDecision {
    /// Frequency of the tone played, if this decision played one
    pub frequency: Option<f64>,
    pub gain: f32,
    /// Distance to target the decision was based on
    pub relative_distance: f64,
}

/// What the controller did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FeedbackReport {
    pub decisions: u64,
    /// The randomized schedule ran out and ended the session
    pub schedule_exhausted: bool,
}

/// Runs the session's feedback protocol until the session ends.
///
/// Ticks that find no usable tracking sample are skipped. Every decision
/// appends a trigger record, audible or not.
#[derive(Clone)]
pub struct FeedbackController {
    ctx: SessionContext,
    channel: SessionChannel,
    sinks: Arc<dyn SinkFactory>,
    synth: ToneSynthesizer,
    gain: Gain,
    protocol: FeedbackProtocol,
    settings: FeedbackSettings,
    stats: SharedStats,
}

impl FeedbackController {
    pub fn new(
        ctx: SessionContext,
        channel: SessionChannel,
        sinks: Arc<dyn SinkFactory>,
        stats: SharedStats,
        settings: FeedbackSettings,
    ) -> Self {
        let params = ctx.params();
        let protocol = FeedbackProtocol::select(params.protocol, params.session);
        let synth = ToneSynthesizer::new(params.sample_rate, params.tone_amplitude);
        Self {
            ctx,
            channel,
            sinks,
            synth,
            gain: Gain::default(),
            protocol,
            settings,
            stats,
        }
    }

    pub fn protocol(&self) -> FeedbackProtocol {
        self.protocol
    }

    /// Current value of the shared gain.
    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    /// Run until the session ends. A randomized session ends itself once
    /// its schedule is exhausted.
    pub async fn run(self) -> FeedbackReport {
        info!(
            session = %self.ctx.key(),
            protocol = %self.protocol,
            "Feedback controller started"
        );
        let report = match self.protocol {
            FeedbackProtocol::None => {
                self.ctx.cancelled().await;
                FeedbackReport::default()
            }
            FeedbackProtocol::DiscretePulse => self.run_discrete().await,
            FeedbackProtocol::Randomized => self.run_randomized().await,
            FeedbackProtocol::Continuous(mapping) => {
                self.poll(move |c| c.continuous_tick(mapping)).await
            }
        };
        info!(decisions = report.decisions, "Feedback controller stopped");
        report
    }

    async fn run_discrete(&self) -> FeedbackReport {
        let this = self.clone();
        let static_tone = tokio::task::spawn_blocking(move || this.play_static_tone());
        let report = self.poll(|c| c.pulse_tick()).await;
        if let Err(e) = static_tone.await {
            warn!(error = %e, "Static tone task failed");
        }
        report
    }

    async fn poll<F>(&self, tick: F) -> FeedbackReport
    where
        F: Fn(&FeedbackController) -> Option<FeedbackDecision> + Clone + Send + 'static,
    {
        let mut interval = tokio::time::interval(self.settings.poll_interval.max(MIN_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = FeedbackReport::default();

        loop {
            tokio::select! {
                _ = self.ctx.cancelled() => break,
                _ = interval.tick() => {}
            }
            let this = self.clone();
            let tick = tick.clone();
            match tokio::task::spawn_blocking(move || tick(&this)).await {
                Ok(Some(decision)) => {
                    report.decisions += 1;
                    trace!(?decision, "Feedback decision");
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Feedback tick failed"),
            }
        }
        report
    }

    async fn run_randomized(&self) -> FeedbackReport {
        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut schedule = StimulusSchedule::shuffled(&mut rng);
        let params = self.ctx.params();
        let period = self
            .settings
            .random_period
            .unwrap_or_else(|| params.session_length())
            .max(MIN_PERIOD);
        let window = DelayWindow::new(
            self.settings.min_random_delay,
            Duration::try_from_secs_f64(params.repeat_period).unwrap_or_default(),
            Duration::try_from_secs_f64(params.tone_duration).unwrap_or_default(),
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = FeedbackReport::default();

        loop {
            tokio::select! {
                _ = self.ctx.cancelled() => return report,
                _ = interval.tick() => {}
            }
            let Some(tier) = schedule.next_tier() else {
                break;
            };
            let delay = window.sample(&mut rng);
            debug!(
                presentation = schedule.presented(),
                tier = ?tier,
                delay_ms = delay.as_millis() as u64,
                "Stimulus scheduled"
            );
            tokio::select! {
                _ = self.ctx.cancelled() => return report,
                _ = tokio::time::sleep(delay) => {}
            }

            let this = self.clone();
            match tokio::task::spawn_blocking(move || this.randomized_tick(tier)).await {
                Ok(_) => report.decisions += 1,
                Err(e) => warn!(error = %e, "Randomized presentation failed"),
            }

            if schedule.is_exhausted() {
                info!("Stimulus schedule exhausted");
                report.schedule_exhausted = true;
                self.ctx.end_session();
                break;
            }
        }
        report
    }

    /// Discrete protocol tick: open the shared gain while the latest sample
    /// is inside the target zone, close it otherwise.
    pub fn pulse_tick(&self) -> Option<FeedbackDecision> {
        let sample = self.channel.latest_sample()?;
        let gain = pulse_gain(&sample, self.ctx.params().target_radius);
        self.gain.set(gain);
        self.record_trigger(sample.relative_distance);
        Some(FeedbackDecision {
            frequency: None,
            gain,
            relative_distance: sample.relative_distance,
        })
    }

    /// Continuous protocol tick: play one tone whose frequency encodes the
    /// distance zone of the latest sample.
    pub fn continuous_tick(&self, mapping: ToneMapping) -> Option<FeedbackDecision> {
        let sample = self.channel.latest_sample()?;
        let frequency = mapping.frequency_for(sample.relative_distance);
        self.play(frequency, CONTINUOUS_GAIN);
        self.record_trigger(sample.relative_distance);
        Some(FeedbackDecision {
            frequency: Some(frequency),
            gain: CONTINUOUS_GAIN,
            relative_distance: sample.relative_distance,
        })
    }

    /// One randomized presentation at the given tier. Plays even when no
    /// tracking sample exists yet; the trigger then records distance 0.
    pub fn randomized_tick(&self, tier: GainTier) -> FeedbackDecision {
        let relative_distance = self
            .channel
            .latest_sample()
            .map(|s| s.relative_distance)
            .unwrap_or(0.0);
        let frequency = self.ctx.params().base_frequency;
        self.play(frequency, tier.gain());
        self.record_trigger(relative_distance);
        FeedbackDecision {
            frequency: Some(frequency),
            gain: tier.gain(),
            relative_distance,
        }
    }

    /// Base tone for the whole session on one line whose level follows the
    /// shared gain. Starts muted.
    fn play_static_tone(&self) {
        let params = self.ctx.params();
        let mut sink = self.sinks.create();
        match self.synth.play(
            sink.as_mut(),
            params.base_frequency,
            params.session_duration,
            &self.gain,
            self.ctx.token(),
        ) {
            Ok(report) => debug!(
                samples = report.samples,
                cancelled = report.cancelled,
                "Static tone finished"
            ),
            Err(e) => {
                warn!(error = %e, "Static tone failed");
                self.stats.record_tone_failure();
            }
        }
    }

    fn play(&self, frequency: f64, gain: f32) {
        let mut sink = self.sinks.create();
        let gain = Gain::new(gain);
        match self.synth.play(
            sink.as_mut(),
            frequency,
            self.ctx.params().tone_duration,
            &gain,
            self.ctx.token(),
        ) {
            Ok(_) => self.stats.record_tone_played(),
            Err(e) => {
                warn!(frequency, error = %e, "Tone playback failed");
                self.stats.record_tone_failure();
            }
        }
    }

    fn record_trigger(&self, relative_distance: f64) {
        let record = TriggerRecord {
            relative_distance,
            elapsed_ns: u64::try_from(self.ctx.elapsed().as_nanos()).unwrap_or(u64::MAX),
        };
        match self.channel.append_trigger(&record) {
            Ok(()) => self.stats.record_trigger(),
            Err(e) => {
                warn!(session = %self.ctx.key(), error = %e, "Failed to record feedback trigger");
                self.stats.record_trigger_failure();
            }
        }
    }
}
