//! The acquisition loop: trigger the module once, then decode frames until a
//! stopping condition, and release the channel on every exit path.
//!
//! A session moves through `Init -> Running -> Done`. At each iteration
//! boundary the sample limit is checked first, then cancellation. A stop
//! request can therefore be delayed by up to one read timeout of the channel,
//! and a stop that arrives after the last frame still ends as `Completed`.

use crate::channel::{ByteChannel, ChannelError};
use crate::frame_decoder::{read_frame, DebugSample, Decoded, FilteredSample, FrameLayout};
use crate::mode_selector::{AcquisitionMode, ModeSelector};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Samples captured in raw-debug mode.
pub const DEFAULT_DEBUG_SAMPLES: usize = 10;
/// Safety cap for streaming mode.
pub const DEFAULT_STREAM_MAX_SAMPLES: usize = 10_000;
/// Grace period after `'F'` before the filtered stream is stable.
pub const DEFAULT_STREAM_SETTLE: Duration = Duration::from_millis(100);

/// Cooperative stop flag shared between the loop and whoever wants it to stop.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Exact number of frames read in raw-debug mode.
    pub debug_sample_count: usize,
    /// Upper bound on frames read in streaming mode.
    pub stream_max_samples: usize,
    pub debug_settle: Duration,
    pub stream_settle: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            debug_sample_count: DEFAULT_DEBUG_SAMPLES,
            stream_max_samples: DEFAULT_STREAM_MAX_SAMPLES,
            debug_settle: Duration::ZERO,
            stream_settle: DEFAULT_STREAM_SETTLE,
        }
    }
}

impl AcquisitionConfig {
    /// Same limits, no settling delays. Suited to replayed streams.
    pub fn without_settle(mut self) -> Self {
        self.debug_settle = Duration::ZERO;
        self.stream_settle = Duration::ZERO;
        self
    }

    fn settle_for(&self, mode: AcquisitionMode) -> Duration {
        match mode {
            AcquisitionMode::RawDebug => self.debug_settle,
            AcquisitionMode::Streaming => self.stream_settle,
        }
    }

    /// Iteration limit and how reaching it is reported.
    fn limit_for(&self, mode: AcquisitionMode) -> (usize, Termination) {
        match mode {
            AcquisitionMode::RawDebug => (self.debug_sample_count, Termination::Completed),
            AcquisitionMode::Streaming => (self.stream_max_samples, Termination::IterationCap),
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The fixed raw-debug sample count was reached.
    Completed,
    /// The channel ran dry before a frame was complete.
    EndOfStream,
    /// Streaming hit its maximum iteration count.
    IterationCap,
    /// A stop was requested through the [`CancellationToken`] before the
    /// limit was reached.
    Cancelled,
    /// The channel reported an error other than a timeout or disconnect.
    /// The cause is in [`AcquisitionReport::failure`].
    Failed,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::EndOfStream => "stream ended",
            Termination::IterationCap => "sample limit reached",
            Termination::Cancelled => "interrupted",
            Termination::Failed => "transport failed",
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered samples of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionSession<S> {
    mode: AcquisitionMode,
    samples: Vec<S>,
    termination: Termination,
}

impl<S> AcquisitionSession<S> {
    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn samples(&self) -> &[S] {
        &self.samples
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.samples.iter()
    }

    pub fn into_samples(self) -> Vec<S> {
        self.samples
    }
}

impl<'a, S> IntoIterator for &'a AcquisitionSession<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// A finished session together with the outcome of releasing the channel.
#[derive(Debug)]
pub struct AcquisitionReport<S> {
    pub session: AcquisitionSession<S>,
    /// Transport error that ended the session, when it ended as `Failed`.
    pub failure: Option<ChannelError>,
    /// Set when the channel could not be closed cleanly.
    pub release_error: Option<ChannelError>,
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Failed to send mode command: {source}")]
    Trigger {
        #[source]
        source: ChannelError,
    },
}

enum SessionState {
    Init,
    Running,
    Failed(ChannelError),
    Done(Termination),
}

/// Owns the channel for one session and closes it exactly once.
struct ChannelGuard<C: ByteChannel> {
    channel: C,
    released: bool,
}

impl<C: ByteChannel> ChannelGuard<C> {
    fn new(channel: C) -> Self {
        Self {
            channel,
            released: false,
        }
    }

    fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    fn release(mut self) -> Result<(), ChannelError> {
        self.released = true;
        log::debug!("Releasing channel");
        self.channel.close()
    }
}

impl<C: ByteChannel> Drop for ChannelGuard<C> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            log::debug!("Releasing channel on unwind");
            if let Err(e) = self.channel.close() {
                log::warn!("Failed to close channel: {}", e);
            }
        }
    }
}

/// Drives one acquisition session per call.
#[derive(Debug, Clone, Default)]
pub struct Acquisition {
    config: AcquisitionConfig,
    cancel: CancellationToken,
}

impl Acquisition {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` instead of the internal token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Token that stops this acquisition at the next iteration boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send `'D'` and read the configured number of `raw`/`adc` frames.
    pub fn raw_debug<C: ByteChannel>(
        &self,
        channel: C,
    ) -> Result<AcquisitionReport<DebugSample>, AcquisitionError> {
        self.run(channel, AcquisitionMode::RawDebug)
    }

    /// Send `'F'` and read filtered values until the stream ends or the cap is hit.
    pub fn streaming<C: ByteChannel>(
        &self,
        channel: C,
    ) -> Result<AcquisitionReport<FilteredSample>, AcquisitionError> {
        self.run(channel, AcquisitionMode::Streaming)
    }

    /// Run one session in `mode`, decoding frames as `L`.
    ///
    /// The channel is closed before this returns, whatever the outcome. A
    /// transport error or a failure to close is reported alongside the
    /// samples captured up to that point.
    #[tracing::instrument(level = "debug", skip_all, fields(mode = %mode))]
    fn run<L: FrameLayout, C: ByteChannel>(
        &self,
        channel: C,
        mode: AcquisitionMode,
    ) -> Result<AcquisitionReport<L>, AcquisitionError> {
        let mut guard = ChannelGuard::new(channel);
        let mut samples = Vec::new();
        let outcome = self.drive(guard.channel_mut(), mode, &mut samples);
        let release = guard.release();

        match outcome {
            Ok((termination, failure)) => {
                if let Some(e) = &failure {
                    log::error!("Transport error: {}", e);
                }
                log::info!(
                    "{} acquisition {} after {} samples",
                    mode,
                    termination,
                    samples.len()
                );
                let release_error = release.err();
                if let Some(e) = &release_error {
                    log::warn!("Failed to close channel: {}", e);
                }
                Ok(AcquisitionReport {
                    session: AcquisitionSession {
                        mode,
                        samples,
                        termination,
                    },
                    failure,
                    release_error,
                })
            }
            Err(e) => {
                if let Err(close_err) = release {
                    log::warn!("Failed to close channel: {}", close_err);
                }
                Err(e)
            }
        }
    }

    fn drive<L: FrameLayout, C: ByteChannel>(
        &self,
        channel: &mut C,
        mode: AcquisitionMode,
        samples: &mut Vec<L>,
    ) -> Result<(Termination, Option<ChannelError>), AcquisitionError> {
        debug_assert_eq!(L::FIELD_COUNT, mode.field_count());
        let (limit, on_limit) = self.config.limit_for(mode);
        let mut state = SessionState::Init;

        loop {
            state = match state {
                SessionState::Init => {
                    ModeSelector::new(self.config.settle_for(mode))
                        .trigger(channel, mode)
                        .map_err(|source| AcquisitionError::Trigger { source })?;
                    SessionState::Running
                }
                SessionState::Running if samples.len() >= limit => SessionState::Done(on_limit),
                SessionState::Running if self.cancel.is_cancelled() => {
                    SessionState::Done(Termination::Cancelled)
                }
                SessionState::Running => match read_frame::<L, _>(channel) {
                    Ok(Decoded::Sample(sample)) => {
                        samples.push(sample);
                        SessionState::Running
                    }
                    Ok(Decoded::EndOfStream) => SessionState::Done(Termination::EndOfStream),
                    Err(source) => SessionState::Failed(source),
                },
                SessionState::Failed(source) => return Ok((Termination::Failed, Some(source))),
                SessionState::Done(termination) => return Ok((termination, None)),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ReplayChannel;

    fn acquisition() -> Acquisition {
        Acquisition::new(AcquisitionConfig::default().without_settle())
    }

    fn debug_bytes(samples: usize) -> Vec<u8> {
        (0..samples)
            .flat_map(|i| {
                let raw = 0x8000u16 | i as u16;
                let adc = (i as u16) * 100 + 7;
                let [rh, rl] = raw.to_be_bytes();
                let [ah, al] = adc.to_be_bytes();
                [rh, rl, ah, al]
            })
            .collect()
    }

    /// Cancels `token` once `after` bytes have been read from the inner channel.
    struct CancellingChannel {
        inner: ReplayChannel,
        token: CancellationToken,
        after: usize,
        read: usize,
    }

    impl ByteChannel for CancellingChannel {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
            self.inner.write_all(bytes)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
            let n = self.inner.read(buf)?;
            self.read += n;
            if self.read >= self.after {
                self.token.cancel();
            }
            Ok(n)
        }

        fn close(&mut self) -> Result<(), ChannelError> {
            self.inner.close()
        }
    }

    struct PanickingChannel<'a> {
        inner: &'a mut ReplayChannel,
    }

    impl ByteChannel for PanickingChannel<'_> {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
            self.inner.write_all(bytes)
        }

        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ChannelError> {
            std::panic::panic_any("read failed hard")
        }

        fn close(&mut self) -> Result<(), ChannelError> {
            self.inner.close()
        }
    }

    #[test]
    fn test_debug_full_session() {
        let bytes = debug_bytes(10);
        assert_eq!(bytes.len(), 40);
        let mut channel = ReplayChannel::new(bytes.clone());

        let report = acquisition().raw_debug(&mut channel).unwrap();
        let session = report.session;

        assert_eq!(session.len(), 10);
        assert_eq!(session.termination(), Termination::Completed);
        for (i, sample) in session.iter().enumerate() {
            let frame = &bytes[i * 4..i * 4 + 4];
            assert_eq!(sample.raw, u16::from_be_bytes([frame[0], frame[1]]));
            assert_eq!(sample.adc, u16::from_be_bytes([frame[2], frame[3]]));
        }
        assert_eq!(channel.written(), b"D");
        assert_eq!(channel.close_count(), 1);
        assert!(report.failure.is_none());
        assert!(report.release_error.is_none());
    }

    #[test]
    fn test_debug_one_byte_short() {
        let mut bytes = debug_bytes(10);
        bytes.pop();
        let mut channel = ReplayChannel::new(bytes);

        let report = acquisition().raw_debug(&mut channel).unwrap();

        assert_eq!(report.session.len(), 9);
        assert_eq!(report.session.termination(), Termination::EndOfStream);
        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn test_debug_reads_exactly_configured_count() {
        let mut channel = ReplayChannel::new(debug_bytes(12));
        let report = acquisition().raw_debug(&mut channel).unwrap();
        assert_eq!(report.session.len(), 10);
        assert_eq!(report.session.termination(), Termination::Completed);
        assert_eq!(report.session.samples()[9].raw, 0x8009);
    }

    #[test]
    fn test_streaming_until_end_of_stream() {
        let bytes: Vec<u8> = (0u8..20).map(|b| b.wrapping_mul(37)).collect();
        let mut channel = ReplayChannel::new(bytes.clone());

        let report = acquisition().streaming(&mut channel).unwrap();
        let values: Vec<u16> = report.session.iter().map(FilteredSample::value).collect();

        let expected: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(values, expected);
        assert_eq!(report.session.termination(), Termination::EndOfStream);
        assert_eq!(channel.written(), b"F");
        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn test_streaming_respects_cap() {
        let config = AcquisitionConfig {
            stream_max_samples: 250,
            ..AcquisitionConfig::default().without_settle()
        };
        let mut channel = ReplayChannel::endless(vec![0x01, 0x02]);

        let report = Acquisition::new(config).streaming(&mut channel).unwrap();

        assert_eq!(report.session.len(), 250);
        assert_eq!(report.session.termination(), Termination::IterationCap);
        assert!(report.session.iter().all(|s| s.value() == 0x0102));
        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn test_cancelled_before_first_read() {
        let acquisition = acquisition();
        acquisition.cancellation_token().cancel();
        let mut channel = ReplayChannel::endless(vec![0xFF]);

        let report = acquisition.streaming(&mut channel).unwrap();

        assert!(report.session.is_empty());
        assert_eq!(report.session.termination(), Termination::Cancelled);
        assert_eq!(channel.written(), b"F");
        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn test_cancelled_between_iterations() {
        let token = CancellationToken::new();
        let mut channel = CancellingChannel {
            inner: ReplayChannel::endless(vec![0x00, 0x2A]),
            token: token.clone(),
            after: 6,
            read: 0,
        };

        let report = acquisition()
            .with_cancellation(token)
            .streaming(&mut channel)
            .unwrap();

        // The frame in flight when the stop arrives is still completed.
        assert_eq!(report.session.len(), 3);
        assert_eq!(report.session.termination(), Termination::Cancelled);
        assert_eq!(channel.inner.close_count(), 1);
    }

    #[test]
    fn test_transport_error_keeps_partial_session() {
        let bytes = debug_bytes(10);
        let mut channel = ReplayChannel::new(bytes.clone()).failing_after(8);

        let report = acquisition().raw_debug(&mut channel).unwrap();

        assert_eq!(report.session.termination(), Termination::Failed);
        assert!(matches!(report.failure, Some(ChannelError::Io(_))));
        assert_eq!(report.session.len(), 2);
        for (i, sample) in report.session.iter().enumerate() {
            let frame = &bytes[i * 4..i * 4 + 4];
            assert_eq!(sample.raw, u16::from_be_bytes([frame[0], frame[1]]));
            assert_eq!(sample.adc, u16::from_be_bytes([frame[2], frame[3]]));
        }
        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn test_streaming_transport_error_keeps_samples() {
        let mut channel = ReplayChannel::endless(vec![0x00, 0x09]).failing_after(18);

        let report = acquisition().streaming(&mut channel).unwrap();

        assert_eq!(report.session.len(), 9);
        assert_eq!(report.session.termination(), Termination::Failed);
        assert!(report.failure.is_some());
        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn test_limit_wins_over_late_cancellation() {
        let token = CancellationToken::new();
        let mut channel = CancellingChannel {
            inner: ReplayChannel::new(debug_bytes(10)),
            token: token.clone(),
            after: 40,
            read: 0,
        };

        let report = acquisition()
            .with_cancellation(token.clone())
            .raw_debug(&mut channel)
            .unwrap();

        assert!(token.is_cancelled());
        assert_eq!(report.session.len(), 10);
        assert_eq!(report.session.termination(), Termination::Completed);
    }

    #[test]
    fn test_trigger_error_releases_channel() {
        let mut channel = ReplayChannel::new(debug_bytes(1));
        channel.close().unwrap();

        let err = acquisition().raw_debug(&mut channel).unwrap_err();

        assert!(matches!(err, AcquisitionError::Trigger { .. }));
        assert_eq!(channel.close_count(), 2);
    }

    #[test]
    fn test_release_failure_keeps_samples() {
        let mut channel = ReplayChannel::new(vec![0, 1, 0, 2]).failing_close();

        let report = acquisition().streaming(&mut channel).unwrap();

        assert_eq!(report.session.len(), 2);
        assert!(report.release_error.is_some());
        assert_eq!(channel.close_count(), 1);
    }

    #[test]
    fn test_panic_still_releases_channel() {
        let mut inner = ReplayChannel::new(vec![0, 1]);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let channel = PanickingChannel { inner: &mut inner };
            let _ = acquisition().streaming(channel);
        }));

        assert!(result.is_err());
        assert_eq!(inner.close_count(), 1);
    }

    #[test]
    fn test_owned_channel_is_consumed() {
        let channel = Box::new(ReplayChannel::new(debug_bytes(3)));
        let report = acquisition().raw_debug(channel).unwrap();
        assert_eq!(report.session.len(), 3);
        assert_eq!(report.session.mode(), AcquisitionMode::RawDebug);
    }
}
