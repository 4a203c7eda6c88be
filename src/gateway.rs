//! # Gateway
//!
//! Startup sequence and main processing loop.
//!
//! [`start`] brings the radio up and hands it the producer end of the
//! receive handoff. [`Gateway`] then polls the consumer end, parses each
//! staged frame and renders accepted packets to the console.

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::handoff::{ReceiveContext, StagedFrames};
use crate::packet::crc::ChecksumScheme;
use crate::packet::protocol::PacketType;
use crate::parser::{self, FrameOutcome};
use crate::radio::{Radio, RadioSettings};
use crate::render::PacketGrid;

/// Configure the radio, register the receive handoff and start listening
///
/// # Errors
///
/// Returns error if the radio rejects its configuration or cannot start
/// listening. Nothing is registered when configuration fails.
pub async fn start<R>(radio: &mut R, settings: &RadioSettings, ctx: ReceiveContext) -> Result<()>
where
    R: Radio + ?Sized,
{
    if let Err(e) = radio.configure(settings).await {
        error!("Radio configuration failed: {}", e);
        return Err(e);
    }

    radio.on_frame_received(ctx.into_callback());
    radio.begin_listening().await?;

    info!("Listening on {} Hz", settings.frequency_hz);
    Ok(())
}

/// Packet counters kept by the main loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub socket_layout: u64,
    pub data: u64,
    pub unrecognized: u64,
    pub corrupt: u64,
}

impl GatewayStats {
    fn record(&mut self, outcome: &FrameOutcome) {
        match outcome {
            FrameOutcome::Accepted(packet) => match packet.packet_type() {
                PacketType::SocketLayout => self.socket_layout += 1,
                PacketType::Data => self.data += 1,
            },
            FrameOutcome::Rejected(err) if err.is_corrupt() => self.corrupt += 1,
            FrameOutcome::Rejected(_) => self.unrecognized += 1,
        }
    }
}

impl fmt::Display for GatewayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "socket_layout={} data={} unrecognized={} corrupt={}",
            self.socket_layout, self.data, self.unrecognized, self.corrupt
        )
    }
}

/// Main loop state (consumer side of the handoff)
#[derive(Debug)]
pub struct Gateway<W> {
    frames: StagedFrames,
    scheme: ChecksumScheme,
    render_rows: usize,
    out: W,
    stats: GatewayStats,
}

impl<W: Write> Gateway<W> {
    /// # Arguments
    ///
    /// * `frames` - Consumer end of the receive handoff
    /// * `config` - Checksum scheme and grid size
    /// * `out` - Console for rendered grids
    pub fn new(frames: StagedFrames, config: &GatewayConfig, out: W) -> Self {
        Self {
            frames,
            scheme: config.checksum,
            render_rows: config.render_rows,
            out,
            stats: GatewayStats::default(),
        }
    }

    /// Process the staged frame, if any
    ///
    /// The slot is freed before parsing, whatever the outcome.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing was staged
    /// * `Ok(Some(outcome))` - One frame processed
    ///
    /// # Errors
    ///
    /// Returns error if writing to the console fails, or once the radio
    /// listener has stopped and every staged frame was processed
    pub fn poll_once(&mut self) -> Result<Option<FrameOutcome>> {
        let Some(staged) = self.frames.take()? else {
            return Ok(None);
        };

        let outcome = parser::dispatch(staged.as_bytes(), self.scheme);
        self.stats.record(&outcome);

        if let FrameOutcome::Accepted(packet) = &outcome {
            writeln!(self.out, "{}", PacketGrid::new(packet, self.render_rows))?;
            self.out.flush()?;
        }

        Ok(Some(outcome))
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Log link and packet counters
    pub fn log_stats(&self) {
        info!(
            "Link: {} | Packets: {}",
            self.frames.stats().snapshot(),
            self.stats
        );
    }

    /// Poll until `shutdown` completes
    ///
    /// # Arguments
    ///
    /// * `poll_interval` - Delay between slot polls
    /// * `stats_interval` - Delay between counter logs
    /// * `shutdown` - Resolves when the loop should stop (e.g. Ctrl+C)
    ///
    /// # Errors
    ///
    /// Returns error if writing to the console fails or the radio listener
    /// stops. Rejected frames never stop the loop.
    pub async fn run<F>(&mut self, poll_interval: Duration, stats_interval: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut poll = interval(poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = interval_at(Instant::now() + stats_interval, stats_interval);
        tokio::pin!(shutdown);

        info!("Main loop started (poll every {} ms)", poll_interval.as_millis());

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.poll_once() {
                        error!("Main loop stopped: {}", e);
                        self.log_stats();
                        return Err(e);
                    }
                }

                _ = stats.tick() => {
                    self.log_stats();
                }

                _ = &mut shutdown => {
                    info!("Shutting down...");
                    self.log_stats();
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FrameError, GatewayError};
    use crate::handoff::{self, HandoffOutcome};
    use crate::packet::encoder::{encode_frame, seal_data, seal_socket_layout};
    use crate::packet::protocol::{Packet, SocketDescriptor};
    use crate::radio::{MockRadio, ReceivedFrame};
    use bytes::Bytes;
    use mockall::Sequence;
    use tokio_test::{assert_err, assert_ok};

    fn settings() -> RadioSettings {
        RadioSettings {
            frequency_hz: 433_000_000,
            bandwidth_hz: 125_000,
            spreading_factor: 7,
            coding_rate_denominator: 8,
            preamble_length: 8,
        }
    }

    fn gateway() -> (ReceiveContext, Gateway<Vec<u8>>) {
        let (ctx, frames) = handoff::channel();
        let gateway = Gateway::new(frames, &GatewayConfig::default(), Vec::new());
        (ctx, gateway)
    }

    fn deliver(ctx: &ReceiveContext, frame: &[u8]) -> HandoffOutcome {
        let mut radio = ReceivedFrame::new(Bytes::copy_from_slice(frame), -55);
        ctx.on_frame_received(&mut radio, frame.len())
    }

    fn scenario_frame() -> Vec<u8> {
        let descriptors = vec![
            SocketDescriptor { sensor_type: 1, sensor_id: 10 },
            SocketDescriptor { sensor_type: 2, sensor_id: 11 },
            SocketDescriptor { sensor_type: 1, sensor_id: 12 },
        ];
        let packet = Packet::SocketLayout(seal_socket_layout(4, descriptors, ChecksumScheme::Additive8));
        encode_frame(&packet).unwrap()
    }

    fn output(gateway: &Gateway<Vec<u8>>) -> String {
        String::from_utf8(gateway.output().clone()).unwrap()
    }

    #[tokio::test]
    async fn test_start_configures_then_listens() {
        let (ctx, mut frames) = handoff::channel();
        let mut radio = MockRadio::new();
        let mut seq = Sequence::new();

        radio
            .expect_configure()
            .withf(|s| s.frequency_hz == 433_000_000 && s.spreading_factor == 7)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        radio
            .expect_on_frame_received()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|mut callback| {
                // Exercise the registered handoff
                let mut frame = ReceivedFrame::new(Bytes::from_static(&[0x00, 0x02]), -40);
                callback(&mut frame, 2);
            });
        radio
            .expect_begin_listening()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        assert_ok!(start(&mut radio, &settings(), ctx).await);

        let staged = frames.take().unwrap().unwrap();
        assert_eq!(staged.as_bytes(), &[0x00, 0x02]);
        assert_eq!(frames.stats().snapshot().last_rssi, -40);
    }

    #[tokio::test]
    async fn test_start_configuration_failure_is_fatal() {
        let (ctx, _frames) = handoff::channel();
        let mut radio = MockRadio::new();

        radio
            .expect_configure()
            .times(1)
            .returning(|_| Err(GatewayError::Radio("modem rejected AT+BAND (+ERR=4)".to_string())));
        radio.expect_on_frame_received().times(0);
        radio.expect_begin_listening().times(0);

        let result = start(&mut radio, &settings(), ctx).await;
        assert!(matches!(result, Err(GatewayError::Radio(_))));
    }

    #[tokio::test]
    async fn test_start_listen_failure_is_reported() {
        let (ctx, _frames) = handoff::channel();
        let mut radio = MockRadio::new();

        radio.expect_configure().returning(|_| Ok(()));
        radio.expect_on_frame_received().returning(|_| ());
        radio
            .expect_begin_listening()
            .returning(|| Err(GatewayError::Radio("no response".to_string())));

        assert_err!(start(&mut radio, &settings(), ctx).await);
    }

    #[test]
    fn test_poll_once_with_nothing_staged() {
        let (_ctx, mut gateway) = gateway();

        assert_eq!(gateway.poll_once().unwrap(), None);
        assert!(gateway.output().is_empty());
    }

    #[test]
    fn test_end_to_end_socket_layout_scenario() {
        let (ctx, mut gateway) = gateway();

        assert_eq!(deliver(&ctx, &scenario_frame()), HandoffOutcome::Staged { len: scenario_frame().len() });
        let outcome = gateway.poll_once().unwrap().unwrap();

        assert!(outcome.is_accepted());
        assert!(!gateway.frames.is_ready());

        let text = output(&gateway);
        assert!(text.contains("|Device ID: 4   |"));
        assert!(text.contains("|SoID: 0        |SoID: 1        |SoID: 2        |"));
        assert!(text.contains("|Type: 1        |Type: 2        |Type: 1        |"));
        assert!(text.contains("|ID: 10         |ID: 11         |ID: 12         |"));
        assert_eq!(gateway.stats().socket_layout, 1);
    }

    #[test]
    fn test_data_packet_is_rendered() {
        let (ctx, mut gateway) = gateway();
        let packet = Packet::Data(seal_data(6, &[250, 1013], ChecksumScheme::Additive8));

        deliver(&ctx, &encode_frame(&packet).unwrap());
        gateway.poll_once().unwrap();

        assert!(output(&gateway).contains("|Val : 250      |Val : 1013     |"));
        assert_eq!(gateway.stats().data, 1);
    }

    #[test]
    fn test_unrecognized_type_leaves_slot_free() {
        let (ctx, mut gateway) = gateway();

        deliver(&ctx, &[0x00, 0x03, 0x0A, 0x00]);
        let outcome = gateway.poll_once().unwrap().unwrap();

        assert_eq!(outcome, FrameOutcome::Rejected(FrameError::UnrecognizedType(3)));
        assert!(gateway.output().is_empty());
        assert!(!gateway.frames.is_ready());
        assert_eq!(gateway.stats().unrecognized, 1);

        // Next frame is accepted into the slot
        assert!(matches!(deliver(&ctx, &scenario_frame()), HandoffOutcome::Staged { .. }));
        assert!(gateway.poll_once().unwrap().unwrap().is_accepted());
    }

    #[test]
    fn test_crc_bit_flip_is_not_rendered() {
        let (ctx, mut gateway) = gateway();
        let mut frame = scenario_frame();
        // Type tag, then header: 0x0A len, 0x08 device_id, 0x10 packet_crc
        assert_eq!(frame[6], 0x10);
        frame[7] ^= 0x01;

        deliver(&ctx, &frame);
        let outcome = gateway.poll_once().unwrap().unwrap();

        assert!(matches!(outcome, FrameOutcome::Rejected(ref err) if err.is_corrupt()));
        assert!(gateway.output().is_empty());
        assert_eq!(gateway.stats().corrupt, 1);
    }

    #[test]
    fn test_burst_processes_first_frame_only() {
        let (ctx, mut gateway) = gateway();
        let data = Packet::Data(seal_data(6, &[1], ChecksumScheme::Additive8));

        assert!(matches!(deliver(&ctx, &scenario_frame()), HandoffOutcome::Staged { .. }));
        assert!(matches!(
            deliver(&ctx, &encode_frame(&data).unwrap()),
            HandoffOutcome::Dropped { .. }
        ));

        assert!(gateway.poll_once().unwrap().unwrap().is_accepted());
        assert_eq!(gateway.poll_once().unwrap(), None);
        assert!(!gateway.frames.is_ready());

        assert_eq!(gateway.stats().socket_layout, 1);
        assert_eq!(gateway.stats().data, 0);
        assert_eq!(ctx.stats().snapshot().overruns, 1);
    }

    #[test]
    fn test_checksum_scheme_from_config() {
        let (ctx, frames) = handoff::channel();
        let config = GatewayConfig {
            checksum: ChecksumScheme::Crc16,
            ..GatewayConfig::default()
        };
        let mut gateway = Gateway::new(frames, &config, Vec::new());

        // Additive-sealed frame fails under CRC-16
        deliver(&ctx, &scenario_frame());
        assert!(!gateway.poll_once().unwrap().unwrap().is_accepted());

        let packet = Packet::Data(seal_data(6, &[1, 2], ChecksumScheme::Crc16));
        deliver(&ctx, &encode_frame(&packet).unwrap());
        assert!(gateway.poll_once().unwrap().unwrap().is_accepted());
    }

    #[tokio::test]
    async fn test_run_processes_until_shutdown() {
        let (ctx, mut gateway) = gateway();
        deliver(&ctx, &scenario_frame());

        let shutdown = tokio::time::sleep(Duration::from_millis(50));
        gateway
            .run(Duration::from_millis(5), Duration::from_secs(60), shutdown)
            .await
            .unwrap();

        assert!(output(&gateway).contains("|Device ID: 4   |"));
        assert!(!gateway.frames.is_ready());
    }

    #[tokio::test]
    async fn test_run_stops_when_radio_listener_exits() {
        let (ctx, mut gateway) = gateway();
        deliver(&ctx, &scenario_frame());
        // Reader task gone: its callback, and with it the producer, is dropped
        drop(ctx);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            gateway.run(Duration::from_millis(5), Duration::from_secs(60), std::future::pending()),
        )
        .await
        .expect("run did not notice the stopped listener");

        assert!(matches!(result, Err(GatewayError::Radio(_))));
        // The frame staged before the exit was still processed
        assert!(output(&gateway).contains("|Device ID: 4   |"));
        assert_eq!(gateway.stats().socket_layout, 1);
    }

    #[test]
    fn test_stats_display() {
        let stats = GatewayStats {
            socket_layout: 3,
            data: 10,
            unrecognized: 1,
            corrupt: 2,
        };
        assert_eq!(stats.to_string(), "socket_layout=3 data=10 unrecognized=1 corrupt=2");
    }
}
