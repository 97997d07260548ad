use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use pibridge_envelope::EnvelopeCodec;
use pibridge_transport::{DatagramReceiver, DatagramSender};

use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{NodeError, Result};
use crate::events::EventSink;
use crate::executor::ScriptExecutor;
use crate::publisher::Publisher;
use crate::receive::ReceiveLoop;
use crate::sensor::SensorSource;
use crate::shutdown::ShutdownFlag;
use crate::transmit::TransmitLoop;

/// Running bridge: one receive thread and, if telemetry is enabled, one
/// transmit thread.
pub struct BridgeHandle {
    shutdown: ShutdownFlag,
    receive_addr: SocketAddr,
    send_destination: Option<SocketAddr>,
    receive: Option<JoinHandle<()>>,
    transmit: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// A flag that stops both loops when triggered.
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Address the receive socket is bound to.
    pub fn receive_addr(&self) -> SocketAddr {
        self.receive_addr
    }

    /// Telemetry destination, `None` when telemetry is disabled.
    pub fn send_destination(&self) -> Option<SocketAddr> {
        self.send_destination
    }

    /// Ask both loops to stop.
    pub fn shutdown(&self) {
        self.shutdown.request_stop();
    }

    /// Wait for both loops to finish.
    pub fn join(mut self) -> Result<()> {
        let receive = self.receive.take().map(JoinHandle::join);
        let transmit = self.transmit.take().map(JoinHandle::join);
        if matches!(receive, Some(Err(_))) {
            return Err(NodeError::ThreadPanicked("receive"));
        }
        if matches!(transmit, Some(Err(_))) {
            return Err(NodeError::ThreadPanicked("transmit"));
        }
        Ok(())
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.shutdown.request_stop();
    }
}

/// Bind both sockets and start the loops.
///
/// Socket errors surface here, before any thread is started.
pub fn spawn<E, S>(
    config: &BridgeConfig,
    executor: E,
    sensor: S,
    sink: Arc<dyn EventSink>,
) -> Result<BridgeHandle>
where
    E: ScriptExecutor + 'static,
    S: SensorSource + 'static,
{
    config.validate()?;

    let transport = config.transport_config();
    let codec = EnvelopeCodec::new(config.codec_config());
    let shutdown = ShutdownFlag::new();

    let receiver = DatagramReceiver::bind_with_config(config.network.receive_bind, transport.clone())?;
    let receive_addr = receiver.local_addr();

    let transmit_loop = if config.telemetry.enabled {
        let sender = DatagramSender::bind_with_config(config.network.send_destination, &transport)?;
        let publisher = Publisher::new(codec.clone(), sender, sensor, config.publisher_config());
        Some(TransmitLoop::new(
            publisher,
            Arc::clone(&sink),
            config.timing.transmit_period,
        ))
    } else {
        tracing::info!("telemetry disabled");
        None
    };
    let send_destination = transmit_loop
        .as_ref()
        .map(|_| config.network.send_destination);

    let mut receive_loop = ReceiveLoop::new(
        receiver,
        codec,
        Dispatcher::new(executor),
        sink,
        config.timing.receive_idle_delay,
    );

    let flag = shutdown.clone();
    let receive = std::thread::Builder::new()
        .name("pibridge-rx".to_string())
        .spawn(move || receive_loop.run(&flag))?;

    let transmit = match transmit_loop {
        Some(mut transmit_loop) => {
            let flag = shutdown.clone();
            let spawned = std::thread::Builder::new()
                .name("pibridge-tx".to_string())
                .spawn(move || transmit_loop.run(&flag));
            match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    shutdown.request_stop();
                    let _ = receive.join();
                    return Err(err.into());
                }
            }
        }
        None => None,
    };

    tracing::info!(
        receive_addr = %receive_addr,
        send_destination = ?send_destination,
        "bridge started"
    );

    Ok(BridgeHandle {
        shutdown,
        receive_addr,
        send_destination,
        receive: Some(receive),
        transmit,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pibridge_envelope::{CodecConfig, CommandEnvelope};
    use pibridge_transport::TransportConfig;

    use super::*;
    use crate::dispatcher::tests::RecordingExecutor;
    use crate::events::{BridgeStats, LogSink};
    use crate::publisher::tests::ScriptedSensor;

    fn test_config(telemetry_to: SocketAddr) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.network.receive_bind = "127.0.0.1:0".parse().unwrap();
        config.network.send_destination = telemetry_to;
        config.network.receive_timeout = Duration::from_millis(100);
        config.timing.receive_idle_delay = Duration::from_millis(10);
        config.timing.transmit_period = Duration::from_millis(50);
        config
    }

    #[test]
    fn bridge_executes_commands_and_publishes_telemetry() {
        let recv_config = TransportConfig {
            receive_timeout: Some(Duration::from_secs(2)),
            ..TransportConfig::default()
        };
        let mut ground =
            DatagramReceiver::bind_with_config("127.0.0.1:0".parse().unwrap(), recv_config)
                .unwrap();

        let executor = RecordingExecutor::default();
        let stats = Arc::new(BridgeStats::new());
        let sink: Arc<dyn EventSink> = Arc::new((LogSink, Arc::clone(&stats)));
        let handle = spawn(
            &test_config(ground.local_addr()),
            executor.clone(),
            ScriptedSensor::default(),
            sink,
        )
        .unwrap();

        let codec = EnvelopeCodec::new(CodecConfig::default());
        let telemetry = ground.recv().unwrap().expect("telemetry datagram");
        let envelope = codec.decode_telemetry(&telemetry.payload).unwrap().unwrap();
        assert_eq!(envelope.seq_count, 1);

        let command = codec
            .encode_command(&CommandEnvelope::run_text("print('hi')"))
            .unwrap();
        let uplink = DatagramSender::bind(handle.receive_addr()).unwrap();
        uplink.send(&command).unwrap();

        for _ in 0..100 {
            if !executor.calls().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(executor.calls(), vec!["print('hi')".to_string()]);

        handle.shutdown();
        handle.join().unwrap();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.executed, 1);
        assert!(snapshot.published >= 1);
    }

    #[test]
    fn disabled_telemetry_starts_receive_only() {
        let mut config = test_config("127.0.0.1:9".parse().unwrap());
        config.telemetry.enabled = false;

        let handle = spawn(
            &config,
            RecordingExecutor::default(),
            ScriptedSensor::default(),
            Arc::new(LogSink),
        )
        .unwrap();
        assert_eq!(handle.send_destination(), None);
        handle.shutdown();
        handle.join().unwrap();
    }

    #[test]
    fn invalid_config_fails_before_binding() {
        let mut config = test_config("127.0.0.1:9".parse().unwrap());
        config.topics.telemetry_prefix = config.topics.command_prefix.clone();

        let err = spawn(
            &config,
            RecordingExecutor::default(),
            ScriptedSensor::default(),
            Arc::new(LogSink),
        )
        .err()
        .expect("validation error");
        assert!(matches!(err, NodeError::Config(_)));
    }
}
