use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::channel::{ModbusChannel, RegisterChannel};
use crate::config::{GripperConfig, PollPolicy};
use crate::error::{ChannelError, GripperError};
use crate::registers::{CommandWords, RegisterAddressParams, StatusBlock, DEFAULT_DEVICE_ADDRESS};
use crate::status::{ActivationStatus, GripperFault, GripperStatus};

/// Last known state of the gripper, as seen by its controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperState {
    Idle,
    /// Between the clear and enable writes of [`GripperController::activate`].
    Activating,
    /// A go-to command was written and convergence is not yet confirmed.
    Moving { target: u8 },
    Stopped,
    /// The last call failed. Says nothing about the device itself; re-query
    /// the status before issuing further commands.
    Faulted,
}

/// A "Go To" request, built like a command.
///
/// ```
/// use std::time::Duration;
/// use rq_gripper::MoveRequest;
///
/// let req = MoveRequest::new(128)
///     .speed(0xFF)
///     .force(0x40)
///     .timeout(Duration::from_secs(5));
/// assert!(req.wait);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    /// Target position, `0x00` fully open to `0xFF` fully closed.
    pub position: u16,
    pub speed: u8,
    pub force: u8,
    /// Block until the position converges.
    pub wait: bool,
    /// Overrides the controller's default timeout.
    pub timeout: Option<Duration>,
}

impl MoveRequest {
    pub fn new(position: u16) -> Self {
        Self {
            position,
            speed: 0,
            force: 0,
            wait: true,
            timeout: None,
        }
    }

    pub fn speed(mut self, speed: u8) -> Self {
        self.speed = speed;
        self
    }

    pub fn force(mut self, force: u8) -> Self {
        self.force = force;
        self
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Register-level controller of a single gripper.
///
/// Every operation borrows the controller mutably, so at most one command
/// is in flight. Share it behind a `tokio::sync::Mutex` if several tasks
/// need it.
///
/// The channel is released once, by [`close`](Self::close) or on drop.
pub struct GripperController<C: RegisterChannel> {
    channel: C,
    connected: bool,
    write_params: RegisterAddressParams,
    read_params: RegisterAddressParams,
    poll: PollPolicy,
    state: GripperState,
    last_position: Option<u8>,
}

impl<C: RegisterChannel> std::fmt::Debug for GripperController<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GripperController")
            .field("connected", &self.connected)
            .field("write_params", &self.write_params)
            .field("read_params", &self.read_params)
            .field("state", &self.state)
            .field("last_position", &self.last_position)
            .finish_non_exhaustive()
    }
}

impl GripperController<ModbusChannel> {
    /// Open the configured Modbus transport and build a controller on it.
    pub async fn connect(config: &GripperConfig) -> Result<Self, GripperError> {
        let slave_id = config.registers.write.device_address;
        let channel = ModbusChannel::connect(&config.connection, slave_id)
            .await
            .map_err(GripperError::Connection)?;
        info!(connection = ?config.connection, "connected to gripper");
        Ok(Self::with_config(channel, config))
    }
}

impl<C: RegisterChannel> GripperController<C> {
    /// Controller with the default register params and poll policy.
    pub fn new(channel: C) -> Self {
        Self::with_params(
            channel,
            RegisterAddressParams::command(DEFAULT_DEVICE_ADDRESS),
            RegisterAddressParams::status(DEFAULT_DEVICE_ADDRESS),
            PollPolicy::default(),
        )
    }

    pub fn with_config(channel: C, config: &GripperConfig) -> Self {
        Self::with_params(
            channel,
            config.registers.write,
            config.registers.read,
            config.poll_policy(),
        )
    }

    pub fn with_params(
        channel: C,
        write_params: RegisterAddressParams,
        read_params: RegisterAddressParams,
        poll: PollPolicy,
    ) -> Self {
        Self {
            channel,
            connected: true,
            write_params,
            read_params,
            poll,
            state: GripperState::Idle,
            last_position: None,
        }
    }

    pub fn state(&self) -> GripperState {
        self.state
    }

    /// Position seen by the most recent successful read.
    pub fn last_position(&self) -> Option<u8> {
        self.last_position
    }

    pub fn write_params(&self) -> &RegisterAddressParams {
        &self.write_params
    }

    pub fn read_params(&self) -> &RegisterAddressParams {
        &self.read_params
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    async fn write(&mut self, words: CommandWords) -> Result<(), GripperError> {
        if !self.connected {
            return Err(GripperError::Connection(ChannelError::Closed));
        }
        debug!(words = ?words.words(), "writing command");
        self.channel
            .write_registers(&self.write_params, &words)
            .await
            .map_err(|e| {
                self.state = GripperState::Faulted;
                GripperError::from(e)
            })
    }

    async fn read(&mut self) -> Result<StatusBlock, GripperError> {
        if !self.connected {
            return Err(GripperError::Connection(ChannelError::Closed));
        }
        self.channel
            .read_input_registers(&self.read_params)
            .await
            .map_err(|e| {
                self.state = GripperState::Faulted;
                GripperError::from(e)
            })
    }

    /// Decode a field of a fresh read, marking the controller faulted on garbage.
    fn decoded<T>(&mut self, value: Result<T, GripperError>) -> Result<T, GripperError> {
        if value.is_err() {
            self.state = GripperState::Faulted;
        }
        value
    }

    /// Clear `rACT`, resetting the gripper and clearing faults.
    pub async fn reset(&mut self) -> Result<&mut Self, GripperError> {
        self.write(CommandWords::clear()).await?;
        Ok(self)
    }

    /// Clear, then raise `rACT`.
    ///
    /// The two writes go out in this order. If the clear fails the enable is
    /// not sent.
    pub async fn activate(&mut self) -> Result<&mut Self, GripperError> {
        self.state = GripperState::Activating;
        self.write(CommandWords::clear()).await?;
        self.write(CommandWords::enable()).await?;
        self.state = GripperState::Idle;
        info!("gripper activation requested");
        Ok(self)
    }

    /// Wait for the activation routine to finish.
    ///
    /// Each status read is bounded by the same deadline as the wait itself.
    pub async fn wait_activated(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<&mut Self, GripperError> {
        let timeout = timeout.unwrap_or(self.poll.default_timeout);
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            let status = match tokio::time::timeout_at(deadline, self.status()).await {
                Ok(status) => status?,
                Err(_) => return Err(self.activation_timed_out(timeout)),
            };
            if status.sta == ActivationStatus::Completed {
                break;
            }
            if status.fault != GripperFault::NoFault {
                self.state = GripperState::Faulted;
                return Err(status.fault.into());
            }
            if started.elapsed() > timeout {
                return Err(self.activation_timed_out(timeout));
            }
            tokio::time::sleep(self.poll.interval).await;
        }
        Ok(self)
    }

    fn activation_timed_out(&mut self, timeout: Duration) -> GripperError {
        self.state = GripperState::Faulted;
        warn!(?timeout, "gripper activation timed out");
        GripperError::ActivationTimeout { timeout }
    }

    /// Command the gripper to go to a position with the requested speed and force.
    ///
    /// With `wait` set, polls the position until it converges or the timeout
    /// elapses. The write is never retried. Dropping the future cancels the wait.
    pub async fn go_to_position(&mut self, req: MoveRequest) -> Result<&mut Self, GripperError> {
        let target = u8::try_from(req.position).map_err(|_| {
            GripperError::InvalidArgument(format!(
                "position {} outside 0..=255",
                req.position
            ))
        })?;

        self.write(CommandWords::go_to(target, req.speed, req.force))
            .await?;
        self.state = GripperState::Moving { target };

        if req.wait {
            let timeout = req.timeout.unwrap_or(self.poll.default_timeout);
            self.await_position(target, timeout).await?;
        }
        Ok(self)
    }

    async fn await_position(&mut self, target: u8, timeout: Duration) -> Result<u8, GripperError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_position = None;
        loop {
            let position = match tokio::time::timeout_at(deadline, self.position()).await {
                Ok(position) => position?,
                Err(_) => return Err(self.move_timed_out(target, timeout, last_position)),
            };
            last_position = Some(position);
            if self.poll.convergence.converged(position, target) {
                self.state = GripperState::Idle;
                debug!(position, target, elapsed = ?started.elapsed(), "gripper converged");
                return Ok(position);
            }
            if started.elapsed() > timeout {
                return Err(self.move_timed_out(target, timeout, last_position));
            }
            trace!(position, target, "gripper moving");
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    fn move_timed_out(
        &mut self,
        target: u8,
        timeout: Duration,
        last_position: Option<u8>,
    ) -> GripperError {
        self.state = GripperState::Faulted;
        warn!(?last_position, target, ?timeout, "gripper did not converge");
        GripperError::Timeout {
            target,
            timeout,
            last_position,
        }
    }

    /// Current finger position, `0x00` open to `0xFF` closed.
    pub async fn position(&mut self) -> Result<u8, GripperError> {
        let block = self.read().await?;
        let position = self.decoded(block.position())?;
        self.last_position = Some(position);
        Ok(position)
    }

    /// The `gGTO` bit: whether a commanded motion is engaged.
    pub async fn action_status(&mut self) -> Result<bool, GripperError> {
        let block = self.read().await?;
        self.decoded(block.gto())
    }

    /// Full decoded status image.
    pub async fn status(&mut self) -> Result<GripperStatus, GripperError> {
        let block = self.read().await?;
        let status = self.decoded(GripperStatus::decode(&block))?;
        self.last_position = Some(status.pos);
        Ok(status)
    }

    /// Hold the fingers where they are. Same word as the enable step of activation.
    pub async fn stop(&mut self) -> Result<&mut Self, GripperError> {
        self.write(CommandWords::enable()).await?;
        self.state = GripperState::Stopped;
        Ok(self)
    }

    /// Release the channel. Later calls do nothing; cleanup errors are logged.
    pub async fn close(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        match self.channel.disconnect().await {
            Ok(()) => info!("gripper connection closed"),
            Err(e) => warn!(error = %e, "error during gripper cleanup"),
        }
    }
}

impl<C: RegisterChannel> Drop for GripperController<C> {
    fn drop(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread => {
                let channel = &mut self.channel;
                let result = tokio::task::block_in_place(move || handle.block_on(channel.disconnect()));
                if let Err(e) = result {
                    warn!(error = %e, "error during gripper cleanup");
                }
            }
            _ => debug!("gripper dropped without close, releasing transport on drop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedChannel {
        writes: Vec<[u16; 6]>,
        reads: VecDeque<Result<StatusBlock, ChannelError>>,
        fail_writes_from: Option<usize>,
        /// Reads past the scripted ones never complete instead of failing.
        silent_when_drained: bool,
        fail_disconnect: bool,
        disconnects: usize,
    }

    impl RegisterChannel for ScriptedChannel {
        async fn write_registers(
            &mut self,
            _params: &RegisterAddressParams,
            words: &CommandWords,
        ) -> Result<(), ChannelError> {
            if self.fail_writes_from.is_some_and(|n| self.writes.len() >= n) {
                return Err(ChannelError::Exception(tokio_modbus::Exception::ServerDeviceFailure));
            }
            self.writes.push(*words.words());
            Ok(())
        }

        async fn read_input_registers(
            &mut self,
            _params: &RegisterAddressParams,
        ) -> Result<StatusBlock, ChannelError> {
            match self.reads.pop_front() {
                Some(read) => read,
                None if self.silent_when_drained => std::future::pending().await,
                None => Err(ChannelError::Closed),
            }
        }

        async fn disconnect(&mut self) -> Result<(), ChannelError> {
            self.disconnects += 1;
            if self.fail_disconnect {
                return Err(ChannelError::Exception(tokio_modbus::Exception::ServerDeviceBusy));
            }
            Ok(())
        }
    }

    fn at(status: u16, position: u16) -> Result<StatusBlock, ChannelError> {
        Ok(StatusBlock::new(vec![status, 0, 0, position, position, 0]))
    }

    #[tokio::test]
    async fn starts_idle_with_device_params() {
        let gripper = GripperController::new(ScriptedChannel::default());
        assert_eq!(gripper.state(), GripperState::Idle);
        assert_eq!(gripper.last_position(), None);
        assert_eq!(gripper.write_params().register_offset, 1000);
        assert_eq!(gripper.read_params().register_offset, 2000);
    }

    #[tokio::test]
    async fn failed_clear_skips_enable() {
        let channel = ScriptedChannel {
            fail_writes_from: Some(0),
            ..Default::default()
        };
        let mut gripper = GripperController::new(channel);
        let err = gripper.activate().await.unwrap_err();
        assert!(matches!(err, GripperError::TransactionFailure(_)));
        assert!(gripper.channel.writes.is_empty());
        assert_eq!(gripper.state(), GripperState::Faulted);
    }

    #[tokio::test]
    async fn failed_enable_fails_activation() {
        let channel = ScriptedChannel {
            fail_writes_from: Some(1),
            ..Default::default()
        };
        let mut gripper = GripperController::new(channel);
        assert!(gripper.activate().await.is_err());
        assert_eq!(gripper.channel.writes, vec![[0, 0, 0, 0, 0, 0]]);
    }

    #[tokio::test]
    async fn go_to_without_wait_leaves_gripper_moving() {
        let mut gripper = GripperController::new(ScriptedChannel::default());
        gripper
            .go_to_position(MoveRequest::new(200).speed(10).force(20).wait(false))
            .await
            .unwrap();
        assert_eq!(gripper.channel.writes, vec![[9, 0, 0, 200, 10, 20]]);
        assert_eq!(gripper.state(), GripperState::Moving { target: 200 });
    }

    #[tokio::test]
    async fn position_caches_last_reading() {
        let mut channel = ScriptedChannel::default();
        channel.reads.push_back(at(0x09, 42));
        let mut gripper = GripperController::new(channel);
        assert_eq!(gripper.position().await.unwrap(), 42);
        assert_eq!(gripper.last_position(), Some(42));
    }

    #[tokio::test]
    async fn read_failure_is_typed_not_a_sentinel() {
        let mut channel = ScriptedChannel::default();
        channel.reads.push_back(Err(ChannelError::Exception(
            tokio_modbus::Exception::IllegalDataAddress,
        )));
        let mut gripper = GripperController::new(channel);
        assert!(matches!(
            gripper.position().await,
            Err(GripperError::TransactionFailure(_))
        ));
        assert_eq!(gripper.state(), GripperState::Faulted);
    }

    #[tokio::test]
    async fn garbage_position_is_a_protocol_violation() {
        let mut channel = ScriptedChannel::default();
        channel.reads.push_back(at(0x09, 300));
        let mut gripper = GripperController::new(channel);
        assert!(matches!(
            gripper.position().await,
            Err(GripperError::ProtocolViolation(_))
        ));
        assert_eq!(gripper.last_position(), None);
        assert_eq!(gripper.state(), GripperState::Faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_activated_polls_until_completed() {
        let mut channel = ScriptedChannel::default();
        channel.reads.push_back(at(0x11, 0));
        channel.reads.push_back(at(0x11, 0));
        channel.reads.push_back(at(0x31, 0));
        let mut gripper = GripperController::new(channel);
        gripper.wait_activated(None).await.unwrap();
        assert!(gripper.channel.reads.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_activated_surfaces_device_fault() {
        let mut channel = ScriptedChannel::default();
        channel
            .reads
            .push_back(Ok(StatusBlock::new(vec![0x01, 0, 0x0D, 0, 0, 0])));
        let mut gripper = GripperController::new(channel);
        let err = gripper.wait_activated(None).await.unwrap_err();
        assert!(matches!(
            err,
            GripperError::GripperFault(GripperFault::ActivationFault)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_activated_gives_up_on_a_silent_device() {
        let mut channel = ScriptedChannel {
            silent_when_drained: true,
            ..Default::default()
        };
        channel.reads.push_back(at(0x11, 0));
        let mut gripper = GripperController::new(channel);

        let started = Instant::now();
        let err = gripper
            .wait_activated(Some(Duration::from_millis(400)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GripperError::ActivationTimeout { timeout } if timeout == Duration::from_millis(400)
        ));
        assert!(err.to_string().contains("activation"));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(gripper.state(), GripperState::Faulted);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_activated_times_out_while_in_progress() {
        let mut channel = ScriptedChannel::default();
        for _ in 0..10 {
            channel.reads.push_back(at(0x11, 0));
        }
        let mut gripper = GripperController::new(channel);
        let err = gripper
            .wait_activated(Some(Duration::from_millis(250)))
            .await
            .unwrap_err();
        assert!(matches!(err, GripperError::ActivationTimeout { .. }));
    }

    #[tokio::test]
    async fn failed_disconnect_is_logged_not_returned() {
        let channel = ScriptedChannel {
            fail_disconnect: true,
            ..Default::default()
        };
        let mut gripper = GripperController::new(channel);
        gripper.close().await;
        gripper.close().await;
        assert!(!gripper.is_connected());
        assert_eq!(gripper.channel.disconnects, 1);
    }

    #[test]
    fn debug_shows_controller_state() {
        let gripper = GripperController::new(ScriptedChannel::default());
        let shown = format!("{gripper:?}");
        assert!(shown.starts_with("GripperController"));
        assert!(shown.contains("Idle"));
    }

    #[tokio::test]
    async fn closed_controller_refuses_commands() {
        let mut gripper = GripperController::new(ScriptedChannel::default());
        gripper.close().await;
        assert!(!gripper.is_connected());
        assert!(matches!(
            gripper.stop().await,
            Err(GripperError::Connection(ChannelError::Closed))
        ));
        assert!(gripper.channel.writes.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn drop_releases_open_channel() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct Counting(Arc<AtomicUsize>);

        impl RegisterChannel for Counting {
            async fn write_registers(
                &mut self,
                _params: &RegisterAddressParams,
                _words: &CommandWords,
            ) -> Result<(), ChannelError> {
                Ok(())
            }

            async fn read_input_registers(
                &mut self,
                _params: &RegisterAddressParams,
            ) -> Result<StatusBlock, ChannelError> {
                Err(ChannelError::Closed)
            }

            async fn disconnect(&mut self) -> Result<(), ChannelError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        drop(GripperController::new(Counting(count.clone())));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let mut closed = GripperController::new(Counting(count.clone()));
        closed.close().await;
        drop(closed);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
