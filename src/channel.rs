//! Register transport seam.

use std::time::Duration;

use tokio_modbus::prelude::*;
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::ChannelError;
use crate::registers::{
    CommandWords, RegisterAddressParams, StatusBlock, IMAGE_REGISTERS, READ_HOLDING_REGISTERS,
    READ_INPUT_REGISTERS,
};

/// Bounded-width register transactions against a single gripper.
///
/// Implementations carry no protocol knowledge and never retry; the
/// controller decides how a failure is surfaced.
#[allow(async_fn_in_trait)]
pub trait RegisterChannel {
    /// Write a command image at `params`.
    async fn write_registers(
        &mut self,
        params: &RegisterAddressParams,
        words: &CommandWords,
    ) -> Result<(), ChannelError>;

    /// Read the status image at `params`.
    async fn read_input_registers(
        &mut self,
        params: &RegisterAddressParams,
    ) -> Result<StatusBlock, ChannelError>;

    /// Release the underlying transport.
    async fn disconnect(&mut self) -> Result<(), ChannelError>;
}

/// [`RegisterChannel`] over a `tokio-modbus` client context, RTU or TCP.
pub struct ModbusChannel {
    ctx: client::Context,
}

impl std::fmt::Debug for ModbusChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModbusChannel").finish_non_exhaustive()
    }
}

impl ModbusChannel {
    /// Constructor from a modbus context.
    pub fn new(ctx: client::Context) -> Self {
        Self { ctx }
    }

    /// Open an RS-485 serial port and attach to `slave_id`.
    pub fn rtu(
        path: impl Into<String>,
        baud_rate: u32,
        parity: tokio_serial::Parity,
        stop_bits: tokio_serial::StopBits,
        timeout: Duration,
        slave_id: u8,
    ) -> Result<Self, ChannelError> {
        let port = tokio_serial::new(path.into(), baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(stop_bits)
            .parity(parity)
            .timeout(timeout)
            .open_native_async()
            .map_err(std::io::Error::from)?;

        Ok(Self::new(rtu::attach_slave(port, Slave(slave_id))))
    }

    /// Connect to a Modbus TCP endpoint and attach to `slave_id`.
    pub async fn tcp(host: &str, port: u16, slave_id: u8) -> Result<Self, ChannelError> {
        let addr = tokio::net::lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for {host}:{port}"),
                )
            })?;
        let ctx = tcp::connect_slave(addr, Slave(slave_id)).await?;
        Ok(Self::new(ctx))
    }

    /// Open whichever transport `config` names.
    pub async fn connect(config: &ConnectionConfig, slave_id: u8) -> Result<Self, ChannelError> {
        match config {
            ConnectionConfig::Rtu {
                path,
                baud_rate,
                parity,
                stop_bits,
                timeout_ms,
            } => Self::rtu(
                path.clone(),
                *baud_rate,
                (*parity).into(),
                (*stop_bits).into(),
                Duration::from_millis(*timeout_ms),
                slave_id,
            ),
            ConnectionConfig::Tcp { host, port } => Self::tcp(host, *port, slave_id).await,
        }
    }
}

fn check_width(params: &RegisterAddressParams, requested: usize) -> Result<(), ChannelError> {
    if requested > params.register_count as usize {
        return Err(ChannelError::TooWide {
            requested,
            allowed: params.register_count,
        });
    }
    Ok(())
}

impl RegisterChannel for ModbusChannel {
    async fn write_registers(
        &mut self,
        params: &RegisterAddressParams,
        words: &CommandWords,
    ) -> Result<(), ChannelError> {
        let registers = words.to_registers();
        check_width(params, registers.len())?;
        self.ctx.set_slave(Slave(params.device_address));
        debug!(offset = params.register_offset, ?registers, "modbus write");
        Ok(self
            .ctx
            .write_multiple_registers(params.register_offset, &registers)
            .await??)
    }

    async fn read_input_registers(
        &mut self,
        params: &RegisterAddressParams,
    ) -> Result<StatusBlock, ChannelError> {
        check_width(params, IMAGE_REGISTERS)?;
        self.ctx.set_slave(Slave(params.device_address));
        let registers = match params.function_code {
            READ_HOLDING_REGISTERS => {
                self.ctx
                    .read_holding_registers(params.register_offset, IMAGE_REGISTERS as u16)
                    .await??
            }
            READ_INPUT_REGISTERS => {
                self.ctx
                    .read_input_registers(params.register_offset, IMAGE_REGISTERS as u16)
                    .await??
            }
            other => return Err(ChannelError::UnsupportedFunction(other)),
        };
        debug!(offset = params.register_offset, ?registers, "modbus read");
        Ok(StatusBlock::from_registers(&registers))
    }

    async fn disconnect(&mut self) -> Result<(), ChannelError> {
        Ok(self.ctx.disconnect().await??)
    }
}
