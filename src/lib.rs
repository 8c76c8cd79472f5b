//! # rq-gripper
//!
//! `rq-gripper` controls a Robotiq-style gripper at the register level, either
//! directly over Modbus RTU/TCP or through any transport that can move the
//! gripper's command and status images (for example an arm controller that
//! tunnels Modbus to its tool flange).
//!
//! ### Compatible product
//! - [x] Robotiq 2F-85
//! - [x] Robotiq 2F-140
//! - [x] HandE
//!
//! ## Register contract
//! | Transaction | Offset | Words |
//! |---|---|---|
//! | write | `1000` | `[action, 0, 0, position, speed, force]` |
//! | read | `2000` | `[status, _, fault, position request, position, current]` |
//!
//! Action `0` clears, `1` enables (and holds), `9` goes to the requested position.
//! Bit 3 of the status byte is `gGTO`.
//!
//! ## Example
//! ```no_run
//! use std::time::Duration;
//! use rq_gripper::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GripperError> {
//!     let config = GripperConfig {
//!         connection: ConnectionConfig::Tcp {
//!             host: "192.168.1.18".into(),
//!             port: 502,
//!         },
//!         ..Default::default()
//!     };
//!     let mut gripper = GripperController::connect(&config).await?;
//!
//!     // clear, then raise the activation bit
//!     gripper.activate().await?.wait_activated(None).await?;
//!
//!     // move and block until the fingers arrive, or give up after 5 seconds
//!     gripper
//!         .go_to_position(MoveRequest::new(128).timeout(Duration::from_secs(5)))
//!         .await?;
//!     println!("position: {}", gripper.position().await?);
//!
//!     // fire and forget, then hold wherever the fingers are
//!     gripper
//!         .go_to_position(MoveRequest::new(0xFF).speed(0xFF).wait(false))
//!         .await?
//!         .stop()
//!         .await?;
//!
//!     gripper.close().await;
//!     Ok(())
//! }
//! ```

mod channel;
mod config;
mod error;
mod gripper;
mod registers;
mod status;

pub use channel::{ModbusChannel, RegisterChannel};
pub use config::{
    ConnectionConfig, Convergence, GripperConfig, Parity, PollConfig, PollPolicy, RegisterConfig,
    StopBits,
};
pub use error::{ChannelError, ConfigError, GripperError};
pub use gripper::{GripperController, GripperState, MoveRequest};
pub use registers::*;
pub use status::{ActivationStatus, GripperFault, GripperStatus, ObjDetectStatus};
