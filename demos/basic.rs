use std::time::Duration;

use rq_gripper::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // optional path to a JSON config, defaults to RTU on /dev/ttyUSB0
    let config = match std::env::args().nth(1) {
        Some(path) => GripperConfig::from_json_file(path)?,
        None => GripperConfig::default(),
    };

    let mut gripper = GripperController::connect(&config).await?;

    // Reset and activation of gripper
    gripper.activate().await?.wait_activated(None).await?;
    println!("finished activation.");

    // Move and wait, bounded by a timeout
    gripper
        .go_to_position(MoveRequest::new(128).timeout(Duration::from_secs(5)))
        .await?;
    println!("Current position: {}", gripper.position().await?);

    gripper.go_to_position(MoveRequest::new(50)).await?;
    println!("Current position: {}", gripper.position().await?);

    // Incremental movement without waiting
    for pos in (50..200).step_by(25) {
        gripper
            .go_to_position(MoveRequest::new(pos).wait(false))
            .await?;
        println!("Moved to position: {pos}");
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    gripper.stop().await?;
    println!("{}", serde_json::to_string_pretty(&gripper.status().await?)?);

    gripper.close().await;
    Ok(())
}
