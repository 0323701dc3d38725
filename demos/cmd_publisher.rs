// Keyboard teleop: W/S drive, X stop, B brake, F fault, 1-4 select motor, +/- speed, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::info;

use drv8830_zenoh_runtime::config::{NODE_ID, TOPIC_CMD_MOTOR};
use drv8830_zenoh_runtime::messages::{MotorCommand, MotorRequest};

const SPEEDS: [i32; 4] = [16, 32, 63, 255];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MOTOR).await?;

    info!("Controls: W/S=drive, X=stop, B=brake, F=fault, 1-4=motor, +/-=speed, Q=quit");
    print_speed(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut index: usize = 0;

    loop {
        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        let request = match code {
            KeyCode::Char('w') => MotorRequest::Drive(SPEEDS[speed_idx]),
            KeyCode::Char('s') => MotorRequest::Drive(-SPEEDS[speed_idx]),
            KeyCode::Char('x') => MotorRequest::Stop,
            KeyCode::Char('b') => MotorRequest::Brake,
            KeyCode::Char('f') => MotorRequest::Fault,

            KeyCode::Char(c @ '1'..='4') => {
                index = (c as u8 - b'1') as usize;
                info!("Motor index: {}", index);
                continue;
            }

            // Speed control
            KeyCode::Char('+') => {
                speed_idx = (speed_idx + 1).min(SPEEDS.len() - 1);
                print_speed(speed_idx);
                continue;
            }
            KeyCode::Char('-') => {
                speed_idx = speed_idx.saturating_sub(1);
                print_speed(speed_idx);
                continue;
            }

            // Quit: stop the selected motor on the way out
            KeyCode::Char('q') | KeyCode::Esc => {
                publish(publisher, index, MotorRequest::Stop).await?;
                break;
            }

            _ => continue,
        };

        publish(publisher, index, request).await?;
    }

    Ok(())
}

async fn publish(
    publisher: &zenoh::pubsub::Publisher<'_>,
    index: usize,
    request: MotorRequest,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cmd = MotorCommand {
        node: NODE_ID.to_string(),
        index,
        request,
    };
    publisher.put(serde_json::to_string(&cmd)?).await?;
    Ok(())
}

fn print_speed(idx: usize) {
    info!("Speed: {}", SPEEDS[idx]);
}
