use clap::Parser;
use client::game::JudgmentEngine;
use client::handshake;
use client::input::{InputManager, LaneEvent};
use client::network::Connection;
use client::rendering::{Hud, Renderer, WINDOW_HEIGHT, WINDOW_WIDTH};
use log::{error, info};
use macroquad::prelude::*;
use shared::{elapsed_ms_since, Chart, DEFAULT_CHART, DEFAULT_HOST, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to connect to
    #[arg(short = 'H', long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Chart to play; must be the one the server loaded
    #[arg(short, long, default_value = DEFAULT_CHART)]
    chart: String,

    /// Name shown to the other player
    #[arg(short, long)]
    name: String,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Snowfall".to_owned(),
        window_width: WINDOW_WIDTH,
        window_height: WINDOW_HEIGHT,
        window_resizable: false,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let chart = Chart::load(&args.chart)?;
    let audio = chart.audio_path(&args.chart)?;
    info!(
        "Loaded {} notes from {} (audio {}, offset {} ms)",
        chart.len(),
        args.chart,
        audio.display(),
        chart.offset
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let address = format!("{}:{}", args.host, args.port);
    let (stream, start) = runtime.block_on(handshake::connect(&address, &args.name))?;
    info!("Synchronized, playback starts in {:.0} ms", -elapsed_ms_since(start));

    let (reader, writer) = stream.into_split();
    let mut connection = Connection::spawn(runtime.handle(), reader, writer, args.name.clone());
    let mut engine = JudgmentEngine::new(&chart);
    let mut input = InputManager::new();
    let mut renderer = Renderer::new(WINDOW_WIDTH, WINDOW_HEIGHT);

    info!("Controls: Q W E R O P [ ] for lanes 1-8, Escape to quit");

    loop {
        let elapsed = elapsed_ms_since(start);

        let (quit, events) = input.update();
        if quit {
            info!("Quit requested");
            break;
        }
        for event in events {
            let judged = match *event {
                LaneEvent::Down(lane) => engine.key_down(lane, elapsed),
                LaneEvent::Up(lane) => engine.key_up(lane, elapsed),
            };
            if let Some(judged) = judged {
                connection.send(judged);
            }
        }

        for (note_id, judgment) in connection.drain() {
            engine.apply_remote(note_id, judgment);
        }
        for missed in engine.tick(elapsed) {
            connection.send(missed);
        }

        if engine.is_over(elapsed) {
            info!("Chart finished");
            break;
        }

        let hud = Hud {
            name: &args.name,
            connected: connection.is_connected(),
            elapsed,
        };
        renderer.render(&engine, &hud);

        next_frame().await;
    }

    runtime.block_on(connection.shutdown());
    println!("{}", engine.stats());

    Ok(())
}
