use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use vidmeta::{MediaFile, StreamDescriptor, probe_path};

#[derive(Parser, Debug)]
#[command(version, about = "Print container and stream metadata for a video file")]
struct Args {
    /// Video file path
    path: PathBuf,

    /// Output as JSON instead of human-readable text
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let Some(media) = probe_path(&args.path)? else {
        eprintln!("{}: unrecognized container", args.path.display());
        return Ok(ExitCode::FAILURE);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&media)?);
    } else {
        print_human(&media);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_human(media: &MediaFile) {
    println!("Container: {}", media.container);
    for (index, stream) in media.streams() {
        match stream {
            StreamDescriptor::Video(v) => {
                let duration = v
                    .duration
                    .map(|d| format!("{d:.3} s"))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "  #{index} video codec={} {}x{} {:.3} fps duration={duration}",
                    v.codec, v.width, v.height, v.framerate
                );
            }
            StreamDescriptor::Audio(a) => {
                println!(
                    "  #{index} audio codec={} {} ch {} Hz {} bit",
                    a.codec, a.channels, a.sample_rate, a.bits_per_sample
                );
            }
        }
    }
}
