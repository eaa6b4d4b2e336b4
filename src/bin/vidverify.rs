use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use vidmeta::{Verification, probe_path, verify_media};

#[derive(Parser, Debug)]
#[command(version, about = "Check a video file's size against its declared metadata")]
struct Args {
    /// Video file path
    path: PathBuf,

    /// Output as JSON instead of human-readable text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    file: String,
    actual_bytes: u64,
    verdict: Verification,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let media = probe_path(&args.path)?;
    let actual_bytes = std::fs::metadata(&args.path)?.len();
    let verdict = verify_media(media.as_ref(), actual_bytes);

    if args.json {
        let report = Report {
            file: args.path.display().to_string(),
            actual_bytes,
            verdict,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {:?}", args.path.display(), verdict);
    }

    Ok(if verdict == Verification::Ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
