use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    ficbookify::logging::init("info").context("init logging")?;

    let cli = ficbookify::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        ficbookify::cli::Command::Build(args) => {
            let out = ficbookify::build::run(args).context("build")?;
            println!("{}", out.display());
        }
        ficbookify::cli::Command::Chapters(args) => {
            let chapters = ficbookify::build::chapters(args).context("chapters")?;
            for chapter in chapters {
                println!(
                    "{}\t{}\t{}",
                    chapter.index,
                    chapter.url,
                    chapter.title.unwrap_or_default()
                );
            }
        }
        ficbookify::cli::Command::Profile(args) => {
            let profile = ficbookify::build::profile(args).context("profile")?;
            let json = serde_json::to_string_pretty(&profile).context("serialize profile")?;
            println!("{json}");
        }
    }

    Ok(())
}
