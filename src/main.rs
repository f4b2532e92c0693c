use std::fs;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use console::style;
use fei::fei::{FeiConfig, Particle, Teacher};
use fei::utils::{get_style_task, init_logging};
use serde_json::json;
use tracing_indicatif::span_ext::IndicatifSpanExt;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one pass and write the path to run next as JSON.
    Advance {
        /// JSON file with the particles to reconstruct.
        #[arg(long)]
        particles: Utf8PathBuf,
        #[arg(long, default_value = ".")]
        workdir: Utf8PathBuf,
        /// Stages already reconstructed. Taken from the checkpoint if omitted.
        #[arg(long, allow_negative_numbers = true)]
        cache: Option<i32>,
        /// Prefix of the weight files in the database.
        #[arg(long)]
        prefix: Option<String>,
        /// Apply the trained classifiers instead of training them.
        #[arg(long)]
        application: bool,
        /// Record MC matching and module statistics.
        #[arg(long)]
        monitor: bool,
        /// Write the path to this file instead of stdout.
        #[arg(long)]
        output: Option<Utf8PathBuf>,
        /// Write a Mermaid diagram of the last resolved stage to this file.
        #[arg(long)]
        mermaid: Option<Utf8PathBuf>,
    },
    /// Train the classifiers requested by the last pass.
    Train {
        #[arg(long, default_value = ".")]
        workdir: Utf8PathBuf,
        #[arg(long)]
        prefix: Option<String>,
        /// Command invoked once per classifier.
        #[arg(long)]
        teacher: Option<String>,
        /// Size of the training pool, one worker per core if omitted.
        #[arg(long)]
        threads: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let defaults = FeiConfig::default();

    match args.command {
        Command::Advance {
            particles,
            workdir,
            cache,
            prefix,
            application,
            monitor,
            output,
            mermaid,
        } => {
            let particles: Vec<Particle> = serde_json::from_str(&fs::read_to_string(&particles)?)?;
            let config = FeiConfig {
                prefix: prefix.unwrap_or(defaults.prefix),
                cache,
                monitor,
                training: !application,
                ..FeiConfig::default()
            };
            fs::create_dir_all(&workdir)?;

            let state = {
                let span = tracing::info_span!("advance");
                span.pb_set_style(&get_style_task()?);
                span.pb_set_message("Resolving stages...");
                let _enter = span.enter();
                fei::advance(&particles, &config, &workdir)?
            };

            if let Some(file) = mermaid
                && let Some(last) = state.reports.last()
            {
                fs::write(file, last.report.render_mermaid(&last.sequence))?;
            }

            let content = serde_json::to_string_pretty(&json!({
                "stage": state.stage,
                "plists": state.plists,
                "path": state.path,
            }))?;
            match output {
                Some(file) => fs::write(file, content)?,
                None => println!("{content}"),
            }

            eprintln!(
                "{} next stage {}, {} lists, {} modules",
                style("Done:").green().bold(),
                state.stage,
                state.plists.len(),
                state.path.len()
            );
        }
        Command::Train {
            workdir,
            prefix,
            teacher,
            threads,
        } => {
            let config = FeiConfig {
                prefix: prefix.unwrap_or(defaults.prefix),
                extern_teacher: teacher.unwrap_or(defaults.extern_teacher),
                threads,
                ..FeiConfig::default()
            };
            let uploaded = Teacher::new(&config, &workdir).do_all_trainings()?;

            for (disk, identifier) in &uploaded {
                eprintln!("{} {disk} as {identifier}", style("Uploaded").cyan());
            }
            eprintln!(
                "{} {} weight files",
                style("Done:").green().bold(),
                uploaded.len()
            );
        }
    }

    Ok(())
}
