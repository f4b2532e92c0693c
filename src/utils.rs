use indicatif::ProgressStyle;
use indicatif::style::TemplateError;

/// Installs the `tracing` subscriber used by the binary: `RUST_LOG` style
/// filtering, with log lines routed around the progress bars.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let indicatif_layer = IndicatifLayer::new();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fei=info".into()))
        .with(fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

/// Bar with a known length, for pools of jobs.
pub fn get_style_bar() -> Result<ProgressStyle, TemplateError> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
        .progress_chars("=>-"))
}

/// Spinner for a single step without progress.
pub fn get_style_task() -> Result<ProgressStyle, TemplateError> {
    ProgressStyle::default_spinner().template("{spinner:.blue} {msg}")
}

/// Slashes can't be part of file names or database identifiers, and `J/psi`
/// has one.
pub fn remove_jpsi_slash(s: &str) -> String {
    s.replace('/', "")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_remove_jpsi_slash() {
        assert_eq!(
            remove_jpsi_slash("J/psi:generic ==> mu+:generic mu-:generic"),
            "Jpsi:generic ==> mu+:generic mu-:generic"
        );
    }

    #[test]
    fn test_styles() {
        assert!(get_style_bar().is_ok());
        assert!(get_style_task().is_ok());
    }
}
