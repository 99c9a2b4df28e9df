//! Tracing setup for the `rubric` binary. Library code only emits events.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a stderr fmt subscriber.
///
/// `RUBRIC_LOG` wins, then `RUST_LOG`, then the level implied by the flags.
pub fn init_tracing(verbose: bool, log_level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let level = match (verbose, log_level) {
        (_, Some(level)) => level,
        (true, None) => "debug",
        (false, None) => "warn",
    };

    let filter = EnvFilter::try_from_env("RUBRIC_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .try_init()?;
    Ok(())
}

fn default_directive(level: &str) -> String {
    if level.contains('=') {
        level.to_string()
    } else {
        format!("rubric_harness={level},usage={level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_are_scoped_to_the_crate() {
        assert_eq!(default_directive("debug"), "rubric_harness=debug,usage=debug");
        assert_eq!(default_directive("reqwest=trace"), "reqwest=trace");
    }
}
