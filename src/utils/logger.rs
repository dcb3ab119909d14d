use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_cli_logger(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("constructor=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("constructor=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Logging context handed to each component at construction time.
///
/// Components attach their events to `span()` instead of a process-wide
/// logger, so a run id set at the top shows up on every line below it.
#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
}

impl LogContext {
    pub fn root(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("run", id = %run_id),
        }
    }

    /// Context that discards its span, for tests and one-off helpers.
    pub fn disabled() -> Self {
        Self { span: Span::none() }
    }

    pub fn component(&self, name: &'static str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "component", name),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for LogContext {
    fn default() -> Self {
        Self::disabled()
    }
}
