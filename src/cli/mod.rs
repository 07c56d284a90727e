pub mod args;
pub mod reporter;

pub use args::Cli;
pub use reporter::{ReportBuilder, ReportFormatter};

use crate::cancellation::{cancellation_pair, CancellationHandle};
use crate::error::ScanError;
use crate::pipeline;
use futures::{Stream, StreamExt};
use tracing::{info, warn};

pub struct CliHandler {
    cli: Cli,
}

impl CliHandler {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Runs one scan and returns the process exit code.
    pub async fn run(&self) -> Result<i32, ScanError> {
        let config = self.cli.to_run_config()?;
        info!("Backend: {}", config.backend.label());

        let (handle, signal) = cancellation_pair();
        let ctrl_c = tokio::spawn(async move {
            let interrupts = futures::stream::unfold((), |()| async {
                tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
            });
            if forward_interrupts(Box::pin(interrupts), handle).await {
                warn!("Second interrupt received; exiting immediately");
                std::process::exit(130);
            }
        });

        let result = pipeline::run(&config, &signal).await;
        ctrl_c.abort();
        let output = result?;

        let formatter = ReportFormatter::new(self.cli.should_use_color(), self.cli.is_verbose());
        println!("{}", formatter.format_run_summary(&output.report_path, &output.summary));

        Ok(output.exit_code())
    }
}

/// The first interrupt cancels the run so in-flight work can wind down.
/// Returns `true` when a second one arrives before the stream ends.
async fn forward_interrupts<S>(mut interrupts: S, handle: CancellationHandle) -> bool
where
    S: Stream<Item = ()> + Unpin,
{
    if interrupts.next().await.is_none() {
        return false;
    }
    warn!("Interrupt received; finishing in-flight work (press Ctrl-C again to exit now)");
    handle.cancel();

    interrupts.next().await.is_some()
}
