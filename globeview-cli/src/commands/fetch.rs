//! Fetch command - run one loader frame against the configured provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use globeview::cache::TileCache;
use globeview::loader::{FrameTiles, LoadEvent, TileLoader};
use globeview::provider::{ReqwestClient, TemplateProvider};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use super::common::{load_config, ViewportArgs};
use crate::error::CliError;

/// Arguments for the fetch command.
pub struct FetchArgs {
    pub viewport: ViewportArgs,
    pub output_dir: Option<PathBuf>,
    pub max_wait_secs: u64,
}

/// Outcome of waiting on one frame's loads.
#[derive(Debug, Default, PartialEq, Eq)]
struct FrameOutcome {
    ready: usize,
    superseded: usize,
    failed: usize,
    timed_out: usize,
}

/// Run the fetch command.
pub fn run(args: FetchArgs) -> Result<(), CliError> {
    let config = load_config()?;
    let geometry = config.viewport_geometry()?;
    let template = config.template_config()?;
    let scheme = args.viewport.projection(&config);
    let state = args.viewport.state(geometry)?;

    let runtime = Runtime::new().map_err(|e| CliError::Runtime(e.to_string()))?;
    let client = ReqwestClient::with_config(template.timeout_secs, &template.user_agent)?;
    let provider = TemplateProvider::new(client, template)?;

    println!("Provider: {}", provider.config().url_template);
    println!("Scheme:   {}", scheme);
    println!();

    let cache = TileCache::new(
        Arc::new(provider),
        config.cache_config(scheme),
        runtime.handle().clone(),
    );
    let (mut loader, mut events) =
        TileLoader::new(cache, geometry, scheme, config.loader_config());

    let started = Instant::now();
    let frame = loader.update(&state);
    println!("Tile box: {}", frame.tile_box);
    println!(
        "Requested {} tiles ({} deferred in the prefetch margin)",
        frame.requested,
        frame.deferred.len()
    );

    let outcome = runtime.block_on(wait_for_frame(
        &mut events,
        frame.requested,
        Duration::from_secs(args.max_wait_secs),
    ));
    info!(
        ready = outcome.ready,
        failed = outcome.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Frame loads finished"
    );

    println!();
    println!("Ready:     {}", outcome.ready);
    println!("Failed:    {}", outcome.failed);
    if outcome.timed_out > 0 {
        println!("Timed out: {}", outcome.timed_out);
    }
    println!("Elapsed:   {:.2?}", started.elapsed());
    println!("Cache:     {}", loader.cache().stats());

    if let Some(dir) = &args.output_dir {
        let written = write_tiles(&loader, &frame, dir)?;
        println!("Wrote {} tile images to {}", written, dir.display());
    }

    if outcome.failed > 0 {
        return Err(CliError::TilesFailed(outcome.failed));
    }
    Ok(())
}

/// Collects completion events until `expected` arrived or `max_wait` elapsed.
async fn wait_for_frame(
    events: &mut UnboundedReceiver<LoadEvent>,
    expected: usize,
    max_wait: Duration,
) -> FrameOutcome {
    let mut outcome = FrameOutcome::default();
    let deadline = tokio::time::Instant::now() + max_wait;

    for _ in 0..expected {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(LoadEvent::Ready { .. })) => outcome.ready += 1,
            Ok(Some(LoadEvent::Superseded { .. })) => outcome.superseded += 1,
            Ok(Some(LoadEvent::Failed { address, error })) => {
                warn!(tile = %address, error = %error, "Tile failed");
                outcome.failed += 1;
            }
            Ok(None) | Err(_) => break,
        }
    }
    let seen = outcome.ready + outcome.superseded + outcome.failed;
    outcome.timed_out = expected.saturating_sub(seen);
    outcome
}

/// Writes the best available image of every displayed tile as
/// `<zoom>_<x>_<y>.png`. Tiles with nothing to show are skipped.
fn write_tiles(loader: &TileLoader, frame: &FrameTiles, dir: &Path) -> Result<usize, CliError> {
    std::fs::create_dir_all(dir)?;
    let mut written = 0;
    for placed in &frame.displayed {
        let tile = placed.address;
        let Some(best) = loader.cache().get_best_available(&tile) else {
            continue;
        };
        let path = dir.join(format!("{}_{}_{}.png", tile.zoom, tile.x, tile.y));
        best.image
            .save(&path)
            .map_err(|e| CliError::Output(std::io::Error::other(e.to_string())))?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use globeview::cache::LoadError;
    use globeview::coord::TileAddress;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_wait_counts_each_event_kind() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let t = TileAddress::unchecked(0, 0, 1);
        tx.send(LoadEvent::Ready { address: t, epoch: 1 }).unwrap();
        tx.send(LoadEvent::Superseded { address: t }).unwrap();
        tx.send(LoadEvent::Failed {
            address: t,
            error: LoadError::Decode("bad".into()),
        })
        .unwrap();

        let outcome = wait_for_frame(&mut rx, 3, Duration::from_secs(1)).await;
        assert_eq!(
            outcome,
            FrameOutcome {
                ready: 1,
                superseded: 1,
                failed: 1,
                timed_out: 0
            }
        );
    }

    #[tokio::test]
    async fn test_wait_reports_missing_events_as_timed_out() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(LoadEvent::Ready {
            address: TileAddress::unchecked(0, 0, 1),
            epoch: 1,
        })
        .unwrap();

        let outcome = wait_for_frame(&mut rx, 3, Duration::from_millis(50)).await;
        assert_eq!(outcome.ready, 1);
        assert_eq!(outcome.timed_out, 2);
    }
}
