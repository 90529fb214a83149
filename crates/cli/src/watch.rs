use anyhow::Result;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rndsnd_core::config::AppConfig;
use rndsnd_core::pipeline;
use rndsnd_core::scanner::is_audio_file;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Watched roots that contain at least one changed audio path, in root order.
pub fn roots_for_paths(changed: &[PathBuf], roots: &[PathBuf]) -> Vec<PathBuf> {
    roots
        .iter()
        .filter(|root| {
            changed
                .iter()
                .any(|p| is_audio_file(p) && p.starts_with(root.as_path()))
        })
        .cloned()
        .collect()
}

fn canonical(p: &Path) -> PathBuf {
    p.canonicalize().unwrap_or_else(|_| p.to_path_buf())
}

/// Re-runs a delta-scan of a root whenever an audio file under it changes.
pub async fn watch_paths(cfg: AppConfig, paths: Vec<PathBuf>, cancel: CancellationToken) -> Result<()> {
    let mut watch_list: Vec<PathBuf> = if paths.is_empty() {
        cfg.scan.include.iter().map(PathBuf::from).collect()
    } else {
        paths
    };
    if watch_list.is_empty() {
        watch_list.push(PathBuf::from("."));
    }
    let watch_list: Vec<PathBuf> = watch_list.iter().map(|p| canonical(p)).collect();

    let (tx, mut rx) = unbounded_channel();
    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        },
        notify::Config::default().with_poll_interval(Duration::from_secs(2)),
    )?;
    for p in &watch_list {
        watcher.watch(p, RecursiveMode::Recursive)?;
    }

    // Bring the catalog up to date before waiting for changes.
    pipeline::run_scan(&cfg, &watch_list, &cancel, None).await?;
    println!("Watching {} path(s)...", watch_list.len());

    loop {
        let first = tokio::select! {
            _ = cancel.cancelled() => break,
            ev = rx.recv() => match ev {
                Some(ev) => ev,
                None => break,
            },
        };
        let mut changed = Vec::new();
        let mut pending = vec![first];
        // Editors and copy tools emit bursts; fold them into one rescan.
        tokio::time::sleep(Duration::from_millis(500)).await;
        while let Ok(ev) = rx.try_recv() {
            pending.push(ev);
        }
        for ev in pending {
            match ev {
                Ok(event) => changed.extend(event.paths),
                Err(e) => warn!("watch error: {:?}", e),
            }
        }

        for root in roots_for_paths(&changed, &watch_list) {
            match pipeline::run_scan(&cfg, std::slice::from_ref(&root), &cancel, None).await {
                Ok(result) => info!(
                    "Rescanned {:?}: {} indexed, {} removed",
                    root, result.files_newly_indexed, result.files_removed
                ),
                Err(e) => eprintln!("rescan error for {:?}: {}", root, e),
            }
        }
    }
    Ok(())
}
