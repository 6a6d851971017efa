//! External asset loading (scripts, stylesheets, fonts).
//!
//! Loads run concurrently; an individual failure never aborts the others
//! and is reported in the resulting [`AssetReport`].

use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinSet;

/// Future returned by [`AssetLoader::load`]. `Err` carries a reason.
pub type AssetFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// Loads one external resource identifier.
pub trait AssetLoader: Send + Sync {
    fn load(&self, id: &str) -> AssetFuture;
}

/// Loader that treats every asset as already present.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAssetLoader;

impl AssetLoader for NoopAssetLoader {
    fn load(&self, _id: &str) -> AssetFuture {
        Box::pin(async { Ok(()) })
    }
}

/// Outcome of loading a set of assets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssetReport {
    /// Loaded ids, in request order.
    pub loaded: Vec<String>,
    /// Failed ids with their reasons, in request order.
    pub failed: Vec<(String, String)>,
}

impl AssetReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load every id concurrently and wait for all of them.
pub(crate) async fn load_all(loader: &dyn AssetLoader, ids: &[String]) -> AssetReport {
    let mut set = JoinSet::new();
    for (index, id) in ids.iter().enumerate() {
        let fut = loader.load(id);
        set.spawn(async move { (index, fut.await) });
    }

    let mut outcomes: Vec<Option<Result<(), String>>> = vec![None; ids.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(e) => crate::debug!("assets"; "load task ended abnormally: {}", e),
        }
    }

    let mut report = AssetReport::default();
    for (id, outcome) in ids.iter().zip(outcomes) {
        match outcome {
            Some(Ok(())) => report.loaded.push(id.clone()),
            Some(Err(reason)) => report.failed.push((id.clone(), reason)),
            None => report.failed.push((id.clone(), "load task aborted".to_string())),
        }
    }
    report
}
