//! Asynchronous avatar loading.
//!
//! A load runs as a tokio task and reports back through a oneshot channel
//! that the frame loop polls. Only one load may be in flight; requests made
//! meanwhile are rejected, not queued. Cancelling bumps a generation counter
//! so a load that outlives its view can tell it is stale.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::animation::AnimationClip;
use crate::avatar::{AvatarInstance, VrmDocument};
use crate::error::{ClipError, LoadError};

/// Where an asset comes from.
#[derive(Debug, Clone)]
pub enum AssetSource {
    Path(PathBuf),
    /// In-memory asset, e.g. a file the user dropped onto the view
    Bytes { name: String, data: Arc<[u8]> },
}

impl AssetSource {
    pub fn bytes(name: &str, data: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes {
            name: name.to_string(),
            data: data.into(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Bytes { name, .. } => name.clone(),
        }
    }

    async fn read(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            Self::Path(path) => Ok(tokio::fs::read(path).await?.into()),
            Self::Bytes { data, .. } => Ok(Arc::clone(data)),
        }
    }
}

impl From<PathBuf> for AssetSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Optional looping idle animation
    pub idle_clip: Option<AssetSource>,
}

/// A parsed avatar, not yet attached to any scene.
#[derive(Debug)]
pub struct LoadedAvatar {
    pub avatar: AvatarInstance,
    pub idle_clip: Option<AnimationClip>,
}

/// Generation handle checked by a running load.
#[derive(Debug, Clone)]
pub struct LoadGuard {
    current: Arc<AtomicU64>,
    generation: u64,
}

impl LoadGuard {
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn check(&self) -> Result<(), LoadError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(LoadError::Cancelled)
        }
    }
}

async fn load_clip(source: &AssetSource) -> Result<AnimationClip, ClipError> {
    let data = source
        .read()
        .await
        .map_err(|e| ClipError::Read(format!("{}: {}", source.name(), e)))?;
    AnimationClip::from_glb(&data)
}

/// Read and parse an avatar plus its optional idle clip.
///
/// Idle clip problems are logged and dropped; the avatar is still returned.
pub async fn load_avatar(
    source: AssetSource,
    options: LoadOptions,
) -> Result<LoadedAvatar, LoadError> {
    load_guarded(source, options, None).await
}

async fn load_guarded(
    source: AssetSource,
    options: LoadOptions,
    guard: Option<LoadGuard>,
) -> Result<LoadedAvatar, LoadError> {
    let name = source.name();
    tracing::info!("Loading avatar '{}'", name);

    let data = source
        .read()
        .await
        .map_err(|e| LoadError::Read(format!("{}: {}", name, e)))?;
    if let Some(guard) = &guard {
        guard.check()?;
    }

    let doc = VrmDocument::from_glb(&data)?;
    let avatar = AvatarInstance::from_document(&name, doc);
    tracing::info!(
        "Avatar '{}' parsed: {} bones, {} expressions",
        name,
        avatar.human_bones().len(),
        avatar.slots().len()
    );

    let idle_clip = match &options.idle_clip {
        Some(clip_source) => match load_clip(clip_source).await {
            Ok(clip) => Some(clip),
            Err(e) => {
                tracing::warn!("Idle animation unavailable, continuing without it: {}", e);
                None
            }
        },
        None => None,
    };
    if let Some(guard) = &guard {
        guard.check()?;
    }

    Ok(LoadedAvatar { avatar, idle_clip })
}

/// Outcome of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTicket {
    Accepted { generation: u64 },
    /// Another load is in flight (or no runtime is available)
    Rejected,
}

/// A finished load, tagged with the generation it was started under.
#[derive(Debug)]
pub struct Completed {
    pub generation: u64,
    pub result: Result<LoadedAvatar, LoadError>,
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    rx: oneshot::Receiver<Result<LoadedAvatar, LoadError>>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct AvatarLoader {
    options: LoadOptions,
    generation: Arc<AtomicU64>,
    in_flight: Option<InFlight>,
}

impl AvatarLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: None,
        }
    }

    /// Options for loads started after this call.
    pub fn set_options(&mut self, options: LoadOptions) {
        self.options = options;
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start loading `source` unless a load is already running.
    pub fn request(&mut self, source: AssetSource) -> LoadTicket {
        if self.in_flight.is_some() {
            tracing::debug!("Load already in flight, ignoring request for '{}'", source.name());
            return LoadTicket::Rejected;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Cannot start avatar load outside a tokio runtime: {}", e);
                return LoadTicket::Rejected;
            }
        };

        let generation = self.generation();
        let guard = LoadGuard {
            current: Arc::clone(&self.generation),
            generation,
        };
        let options = self.options.clone();
        let (tx, rx) = oneshot::channel();

        let handle = runtime.spawn(async move {
            let result = load_guarded(source, options, Some(guard)).await;
            // Receiver gone means the view was torn down
            let _ = tx.send(result);
        });

        self.in_flight = Some(InFlight {
            generation,
            rx,
            handle,
        });
        LoadTicket::Accepted { generation }
    }

    /// Non-blocking check for a finished load. Clears the in-flight flag on
    /// success and failure alike.
    pub fn poll(&mut self) -> Option<Completed> {
        let in_flight = self.in_flight.as_mut()?;
        let generation = in_flight.generation;
        let result = match in_flight.rx.try_recv() {
            Ok(result) => result,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => Err(self.closed(generation)),
        };
        self.in_flight = None;
        Some(Completed { generation, result })
    }

    /// Wait for the in-flight load, if any.
    pub async fn settle(&mut self) -> Option<Completed> {
        let in_flight = self.in_flight.take()?;
        let result = match in_flight.rx.await {
            Ok(result) => result,
            Err(_) => Err(self.closed(in_flight.generation)),
        };
        Some(Completed {
            generation: in_flight.generation,
            result,
        })
    }

    /// The task dropped its sender without reporting. Under the current
    /// generation that means it panicked.
    fn closed(&self, generation: u64) -> LoadError {
        if self.is_current(generation) {
            tracing::error!("Avatar load task ended without a result");
            LoadError::TaskFailed
        } else {
            LoadError::Cancelled
        }
    }

    /// Invalidate the current generation and abort any running load.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(in_flight) = self.in_flight.take() {
            tracing::debug!("Cancelling in-flight avatar load");
            in_flight.handle.abort();
        }
    }
}

impl Drop for AvatarLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{avatar_glb, head_clip_glb, idle_clip_glb, plain_glb};

    fn source(expressions: &[&str]) -> AssetSource {
        AssetSource::bytes("test", avatar_glb(expressions))
    }

    #[tokio::test]
    async fn test_load_avatar_with_clip() {
        let options = LoadOptions {
            idle_clip: Some(AssetSource::bytes("idle", idle_clip_glb())),
        };
        let loaded = load_avatar(source(&["aa"]), options).await.unwrap();
        assert!(loaded.idle_clip.is_some());
        assert!(loaded.avatar.bone("head").is_some());
    }

    #[tokio::test]
    async fn test_bad_clip_is_not_fatal() {
        let options = LoadOptions {
            idle_clip: Some(AssetSource::bytes("idle", b"junk".to_vec())),
        };
        let loaded = load_avatar(source(&["aa"]), options).await.unwrap();
        assert!(loaded.idle_clip.is_none());

        let options = LoadOptions {
            idle_clip: Some(AssetSource::Path(PathBuf::from("does/not/exist.vrma"))),
        };
        assert!(load_avatar(source(&["aa"]), options).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let err = load_avatar(
            AssetSource::Path(PathBuf::from("does/not/exist.vrm")),
            LoadOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoadError::Read(_)));
        assert_eq!(err.user_message(), "Failed to load the VRM file");
    }

    #[tokio::test]
    async fn test_second_request_rejected_while_in_flight() {
        let mut loader = AvatarLoader::new(LoadOptions::default());

        let first = loader.request(source(&["aa"]));
        assert!(matches!(first, LoadTicket::Accepted { .. }));
        assert!(loader.is_loading());

        let second = loader.request(AssetSource::bytes("other", plain_glb()));
        assert_eq!(second, LoadTicket::Rejected);

        let done = loader.settle().await.unwrap();
        assert!(done.result.is_ok(), "first load unaffected by the rejected one");
        assert!(!loader.is_loading());
    }

    #[tokio::test]
    async fn test_failure_clears_in_flight() {
        let mut loader = AvatarLoader::new(LoadOptions::default());
        loader.request(AssetSource::bytes("plain", plain_glb()));

        let done = loader.settle().await.unwrap();
        assert!(matches!(done.result, Err(LoadError::NotVrm)));
        assert!(!loader.is_loading());
        assert!(matches!(
            loader.request(source(&[])),
            LoadTicket::Accepted { .. }
        ));
    }

    #[tokio::test]
    async fn test_poll_eventually_completes() {
        let mut loader = AvatarLoader::new(LoadOptions::default());
        loader.request(source(&["aa"]));

        let mut completed = None;
        for _ in 0..100 {
            if let Some(done) = loader.poll() {
                completed = Some(done);
                break;
            }
            tokio::task::yield_now().await;
        }
        let done = completed.expect("load finished");
        assert!(loader.is_current(done.generation));
    }

    #[tokio::test]
    async fn test_cancel_invalidates_generation() {
        let mut loader = AvatarLoader::new(LoadOptions::default());
        let LoadTicket::Accepted { generation } = loader.request(source(&["aa"])) else {
            panic!("request rejected");
        };

        loader.cancel();
        assert!(!loader.is_loading());
        assert!(!loader.is_current(generation));
        assert!(loader.poll().is_none());
        assert!(loader.settle().await.is_none());
    }

    #[test]
    fn test_request_without_runtime_is_rejected() {
        let mut loader = AvatarLoader::new(LoadOptions::default());
        assert_eq!(loader.request(source(&[])), LoadTicket::Rejected);
        assert!(!loader.is_loading());
    }

    #[tokio::test]
    async fn test_stale_guard_cancels() {
        let current = Arc::new(AtomicU64::new(1));
        let guard = LoadGuard {
            current: Arc::clone(&current),
            generation: 0,
        };
        let err = load_guarded(source(&[]), LoadOptions::default(), Some(guard))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Cancelled));
    }

    #[tokio::test]
    async fn test_malformed_clip_content_is_not_fatal() {
        let clips = [
            head_clip_glb(&[0.0, 1.0], u64::MAX / 4),
            head_clip_glb(&[0.0, 1.0], 64),
            head_clip_glb(&[f32::NAN, 1.0], 2),
            head_clip_glb(&[1.0, 0.5], 2),
        ];
        for clip in clips {
            let options = LoadOptions {
                idle_clip: Some(AssetSource::bytes("idle", clip)),
            };
            let loaded = load_avatar(source(&["aa"]), options).await.unwrap();
            assert!(loaded.idle_clip.is_none());
            assert!(loaded.avatar.bone("head").is_some());
        }
    }

    #[tokio::test]
    async fn test_loader_survives_malformed_clip() {
        let mut loader = AvatarLoader::new(LoadOptions {
            idle_clip: Some(AssetSource::bytes(
                "idle",
                head_clip_glb(&[0.0, 1.0], u64::MAX / 4),
            )),
        });
        loader.request(source(&["aa"]));

        let done = loader.settle().await.unwrap();
        let loaded = done.result.unwrap();
        assert!(loaded.idle_clip.is_none());
    }

    #[tokio::test]
    async fn test_dropped_sender_is_task_failure() {
        let mut loader = AvatarLoader::new(LoadOptions::default());
        let (tx, rx) = oneshot::channel();
        drop(tx);
        loader.in_flight = Some(InFlight {
            generation: loader.generation(),
            rx,
            handle: tokio::spawn(async {}),
        });

        let done = loader.poll().unwrap();
        assert!(matches!(done.result, Err(LoadError::TaskFailed)));
        assert_eq!(
            done.result.unwrap_err().user_message(),
            "Failed to load the VRM file"
        );
        assert!(!loader.is_loading());

        let stale = loader.generation();
        loader.generation.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        drop(tx);
        loader.in_flight = Some(InFlight {
            generation: stale,
            rx,
            handle: tokio::spawn(async {}),
        });
        let done = loader.settle().await.unwrap();
        assert!(matches!(done.result, Err(LoadError::Cancelled)));
    }
}
