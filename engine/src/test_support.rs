use std::{
    collections::HashSet,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::time::sleep;

use crate::image_model::{GenerateError, Image, ImageModel};

/// In-process stand-in for the remote model. Counts invocations and tracks how many run at once.
#[derive(Clone, Default)]
pub struct FakeModel {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    delay: Duration,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeModel {
    pub fn new<const N: usize>(delay: Duration, failing: [&str; N]) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                failing: failing.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            }),
        }
    }

    pub fn failing<const N: usize>(prompts: [&str; N]) -> Self {
        Self::new(Duration::ZERO, prompts)
    }

    /// Panics inside `generate` for the given prompts.
    pub fn panicking<const N: usize>(prompts: [&str; N]) -> Self {
        Self {
            inner: Arc::new(Inner {
                panicking: prompts.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            }),
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ImageModel for FakeModel {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Image, GenerateError>> + Send + 'a>> {
        Box::pin(async move {
            let inner = &self.inner;
            inner.calls.fetch_add(1, Ordering::SeqCst);
            let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            inner.max_in_flight.fetch_max(now, Ordering::SeqCst);
            sleep(inner.delay).await;
            inner.in_flight.fetch_sub(1, Ordering::SeqCst);

            if inner.panicking.contains(prompt) {
                panic!("{prompt} exploded");
            }
            if inner.failing.contains(prompt) {
                return Err(GenerateError::PredictionFailed(format!("{prompt} refused")));
            }
            Ok(Image {
                data: format!("image for {prompt}").into_bytes(),
                source: format!("fake://{model}"),
            })
        })
    }

    fn clone(&self) -> Box<dyn ImageModel + Send + Sync + 'static> {
        Box::new(Clone::clone(self))
    }
}
